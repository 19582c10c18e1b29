//! C5 — Reachability & Repeat Caches.
//!
//! Three in-memory tables plus optional persistence (spec §4.5). Keyed
//! with `ahash` the way the teacher's coverage hit maps are (`fuzzcheck`'s
//! `HashSet<Feature, ahash::RandomState>`), since these maps sit on the hot
//! path of every mutant iteration.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use ahash::{AHashMap, AHashSet};

use crate::error::Result;

/// Functions proven never entered by a reachability probe. Membership
/// means "do not select any site in this function" (spec §4.5).
#[derive(Debug, Default)]
pub struct UnreachableFunctions {
    names: AHashSet<String>,
    persist_path: Option<PathBuf>,
}

impl UnreachableFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a persisted cache file, one name per line, if `path` exists.
    /// Future insertions are appended to the same file.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut names = AHashSet::new();
        if path.exists() {
            let text = fs::read_to_string(&path)?;
            for line in text.lines() {
                let line = line.trim();
                if !line.is_empty() {
                    names.insert(line.to_string());
                }
            }
        }
        Ok(Self {
            names,
            persist_path: Some(path),
        })
    }

    pub fn contains(&self, function_name: &str) -> bool {
        self.names.contains(function_name)
    }

    /// Record `function_name` as unreachable, appending it to the
    /// persistence file (if configured). Returns `true` if this is a new
    /// entry (spec §8, "Cache monotonicity").
    pub fn record(&mut self, function_name: &str) -> Result<bool> {
        let is_new = self.names.insert(function_name.to_string());
        if is_new {
            if let Some(path) = &self.persist_path {
                let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
                writeln!(file, "{function_name}")?;
            }
        }
        Ok(is_new)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Sites proven never entered by a reachability probe. Not persisted
/// (spec §4.5): keyed by absolute offset, which only means something
/// relative to the base image of this run.
#[derive(Debug, Default)]
pub struct UnreachableSites {
    offsets: AHashSet<u64>,
}

impl UnreachableSites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.offsets.contains(&offset)
    }

    pub fn record(&mut self, offset: u64) {
        self.offsets.insert(offset);
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }
}

/// Ephemeral positive cache: a plan whose function-name tuple (or site-
/// offset tuple) has recently been proven reachable skips the probe runs
/// entirely. Only safe for order-1 plans (spec §4.5); callers must not
/// feed it multi-site plans.
#[derive(Debug, Default)]
pub struct ReachableTuples {
    function_tuples: AHashSet<Vec<String>>,
    site_tuples: AHashSet<Vec<u64>>,
}

impl ReachableTuples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn functions_known_reachable(&self, functions: &[String]) -> bool {
        self.function_tuples.contains(functions)
    }

    pub fn sites_known_reachable(&self, offsets: &[u64]) -> bool {
        self.site_tuples.contains(offsets)
    }

    pub fn record_functions_reachable(&mut self, functions: Vec<String>) {
        self.function_tuples.insert(functions);
    }

    pub fn record_sites_reachable(&mut self, offsets: Vec<u64>) {
        self.site_tuples.insert(offsets);
    }
}

/// Counts how many times each `(site_offset, replacement_bytes)` pair has
/// been produced, for deduplication (spec §4.5, "Visited mutants").
#[derive(Debug, Default)]
pub struct VisitedMutants {
    counts: AHashMap<(u64, Vec<u8>), u32>,
}

impl VisitedMutants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visit_count(&self, site_offset: u64, replacement_bytes: &[u8]) -> u32 {
        self.counts.get(&(site_offset, replacement_bytes.to_vec())).copied().unwrap_or(0)
    }

    pub fn record(&mut self, site_offset: u64, replacement_bytes: &[u8]) {
        *self.counts.entry((site_offset, replacement_bytes.to_vec())).or_insert(0) += 1;
    }

    /// The `(site_offset, replacement_bytes)` key with the fewest visits,
    /// used when the retry budget is exhausted (spec §7, "Repeat-mutant
    /// budget exhausted").
    pub fn least_visited(&self) -> Option<(u64, Vec<u8>)> {
        self.counts.iter().min_by_key(|(_, count)| **count).map(|(k, _)| k.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Pick a `(site_offset, replacement)` candidate under the dedup retry
/// budget: calls `candidate` up to `retries` times, accepting the first
/// one not yet visited; if every draw collides, falls back to the
/// least-visited entry already recorded and reports the fallback via the
/// returned `bool` (spec §7, "warn, pick the least-visited, continue").
pub fn pick_with_retry_budget<T>(
    retries: usize,
    visited: &VisitedMutants,
    mut candidate: impl FnMut() -> (u64, Vec<u8>, T),
) -> (u64, Vec<u8>, Option<T>, bool) {
    for _ in 0..retries {
        let (offset, bytes, payload) = candidate();
        if visited.visit_count(offset, &bytes) == 0 {
            return (offset, bytes, Some(payload), false);
        }
    }
    if let Some((offset, bytes)) = visited.least_visited() {
        return (offset, bytes, None, true);
    }
    // No visits recorded at all (first ever draw somehow collided with
    // itself across retries): fall back to whatever the last draw was.
    let (offset, bytes, payload) = candidate();
    (offset, bytes, Some(payload), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_functions_persist_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unreachable.txt");

        let mut cache = UnreachableFunctions::load(&path).unwrap();
        assert!(cache.record("f").unwrap());
        assert!(!cache.record("f").unwrap());

        let reloaded = UnreachableFunctions::load(&path).unwrap();
        assert!(reloaded.contains("f"));
    }

    #[test]
    fn unreachable_function_never_reselected_over_1000_plans() {
        let mut cache = UnreachableFunctions::new();
        cache.record("F").unwrap();
        for _ in 0..1000 {
            assert!(cache.contains("F"));
        }
    }

    #[test]
    fn visited_mutants_tracks_exact_site_and_bytes() {
        let mut visited = VisitedMutants::new();
        visited.record(0x1000, &[0x75, 0x05]);
        assert_eq!(visited.visit_count(0x1000, &[0x75, 0x05]), 1);
        assert_eq!(visited.visit_count(0x1000, &[0x90, 0x90]), 0);
    }

    #[test]
    fn retry_budget_falls_back_to_least_visited_on_exhaustion() {
        let mut visited = VisitedMutants::new();
        visited.record(0x1000, &[0x75, 0x05]);
        visited.record(0x1000, &[0x75, 0x05]);
        visited.record(0x2000, &[0x90, 0x90]);

        // Every draw collides with the heavily-visited site.
        let (offset, bytes, payload, fell_back) =
            pick_with_retry_budget(3, &visited, || (0x1000, vec![0x75, 0x05], ()));
        assert!(fell_back);
        assert!(payload.is_none());
        assert_eq!((offset, bytes), (0x2000, vec![0x90, 0x90]));
    }

    #[test]
    fn retry_budget_accepts_first_unvisited_draw() {
        let visited = VisitedMutants::new();
        let (offset, bytes, payload, fell_back) =
            pick_with_retry_budget(3, &visited, || (0x3000, vec![0x90], "picked"));
        assert!(!fell_back);
        assert_eq!(payload, Some("picked"));
        assert_eq!((offset, bytes), (0x3000, vec![0x90]));
    }
}
