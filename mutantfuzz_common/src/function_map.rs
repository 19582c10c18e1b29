use std::collections::HashMap;

/// Per-function bookkeeping built once during discovery (spec §3,
/// `FunctionMap`): the ordered sites belonging to each function, and,
/// unconditionally, every function's entry offset — including functions
/// whose sites were all filtered out, since probes need the entry
/// regardless of whether any site survived filtering (spec §9, resolved
/// open question).
#[derive(Debug, Clone, Default)]
pub struct FunctionMap {
    sites_by_function: HashMap<String, Vec<u64>>,
    entry_by_function: HashMap<String, u64>,
}

impl FunctionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `function`'s entry offset. Called unconditionally for every
    /// function header seen during discovery, regardless of filtering.
    pub fn record_entry(&mut self, function: &str, entry_offset: u64) {
        self.entry_by_function.entry(function.to_string()).or_insert(entry_offset);
    }

    /// Record a mutable site that survived filtering, appending it to its
    /// owning function's site list in disassembly order.
    pub fn record_site(&mut self, function: &str, offset: u64) {
        self.sites_by_function
            .entry(function.to_string())
            .or_default()
            .push(offset);
    }

    pub fn entry_offset(&self, function: &str) -> Option<u64> {
        self.entry_by_function.get(function).copied()
    }

    pub fn sites_of(&self, function: &str) -> &[u64] {
        self.sites_by_function.get(function).map_or(&[], Vec::as_slice)
    }

    pub fn functions_with_sites(&self) -> impl Iterator<Item = &str> {
        self.sites_by_function.keys().map(String::as_str)
    }

    pub fn function_count_with_sites(&self) -> usize {
        self.sites_by_function.len()
    }

    pub fn total_site_count(&self) -> usize {
        self.sites_by_function.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sites_by_function.is_empty()
    }

    /// `(function_name, site_count)` pairs, for the bootstrap progress
    /// printout (spec §4.6, "print per-function site counts").
    pub fn site_counts(&self) -> Vec<(&str, usize)> {
        let mut counts: Vec<(&str, usize)> = self
            .sites_by_function
            .iter()
            .map(|(name, sites)| (name.as_str(), sites.len()))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_recorded_even_for_functions_with_no_surviving_sites() {
        let mut map = FunctionMap::new();
        map.record_entry("filtered_out_fn", 0x100);
        assert_eq!(map.entry_offset("filtered_out_fn"), Some(0x100));
        assert!(map.sites_of("filtered_out_fn").is_empty());
    }

    #[test]
    fn first_recorded_entry_wins() {
        let mut map = FunctionMap::new();
        map.record_entry("f", 0x10);
        map.record_entry("f", 0x20);
        assert_eq!(map.entry_offset("f"), Some(0x10));
    }

    #[test]
    fn site_counts_sorted_descending() {
        let mut map = FunctionMap::new();
        map.record_site("a", 1);
        map.record_site("b", 1);
        map.record_site("b", 2);
        let counts = map.site_counts();
        assert_eq!(counts, vec![("b", 2), ("a", 1)]);
    }
}
