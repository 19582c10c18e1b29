//! C6 — Orchestrator.
//!
//! Drives the bootstrap / mutant-loop / final-fuzz / teardown phases of
//! spec §4.6. Grounded directly on `fuzzutil.py::fuzz_with_mutants`: the
//! `(time.time() - start_fuzz) < budget * fraction_mutant` split and the
//! `finally: write executable_code back` restoration survive unchanged,
//! generalized with the gating/pruning/accounting steps the distillation
//! folds into one paragraph.

use std::time::{Duration, Instant};

use ahash::AHashMap;
use mutantfuzz_common::{FunctionStats, MutationPlan, OrchestratorEvent, PlanEntry, Replacement, Settings};

use crate::cache::{self, ReachableTuples, UnreachableFunctions, UnreachableSites, VisitedMutants};
use crate::error::{MutantFuzzError, Result};
use crate::jump_index::{FilterConfig, JumpIndex};
use crate::patch;
use crate::policy::{self, FastRng};
use crate::report;
use crate::restore::RestoreGuard;
use crate::supervisor::{self, Outcome};

/// One evaluated mutant's result row (spec §6, CSV output).
#[derive(Debug, Clone)]
pub struct ResultRecord {
    pub metadata: String,
    pub elapsed_secs: f64,
    pub exit_code: i32,
}

/// What a run produced, for the caller (the `mutantfuzz` CLI) to report or
/// write out.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub mutants_evaluated: u64,
    pub mutants_killed: u64,
    pub function_stats: AHashMap<String, FunctionStats>,
    pub results: Vec<ResultRecord>,
}

pub struct Orchestrator {
    settings: Settings,
    base_image: Vec<u8>,
    jump_index: JumpIndex,
    unreachable_functions: UnreachableFunctions,
    unreachable_sites: UnreachableSites,
    reachable_tuples: ReachableTuples,
    visited: VisitedMutants,
    rng: FastRng,
    summary: RunSummary,
    mutant_number: u64,
}

impl Orchestrator {
    /// Bootstrap phase: read the base image, build the jump index, load the
    /// persisted unreachability cache, and print per-function site counts.
    pub fn bootstrap(settings: Settings, disasm_lines: &[String]) -> Result<Self> {
        report::report_event(&OrchestratorEvent::Start);

        let filter = FilterConfig {
            only_mutate: settings.only_mutate.clone(),
            avoid_mutating: settings.avoid_mutating.clone(),
            mutate_standard_libraries: settings.mutate_standard_libraries,
            source_include: settings.source_include.clone(),
            source_exclude: settings.source_exclude.clone(),
            use_default_excludes: true,
        };
        let jump_index = JumpIndex::build(disasm_lines, &filter)?;

        let functions = jump_index.function_map().function_count_with_sites();
        let sites = jump_index.function_map().total_site_count();
        report::report_event(&OrchestratorEvent::BootstrapSiteCounts { functions, sites });
        for (name, count) in jump_index.function_map().site_counts() {
            println!("  {name}: {count}");
        }

        let base_image = std::fs::read(&settings.executable)?;

        let unreachable_functions = match &settings.unreachable_cache_file {
            Some(path) => UnreachableFunctions::load(path)?,
            None => UnreachableFunctions::new(),
        };

        Ok(Self {
            settings,
            base_image,
            jump_index,
            unreachable_functions,
            unreachable_sites: UnreachableSites::new(),
            reachable_tuples: ReachableTuples::new(),
            visited: VisitedMutants::new(),
            rng: FastRng::new(),
            summary: RunSummary::default(),
            mutant_number: 0,
        })
    }

    /// Run the full bootstrap-already-done lifecycle: optional initial
    /// fuzz, mutant loop, optional final fuzz, teardown. Restoration is
    /// guaranteed on every exit path, including a trapped signal, by the
    /// [`RestoreGuard`] installed for the duration of this call.
    pub fn run(&mut self) -> Result<RunSummary> {
        let guard = RestoreGuard::install(self.settings.executable.clone(), self.base_image.clone())
            .map_err(MutantFuzzError::Io)?;
        let result = self.run_under_guard(&guard);
        // Guard also restores on Drop; an explicit call here means the
        // final state is visible even if the caller inspects the file
        // before `self` (and the guard) goes out of scope.
        let _ = guard.restore_now();
        report::report_event(&OrchestratorEvent::RestoredBinary);
        result
    }

    fn run_under_guard(&mut self, guard: &RestoreGuard) -> Result<RunSummary> {
        if let Some(cmd) = self.settings.initial_fuzz_cmd.clone() {
            supervisor::run_with_timeout(&cmd, self.settings.initial_fuzz_budget, self.settings.verbose)?;
            guard.restore_now().map_err(MutantFuzzError::Io)?;
        }
        if let Some(cmd) = self.settings.post_initial_cmd.clone() {
            supervisor::run_with_timeout(&cmd, self.settings.reach_timeout, self.settings.verbose)?;
            guard.restore_now().map_err(MutantFuzzError::Io)?;
        }

        let start = Instant::now();
        let fraction_mutant = self.settings.effective_fraction_mutant();
        let mutant_phase_budget = self.settings.budget.mul_f64(fraction_mutant);

        while start.elapsed() < mutant_phase_budget {
            self.run_one_mutant(guard)?;
        }

        if fraction_mutant < 1.0 {
            report::report_event(&OrchestratorEvent::StartingFinalFuzz);
            guard.restore_now().map_err(MutantFuzzError::Io)?;
            let remainder = self.settings.budget.saturating_sub(start.elapsed());
            supervisor::run_with_timeout(&self.settings.fuzzer_cmd, remainder, self.settings.verbose)?;
        }

        Ok(std::mem::take(&mut self.summary))
    }

    fn run_one_mutant(&mut self, guard: &RestoreGuard) -> Result<()> {
        self.mutant_number += 1;
        report::report_event(&OrchestratorEvent::GeneratingMutant { number: self.mutant_number });

        let plan = self.generate_plan()?;
        let artifact = patch::synthesize(&self.base_image, self.jump_index.function_map(), &plan)?;

        if let Some(cmd) = self.settings.reach_cmd.clone() {
            let functions: Vec<String> = plan.iter().map(|e| e.function_name.clone()).collect();
            let order_one = self.settings.order == 1;
            if !order_one || !self.reachable_tuples.functions_known_reachable(&functions) {
                supervisor::atomic_install(&self.settings.executable, &artifact.function_probe)?;
                let result = supervisor::run_with_timeout(&cmd, self.settings.reach_timeout, self.settings.verbose)?;
                guard.restore_now().map_err(MutantFuzzError::Io)?;
                if result.outcome.is_clean_exit_zero() {
                    for function_name in functions {
                        self.unreachable_functions.record(&function_name)?;
                        report::report_event(&OrchestratorEvent::FunctionUnreachable { function_name });
                    }
                    return Ok(());
                } else if order_one {
                    self.reachable_tuples.record_functions_reachable(functions);
                }
            }

            let offsets: Vec<u64> = plan.iter().map(|e| e.site_offset).collect();
            if !order_one || !self.reachable_tuples.sites_known_reachable(&offsets) {
                supervisor::atomic_install(&self.settings.executable, &artifact.jump_probe)?;
                let result = supervisor::run_with_timeout(&cmd, self.settings.reach_timeout, self.settings.verbose)?;
                guard.restore_now().map_err(MutantFuzzError::Io)?;
                if result.outcome.is_clean_exit_zero() {
                    for site_offset in offsets {
                        self.unreachable_sites.record(site_offset);
                        report::report_event(&OrchestratorEvent::SiteUnreachable { site_offset });
                    }
                    return Ok(());
                } else if order_one {
                    self.reachable_tuples.record_sites_reachable(offsets);
                }
            }
        }

        supervisor::atomic_install(&self.settings.executable, &artifact.mutant)?;
        report::report_event(&OrchestratorEvent::MutantInstalled);

        if let Some(cmd) = self.settings.prune_cmd.clone() {
            let result = supervisor::run_with_timeout(&cmd, self.settings.prune_timeout, self.settings.verbose)?;
            if !result.outcome.is_clean_exit_zero() {
                report::report_event(&OrchestratorEvent::Pruned);
                guard.restore_now().map_err(MutantFuzzError::Io)?;
                return Ok(());
            }
        }

        report::report_event(&OrchestratorEvent::FuzzingMutant);
        let eval = supervisor::run_with_timeout(&self.settings.fuzzer_cmd, self.settings.time_per_mutant, self.settings.verbose)?;
        let exit_code = match eval.outcome {
            Outcome::Exited(code) => code,
            Outcome::Signaled(signal) => signal,
            // A timeout with no crash is "survived" (spec §7).
            Outcome::TimedOut => 0,
        };
        let killed = exit_code != 0;
        report::report_event(&OrchestratorEvent::FinishedFuzzing {
            elapsed_secs: eval.elapsed.as_secs_f64(),
            killed,
        });

        for entry in &plan {
            self.summary.function_stats.entry(entry.function_name.clone()).or_default().record(killed);
        }
        self.summary.mutants_evaluated += 1;
        if killed {
            self.summary.mutants_killed += 1;
        }

        let metadata = patch::serialize_metadata(self.jump_index.function_map(), &plan)?;
        self.save_mutant_artifact(&artifact, &metadata, killed)?;
        self.summary.results.push(ResultRecord {
            metadata,
            elapsed_secs: eval.elapsed.as_secs_f64(),
            exit_code,
        });

        guard.restore_now().map_err(MutantFuzzError::Io)?;

        if let Some(cmd) = self.settings.post_mutant_cmd.clone() {
            supervisor::run_with_timeout(&cmd, self.settings.prune_timeout, self.settings.verbose)?;
            guard.restore_now().map_err(MutantFuzzError::Io)?;
        }
        if let Some(cmd) = self.settings.status_cmd.clone() {
            supervisor::run_with_timeout(&cmd, self.settings.prune_timeout, self.settings.verbose)?;
            guard.restore_now().map_err(MutantFuzzError::Io)?;
        }

        Ok(())
    }

    fn save_mutant_artifact(&self, artifact: &mutantfuzz_common::MutantArtifact, metadata: &str, killed: bool) -> Result<()> {
        let Some(dir) = &self.settings.save_mutants_dir else {
            return Ok(());
        };
        std::fs::create_dir_all(dir)?;
        let prefix = if killed { "killed" } else { "survived" };
        let metadata_path = dir.join(format!("{prefix}_{}.metadata", self.mutant_number));
        let exe_path = dir.join(format!("{prefix}_{}.exe", self.mutant_number));
        std::fs::write(metadata_path, metadata)?;
        std::fs::write(exe_path, &artifact.mutant)?;
        Ok(())
    }

    /// Choose `order` sites under the reachability filters and the repeat
    /// policy (spec §4.5/§4.6, "generate a `MutationPlan`").
    fn generate_plan(&mut self) -> Result<MutationPlan> {
        let eligible: Vec<usize> = (0..self.jump_index.sites().len())
            .filter(|&i| {
                let site = &self.jump_index.sites()[i];
                !self.unreachable_functions.contains(&site.function_name) && !self.unreachable_sites.contains(site.file_offset)
            })
            .collect();
        if eligible.is_empty() {
            return Err(MutantFuzzError::NoReachableSite { attempts: 0 });
        }

        let mut entries = Vec::with_capacity(self.settings.order);
        for _ in 0..self.settings.order {
            let retries = self.settings.repeat_retries.max(1);
            let eligible_ref = &eligible;
            let sites = self.jump_index.sites();
            let rng = &mut self.rng;
            let (offset, bytes, payload, fell_back) = cache::pick_with_retry_budget(retries, &self.visited, || {
                let idx = eligible_ref[rng.usize(0..eligible_ref.len())];
                let site = &sites[idx];
                let replacement = policy::choose_replacement(site.mnemonic, site.encoding, rng);
                let bytes = policy::resolve_bytes(replacement, site.mnemonic, site.encoding, &site.raw_bytes);
                (site.file_offset, bytes, (site.function_name.clone(), replacement))
            });

            if fell_back {
                report::report_event(&OrchestratorEvent::RepeatBudgetExhausted);
            }

            let entry = match payload {
                Some((function_name, replacement)) => PlanEntry {
                    function_name,
                    site_offset: offset,
                    replacement,
                    replacement_bytes: bytes,
                },
                None => {
                    let site = self
                        .jump_index
                        .site_at(offset)
                        .ok_or(MutantFuzzError::NoReachableSite { attempts: retries })?;
                    PlanEntry {
                        function_name: site.function_name.clone(),
                        site_offset: offset,
                        // The original branch tag isn't recoverable from
                        // bytes alone; harmless since synthesis only reads
                        // `replacement_bytes`.
                        replacement: Replacement::Erase,
                        replacement_bytes: bytes,
                    }
                }
            };
            if self.settings.avoid_repeats {
                self.visited.record(entry.site_offset, &entry.replacement_bytes);
            }
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// Write the CSV results file (spec §6): one row per evaluated mutant,
/// `"<plan metadata flattened with :: separating lines>",<seconds>,<exit code>`.
pub fn write_results_csv(path: &std::path::Path, results: &[ResultRecord]) -> Result<()> {
    let mut out = String::new();
    for record in results {
        let flattened = record.metadata.replace('\n', "::");
        out.push_str(&format!("\"{flattened}\",{},{}\n", record.elapsed_secs, record.exit_code));
    }
    std::fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_disasm() -> Vec<String> {
        vec![
            "0000000000001000 <target>: (File Offset: 0x1000)".to_string(),
            "    1000:\t74 05\tje 1007".to_string(),
        ]
    }

    fn base_settings(executable: std::path::PathBuf) -> Settings {
        Settings {
            executable,
            fuzzer_cmd: "exit 1".to_string(),
            budget: Duration::from_millis(300),
            time_per_mutant: Duration::from_millis(100),
            fraction_mutant: 1.0,
            score_mode: true,
            ..Default::default()
        }
    }

    #[test]
    fn bootstrap_reads_base_image_and_builds_index() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("target");
        std::fs::write(&exe, vec![0u8; 0x1010]).unwrap();

        let orchestrator = Orchestrator::bootstrap(base_settings(exe), &sample_disasm()).unwrap();
        assert_eq!(orchestrator.jump_index.sites().len(), 1);
        assert_eq!(orchestrator.base_image.len(), 0x1010);
    }

    #[test]
    fn run_restores_base_image_after_score_mode_loop() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("target");
        let base = vec![0u8; 0x1010];
        std::fs::write(&exe, &base).unwrap();

        let mut orchestrator = Orchestrator::bootstrap(base_settings(exe.clone()), &sample_disasm()).unwrap();
        let summary = orchestrator.run().unwrap();

        assert!(summary.mutants_evaluated >= 1);
        assert_eq!(std::fs::read(&exe).unwrap(), base);
    }

    #[test]
    fn fuzzer_nonzero_exit_counts_as_killed() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("target");
        std::fs::write(&exe, vec![0u8; 0x1010]).unwrap();

        let mut settings = base_settings(exe);
        settings.fuzzer_cmd = "exit 1".to_string();
        let mut orchestrator = Orchestrator::bootstrap(settings, &sample_disasm()).unwrap();
        let summary = orchestrator.run().unwrap();

        assert_eq!(summary.mutants_killed, summary.mutants_evaluated);
    }

    #[test]
    fn fuzzer_zero_exit_counts_as_survived() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("target");
        std::fs::write(&exe, vec![0u8; 0x1010]).unwrap();

        let mut settings = base_settings(exe);
        settings.fuzzer_cmd = "exit 0".to_string();
        let mut orchestrator = Orchestrator::bootstrap(settings, &sample_disasm()).unwrap();
        let summary = orchestrator.run().unwrap();

        assert_eq!(summary.mutants_killed, 0);
        assert!(summary.mutants_evaluated >= 1);
    }

    #[test]
    fn function_unreachable_cache_skips_its_sites_for_1000_plans() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("target");
        std::fs::write(&exe, vec![0u8; 0x1010]).unwrap();

        let mut settings = base_settings(exe);
        settings.reach_cmd = Some("exit 0".to_string()); // zero exit => unreachable
        settings.fuzzer_cmd = "exit 0".to_string();
        settings.budget = Duration::from_millis(1); // stop after the first plan
        let mut orchestrator = Orchestrator::bootstrap(settings, &sample_disasm()).unwrap();
        let _ = orchestrator.run();

        assert!(orchestrator.unreachable_functions.contains("target"));
        for _ in 0..1000 {
            assert!(orchestrator.generate_plan().is_err());
        }
    }
}
