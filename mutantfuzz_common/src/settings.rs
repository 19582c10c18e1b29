use std::path::PathBuf;
use std::time::Duration;

/// Everything the orchestrator needs for one run, parsed by the CLI
/// (`mutantfuzz`) and consumed by the engine (`mutantfuzz_core`). Mirrors
/// the split between `fuzzcheck_common::FullCommandLineArguments` (shared
/// type) and `cargo-fuzzcheck` (the thing that builds it).
#[derive(Debug, Clone)]
pub struct Settings {
    pub executable: PathBuf,
    pub fuzzer_cmd: String,

    pub budget: Duration,
    pub time_per_mutant: Duration,
    /// Forced to `1.0` in score mode (spec §4.6).
    pub fraction_mutant: f64,
    pub order: usize,
    pub score_mode: bool,

    pub only_mutate: Vec<String>,
    pub avoid_mutating: Vec<String>,
    pub mutate_standard_libraries: bool,
    pub source_include: Vec<String>,
    pub source_exclude: Vec<String>,

    pub reach_cmd: Option<String>,
    pub reach_timeout: Duration,
    pub prune_cmd: Option<String>,
    pub prune_timeout: Duration,
    pub initial_fuzz_cmd: Option<String>,
    pub initial_fuzz_budget: Duration,
    pub post_initial_cmd: Option<String>,
    pub post_mutant_cmd: Option<String>,
    pub status_cmd: Option<String>,

    pub avoid_repeats: bool,
    pub repeat_retries: usize,

    pub save_mutants_dir: Option<PathBuf>,
    pub results_csv: Option<PathBuf>,
    pub unreachable_cache_file: Option<PathBuf>,

    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            executable: PathBuf::new(),
            fuzzer_cmd: String::new(),
            budget: Duration::from_secs(3600),
            time_per_mutant: Duration::from_secs(300),
            fraction_mutant: 0.5,
            order: 1,
            score_mode: false,
            only_mutate: Vec::new(),
            avoid_mutating: Vec::new(),
            mutate_standard_libraries: false,
            source_include: Vec::new(),
            source_exclude: Vec::new(),
            reach_cmd: None,
            reach_timeout: Duration::from_secs(30),
            prune_cmd: None,
            prune_timeout: Duration::from_secs(30),
            initial_fuzz_cmd: None,
            initial_fuzz_budget: Duration::from_secs(0),
            post_initial_cmd: None,
            post_mutant_cmd: None,
            status_cmd: None,
            avoid_repeats: false,
            repeat_retries: 20,
            save_mutants_dir: None,
            results_csv: None,
            unreachable_cache_file: None,
            verbose: false,
        }
    }
}

impl Settings {
    /// In score mode the whole budget is spent mutating; there is no final
    /// fuzz-the-original phase (spec §4.6).
    pub fn effective_fraction_mutant(&self) -> f64 {
        if self.score_mode {
            1.0
        } else {
            self.fraction_mutant
        }
    }
}
