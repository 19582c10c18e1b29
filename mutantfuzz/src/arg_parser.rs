//! Command-line flag names and the `getopts::Options` they build into.
//! Grounded on `fuzzcheck_arg_parser`'s `const`-flag-name + `Options`-
//! builder pattern: every flag gets a named constant instead of a bare
//! string literal scattered across `main.rs`.

use getopts::Options;

pub const COMMAND_FUZZ: &str = "fuzz";
pub const COMMAND_REPLAY: &str = "replay";

pub const EXECUTABLE_FLAG: &str = "executable";
pub const FUZZER_CMD_FLAG: &str = "fuzzer-cmd";
pub const BUDGET_FLAG: &str = "budget";
pub const TIME_PER_MUTANT_FLAG: &str = "time-per-mutant";
pub const FRACTION_MUTANT_FLAG: &str = "fraction-mutant";
pub const ORDER_FLAG: &str = "order";
pub const SCORE_FLAG: &str = "score";

pub const ONLY_MUTATE_FLAG: &str = "only-mutate";
pub const AVOID_MUTATING_FLAG: &str = "avoid-mutating";
pub const MUTATE_STD_LIBS_FLAG: &str = "mutate-standard-libraries";
pub const SOURCE_INCLUDE_FLAG: &str = "source-include";
pub const SOURCE_EXCLUDE_FLAG: &str = "source-exclude";

pub const REACH_CMD_FLAG: &str = "reach-cmd";
pub const REACH_TIMEOUT_FLAG: &str = "reach-timeout";
pub const PRUNE_CMD_FLAG: &str = "prune-cmd";
pub const PRUNE_TIMEOUT_FLAG: &str = "prune-timeout";
pub const INITIAL_FUZZ_CMD_FLAG: &str = "initial-fuzz-cmd";
pub const INITIAL_FUZZ_BUDGET_FLAG: &str = "initial-fuzz-budget";
pub const POST_INITIAL_CMD_FLAG: &str = "post-initial-cmd";
pub const POST_MUTANT_CMD_FLAG: &str = "post-mutant-cmd";
pub const STATUS_CMD_FLAG: &str = "status-cmd";

pub const AVOID_REPEATS_FLAG: &str = "avoid-repeats";
pub const REPEAT_RETRIES_FLAG: &str = "repeat-retries";

pub const SAVE_MUTANTS_DIR_FLAG: &str = "save-mutants-dir";
pub const RESULTS_CSV_FLAG: &str = "results-csv";
pub const UNREACHABLE_CACHE_FLAG: &str = "unreachable-cache-file";
pub const DISASSEMBLER_FLAG: &str = "disassembler";
pub const CONFIG_FLAG: &str = "config";
pub const VERBOSE_FLAG: &str = "verbose";

pub const REPLAY_RANDOM_FLAG: &str = "random";

pub fn fuzz_options_parser() -> Options {
    let mut options = Options::new();
    options
        .optopt("", EXECUTABLE_FLAG, "path to the target executable (or `executable` in --config)", "PATH")
        .optopt("", FUZZER_CMD_FLAG, "shell command that runs the fuzzer (or `fuzzer_cmd` in --config)", "CMD")
        .optopt("", BUDGET_FLAG, "total wall-clock budget in seconds (default: 3600)", "SECS")
        .optopt(
            "",
            TIME_PER_MUTANT_FLAG,
            "per-mutant fuzzer timeout in seconds (default: 300)",
            "SECS",
        )
        .optopt(
            "",
            FRACTION_MUTANT_FLAG,
            "fraction of the budget spent mutating vs. fuzzing the original (default: 0.5)",
            "0.0-1.0",
        )
        .optopt("", ORDER_FLAG, "number of sites mutated per plan (default: 1)", "N")
        .optflag("", SCORE_FLAG, "score mode: spend the whole budget mutating, no final fuzz")
        .optmulti("", ONLY_MUTATE_FLAG, "only mutate functions matching this substring", "PATTERN")
        .optmulti("", AVOID_MUTATING_FLAG, "never mutate functions matching this substring", "PATTERN")
        .optflag("", MUTATE_STD_LIBS_FLAG, "allow mutating std::/boost:: functions")
        .optmulti("", SOURCE_INCLUDE_FLAG, "only mutate sites tagged with this source path", "PATTERN")
        .optmulti("", SOURCE_EXCLUDE_FLAG, "never mutate sites tagged with this source path", "PATTERN")
        .optopt("", REACH_CMD_FLAG, "shell command that tests reachability via exit code", "CMD")
        .optopt("", REACH_TIMEOUT_FLAG, "reachability probe timeout in seconds (default: 30)", "SECS")
        .optopt("", PRUNE_CMD_FLAG, "shell command that validates a mutant before fuzzing", "CMD")
        .optopt("", PRUNE_TIMEOUT_FLAG, "prune command timeout in seconds (default: 30)", "SECS")
        .optopt("", INITIAL_FUZZ_CMD_FLAG, "shell command run once before mutating", "CMD")
        .optopt("", INITIAL_FUZZ_BUDGET_FLAG, "initial-fuzz budget in seconds (default: 0)", "SECS")
        .optopt("", POST_INITIAL_CMD_FLAG, "shell command run once after the initial fuzz", "CMD")
        .optopt("", POST_MUTANT_CMD_FLAG, "shell command run after every evaluated mutant", "CMD")
        .optopt("", STATUS_CMD_FLAG, "shell command run after every evaluated mutant, for status reporting", "CMD")
        .optflag("", AVOID_REPEATS_FLAG, "deduplicate (site, replacement) pairs across the run")
        .optopt(
            "",
            REPEAT_RETRIES_FLAG,
            "retry budget before falling back to the least-visited pair (default: 20)",
            "N",
        )
        .optopt("", SAVE_MUTANTS_DIR_FLAG, "directory to save mutant binaries and metadata", "PATH")
        .optopt("", RESULTS_CSV_FLAG, "path to write the per-mutant CSV results file", "PATH")
        .optopt("", UNREACHABLE_CACHE_FLAG, "path to a persisted unreachable-functions cache", "PATH")
        .optopt(
            "",
            DISASSEMBLER_FLAG,
            "external disassembler to invoke (default: objdump)",
            "NAME",
        )
        .optopt("", CONFIG_FLAG, "TOML config file providing defaults for any flag above", "PATH")
        .optflag("", VERBOSE_FLAG, "print captured stderr tails from child commands")
        .optflag("", "help", "print this help menu");
    options
}

pub fn replay_options_parser() -> Options {
    let mut options = Options::new();
    options
        .optflag("", REPLAY_RANDOM_FLAG, "replay metadata files in random order instead of round-robin")
        .optflag("", "help", "print this help menu");
    options
}

pub fn help(command: &str, options: &Options) -> String {
    options.usage(&format!("Usage: mutantfuzz {command} [options]"))
}
