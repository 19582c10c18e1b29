//! Command-line driver for the binary mutation fuzzing engine. Two
//! subcommands: `fuzz` drives a full bootstrap/mutate/fuzz run, `replay`
//! walks a directory of saved `.metadata` files against a fresh copy of the
//! target, one at a time. Grounded on `cargo-fuzzcheck/src/main.rs`'s
//! subcommand dispatch, generalized from fuzzcheck's single `cargo fuzzcheck`
//! entry point to this crate's `fuzz`/`replay` pair.

mod arg_parser;
mod config;

use std::path::PathBuf;
use std::time::Duration;

use getopts::Matches;
use mutantfuzz_common::{OrchestratorEvent, Settings};
use mutantfuzz_core::jump_index::{FilterConfig, JumpIndex};
use mutantfuzz_core::{disasm, orchestrator, patch, report};
use mutantfuzz_core::restore::RestoreGuard;
use mutantfuzz_core::supervisor;
use mutantfuzz_core::Orchestrator;

use arg_parser::*;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let rest = &args[2.min(args.len())..];

    let result = match args.get(1).map(String::as_str) {
        Some(COMMAND_FUZZ) => run_fuzz(rest),
        Some(COMMAND_REPLAY) => run_replay(rest),
        Some("--help") | Some("-h") | None => {
            println!("usage: mutantfuzz <fuzz|replay> [options]");
            Ok(())
        }
        Some(other) => Err(format!("unknown command `{other}`; expected `fuzz` or `replay`").into()),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn run_fuzz(args: &[String]) -> CliResult {
    let options = fuzz_options_parser();
    let matches = options.parse(args)?;
    if matches.opt_present("help") {
        println!("{}", help(COMMAND_FUZZ, &options));
        return Ok(());
    }

    let config = match matches.opt_str(CONFIG_FLAG) {
        Some(path) => config::ConfigFile::load(std::path::Path::new(&path))?,
        None => config::ConfigFile::default(),
    };

    let settings = build_settings(&matches, &config)?;
    let disassembler = opt_string(&matches, DISASSEMBLER_FLAG, config.disassembler.clone())
        .unwrap_or_else(|| "objdump".to_string());

    let image = std::fs::read(&settings.executable)?;
    disasm::validate_executable(&image)?;

    let disasm_lines = disasm::run_disassembler(&disassembler, &settings.executable.to_string_lossy())?;

    let mut orchestrator = Orchestrator::bootstrap(settings.clone(), &disasm_lines)?;
    let summary = orchestrator.run()?;

    print_summary(&summary);
    if let Some(csv_path) = &settings.results_csv {
        orchestrator::write_results_csv(csv_path, &summary.results)?;
        println!("wrote results to {}", csv_path.display());
    }
    report::report_event(&OrchestratorEvent::End);
    Ok(())
}

fn run_replay(args: &[String]) -> CliResult {
    let options = replay_options_parser();
    let matches = options.parse(args)?;
    if matches.opt_present("help") || matches.free.len() < 2 {
        println!("usage: mutantfuzz replay <executable> <metadata-dir> [options]");
        println!("{}", help(COMMAND_REPLAY, &options));
        return Ok(());
    }

    let executable = PathBuf::from(&matches.free[0]);
    let metadata_dir = PathBuf::from(&matches.free[1]);
    let random = matches.opt_present(REPLAY_RANDOM_FLAG);

    let base_image = std::fs::read(&executable)?;
    disasm::validate_executable(&base_image)?;

    // Only the function-entry map is needed for replay; keep every
    // function (and its entry offset) in play regardless of the filters a
    // `fuzz` run would normally apply.
    let permissive_filter = FilterConfig {
        mutate_standard_libraries: true,
        use_default_excludes: false,
        ..Default::default()
    };
    let disasm_lines = disasm::run_disassembler("objdump", &executable.to_string_lossy())?;
    let jump_index = JumpIndex::build(&disasm_lines, &permissive_filter)?;
    let function_map = jump_index.function_map();

    let mut metadata_paths: Vec<PathBuf> = std::fs::read_dir(&metadata_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("metadata"))
        .collect();
    metadata_paths.sort();
    if metadata_paths.is_empty() {
        return Err(format!("no .metadata files found in {}", metadata_dir.display()).into());
    }

    let mut order: Vec<usize> = (0..metadata_paths.len()).collect();
    if random {
        for i in (1..order.len()).rev() {
            let j = fastrand::usize(0..=i);
            order.swap(i, j);
        }
    }

    let guard = RestoreGuard::install(executable.clone(), base_image.clone())?;
    for (number, &idx) in order.iter().enumerate() {
        let path = &metadata_paths[idx];
        report::report_event(&OrchestratorEvent::Replaying {
            number: number as u64 + 1,
            path: path.display().to_string(),
        });

        let text = std::fs::read_to_string(path)?;
        let edits = patch::parse_metadata(&text)?;
        let plan = patch::plan_from_replay(function_map, &edits)?;
        let artifact = patch::synthesize(&base_image, function_map, &plan)?;
        supervisor::atomic_install(&executable, &artifact.mutant)?;

        println!("press Enter to restore and continue (Ctrl-C to stop here)");
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        guard.restore_now()?;
    }

    report::report_event(&OrchestratorEvent::End);
    Ok(())
}

fn print_summary(summary: &mutantfuzz_core::RunSummary) {
    println!();
    println!("mutants evaluated: {}", summary.mutants_evaluated);
    println!("mutants killed:    {}", summary.mutants_killed);
    if summary.mutants_evaluated > 0 {
        let score = summary.mutants_killed as f64 / summary.mutants_evaluated as f64;
        println!("mutation score:    {:.1}%", score * 100.0);
    }
    let mut functions: Vec<_> = summary.function_stats.iter().collect();
    functions.sort_by(|a, b| a.0.cmp(b.0));
    for (name, stats) in functions {
        match stats.mutation_score() {
            Some(score) => println!("  {name}: {}/{} killed ({:.0}%)", stats.kills, stats.total, score * 100.0),
            None => println!("  {name}: no mutants evaluated"),
        }
    }
}

fn build_settings(matches: &Matches, config: &config::ConfigFile) -> Result<Settings, Box<dyn std::error::Error>> {
    let defaults = Settings::default();

    let executable = opt_string(matches, EXECUTABLE_FLAG, config.executable.clone())
        .ok_or("missing --executable (or `executable` in the config file)")?;
    let fuzzer_cmd = opt_string(matches, FUZZER_CMD_FLAG, config.fuzzer_cmd.clone())
        .ok_or("missing --fuzzer-cmd (or `fuzzer_cmd` in the config file)")?;

    let budget = opt_f64(matches, BUDGET_FLAG, config.budget, defaults.budget.as_secs_f64())?;
    let time_per_mutant = opt_f64(matches, TIME_PER_MUTANT_FLAG, config.time_per_mutant, defaults.time_per_mutant.as_secs_f64())?;
    let fraction_mutant = opt_f64(matches, FRACTION_MUTANT_FLAG, config.fraction_mutant, defaults.fraction_mutant)?;
    let order = opt_usize(matches, ORDER_FLAG, config.order, defaults.order)?;
    let score_mode = matches.opt_present(SCORE_FLAG) || config.score.unwrap_or(false);

    let reach_timeout = opt_f64(matches, REACH_TIMEOUT_FLAG, config.reach_timeout, defaults.reach_timeout.as_secs_f64())?;
    let prune_timeout = opt_f64(matches, PRUNE_TIMEOUT_FLAG, config.prune_timeout, defaults.prune_timeout.as_secs_f64())?;
    let initial_fuzz_budget = opt_f64(
        matches,
        INITIAL_FUZZ_BUDGET_FLAG,
        config.initial_fuzz_budget,
        defaults.initial_fuzz_budget.as_secs_f64(),
    )?;
    let repeat_retries = opt_usize(matches, REPEAT_RETRIES_FLAG, config.repeat_retries, defaults.repeat_retries)?;

    Ok(Settings {
        executable: PathBuf::from(executable),
        fuzzer_cmd,
        budget: Duration::from_secs_f64(budget),
        time_per_mutant: Duration::from_secs_f64(time_per_mutant),
        fraction_mutant,
        order,
        score_mode,
        only_mutate: merge_multi(matches.opt_strs(ONLY_MUTATE_FLAG), config.only_mutate.clone()),
        avoid_mutating: merge_multi(matches.opt_strs(AVOID_MUTATING_FLAG), config.avoid_mutating.clone()),
        mutate_standard_libraries: matches.opt_present(MUTATE_STD_LIBS_FLAG) || config.mutate_standard_libraries.unwrap_or(false),
        source_include: merge_multi(matches.opt_strs(SOURCE_INCLUDE_FLAG), config.source_include.clone()),
        source_exclude: merge_multi(matches.opt_strs(SOURCE_EXCLUDE_FLAG), config.source_exclude.clone()),
        reach_cmd: opt_string(matches, REACH_CMD_FLAG, config.reach_cmd.clone()),
        reach_timeout: Duration::from_secs_f64(reach_timeout),
        prune_cmd: opt_string(matches, PRUNE_CMD_FLAG, config.prune_cmd.clone()),
        prune_timeout: Duration::from_secs_f64(prune_timeout),
        initial_fuzz_cmd: opt_string(matches, INITIAL_FUZZ_CMD_FLAG, config.initial_fuzz_cmd.clone()),
        initial_fuzz_budget: Duration::from_secs_f64(initial_fuzz_budget),
        post_initial_cmd: opt_string(matches, POST_INITIAL_CMD_FLAG, config.post_initial_cmd.clone()),
        post_mutant_cmd: opt_string(matches, POST_MUTANT_CMD_FLAG, config.post_mutant_cmd.clone()),
        status_cmd: opt_string(matches, STATUS_CMD_FLAG, config.status_cmd.clone()),
        avoid_repeats: matches.opt_present(AVOID_REPEATS_FLAG) || config.avoid_repeats.unwrap_or(false),
        repeat_retries,
        save_mutants_dir: opt_string(matches, SAVE_MUTANTS_DIR_FLAG, config.save_mutants_dir.clone()).map(PathBuf::from),
        results_csv: opt_string(matches, RESULTS_CSV_FLAG, config.results_csv.clone()).map(PathBuf::from),
        unreachable_cache_file: opt_string(matches, UNREACHABLE_CACHE_FLAG, config.unreachable_cache_file.clone()).map(PathBuf::from),
        verbose: matches.opt_present(VERBOSE_FLAG) || config.verbose.unwrap_or(false),
    })
}

fn opt_string(matches: &Matches, flag: &str, config_value: Option<String>) -> Option<String> {
    matches.opt_str(flag).or(config_value)
}

fn merge_multi(cli: Vec<String>, config_value: Option<Vec<String>>) -> Vec<String> {
    if !cli.is_empty() {
        cli
    } else {
        config_value.unwrap_or_default()
    }
}

fn opt_f64(matches: &Matches, flag: &str, config_value: Option<f64>, default: f64) -> Result<f64, Box<dyn std::error::Error>> {
    match matches.opt_str(flag) {
        Some(raw) => Ok(raw.parse::<f64>().map_err(|e| format!("--{flag}: {e}"))?),
        None => Ok(config_value.unwrap_or(default)),
    }
}

fn opt_usize(matches: &Matches, flag: &str, config_value: Option<usize>, default: usize) -> Result<usize, Box<dyn std::error::Error>> {
    match matches.opt_str(flag) {
        Some(raw) => Ok(raw.parse::<usize>().map_err(|e| format!("--{flag}: {e}"))?),
        None => Ok(config_value.unwrap_or(default)),
    }
}
