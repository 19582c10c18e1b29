//! Turns an [`OrchestratorEvent`] into the human-readable progress lines on
//! standard output (spec §6, "Human-readable progress log"). Grounded on
//! `World::report_event`'s plain `println!`/`print!` dispatch — no `log`
//! or `tracing` crate, matching the teacher's choice to keep fuzzer output
//! unbuffered and uninstrumented so it stays readable under a signal
//! handler (`World::report_event`'s own comment: "println uses a lock,
//! which may mess up the signal handling").

use mutantfuzz_common::OrchestratorEvent;

pub fn report_event(event: &OrchestratorEvent) {
    match event {
        OrchestratorEvent::Start => println!("START"),
        OrchestratorEvent::BootstrapSiteCounts { functions, sites } => {
            println!("found {sites} mutable site(s) across {functions} function(s)");
        }
        OrchestratorEvent::GeneratingMutant { number } => print!("mutant {number}\t"),
        OrchestratorEvent::FunctionUnreachable { function_name } => {
            println!("function `{function_name}` never reached, caching as unreachable");
        }
        OrchestratorEvent::SiteUnreachable { site_offset } => {
            println!("site 0x{site_offset:x} never reached");
        }
        OrchestratorEvent::MutantInstalled => print!("installed\t"),
        OrchestratorEvent::Pruned => println!("pruned (invalid mutant)"),
        OrchestratorEvent::FuzzingMutant => print!("fuzzing\t"),
        OrchestratorEvent::FinishedFuzzing { elapsed_secs, killed } => {
            let verdict = if *killed { "KILLED" } else { "survived" };
            println!("{verdict}\t{elapsed_secs:.2}s");
        }
        OrchestratorEvent::RepeatBudgetExhausted => {
            println!("repeat-mutant budget exhausted, reusing least-visited site");
        }
        OrchestratorEvent::RestoredBinary => println!("base binary restored"),
        OrchestratorEvent::StartingFinalFuzz => println!("\n==================== FINAL FUZZ ===================="),
        OrchestratorEvent::Replaying { number, path } => println!("replaying mutant {number} from {path}"),
        OrchestratorEvent::End => println!("\n======================== END ========================"),
    }
}
