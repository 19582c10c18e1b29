//! A small, hand-picked subset of what the `nix` crate offers: just the
//! pieces the subprocess supervisor and the restoration guard need
//! (process identifiers, signal delivery, `waitpid`). Kept separate from
//! the engine crate the same way upstream `nix_subset` is kept separate
//! from the fuzzer that consumes it.

pub mod signal;
pub mod unistd;

pub use signal::Signal;
pub use unistd::{Pid, WaitStatus};
