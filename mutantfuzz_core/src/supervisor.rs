//! C7 — Subprocess Supervisor.
//!
//! Launches a shell command under a hard wall-clock timeout, killing its
//! entire process group on expiry. Grounded on
//! `fuzzutil.py::silent_run_with_timeout` (`setsid` + poll loop +
//! `killpg(SIGTERM)` in a `finally`) and `libfuzzer_prune.py`'s adaptive
//! poll quantum (`time.sleep(min(0.5, timeout / 10.0))`).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use mutantfuzz_nix::unistd::{self, Pid, WaitStatus};
use mutantfuzz_nix::signal::{self, Signal};

use crate::error::{MutantFuzzError, Result};

/// How a child process's run ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Outcome {
    /// The child exited on its own with this code.
    Exited(i32),
    /// The child was killed by a signal before exiting.
    Signaled(i32),
    /// The wall-clock timeout expired; the process group was killed.
    TimedOut,
}

impl Outcome {
    /// Spec §4.6 step 6 treats any non-zero termination, including a
    /// timeout, as "not a clean pass": `Exited(0)` is the only
    /// survived/reachable/valid disposition.
    pub fn is_clean_exit_zero(self) -> bool {
        matches!(self, Outcome::Exited(0))
    }
}

pub struct RunResult {
    pub outcome: Outcome,
    pub elapsed: Duration,
    /// Last `tail_lines` lines of captured stderr, only populated when
    /// `verbose` is requested by the caller.
    pub stderr_tail: Vec<String>,
}

/// Run `shell_command` under a bash-like shell with a hard `timeout`,
/// polling for completion with an adaptive quantum (never longer than half
/// a second, scaling down for short timeouts).
pub fn run_with_timeout(shell_command: &str, timeout: Duration, verbose: bool) -> Result<RunResult> {
    let mut stderr_file = tempfile::tempfile()?;

    let mut child = unsafe {
        Command::new("sh")
            .arg("-c")
            .arg(shell_command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr_file.try_clone()?)
            .pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            })
            .spawn()
            .map_err(MutantFuzzError::Io)?
    };

    let pid = Pid::from_raw(child.id() as libc::pid_t);
    let pgid = unistd::getpgid(pid)?;
    let start = Instant::now();
    let poll_quantum = poll_quantum_for(timeout);

    let outcome = loop {
        match unistd::waitpid_nohang(pid)? {
            WaitStatus::Exited(code) => break Outcome::Exited(code),
            WaitStatus::Signaled(sig) => break Outcome::Signaled(sig),
            WaitStatus::StillAlive => {
                if start.elapsed() >= timeout {
                    signal::kill_process_group(pgid.as_raw(), Signal::SIGTERM)?;
                    // Give the group a moment to actually die, then reap.
                    std::thread::sleep(Duration::from_millis(50));
                    let _ = child.wait();
                    break Outcome::TimedOut;
                }
                std::thread::sleep(poll_quantum.min(timeout.saturating_sub(start.elapsed())).max(Duration::from_millis(1)));
            }
        }
    };

    let stderr_tail = if verbose {
        read_tail(&mut stderr_file, 50)?
    } else {
        Vec::new()
    };

    Ok(RunResult {
        outcome,
        elapsed: start.elapsed(),
        stderr_tail,
    })
}

/// Sleep quantum for polling exit: never more than 500ms, scaled down for
/// small timeouts so short checks stay responsive. Mirrors
/// `libfuzzer_prune.py`'s `min(0.5, timeout / 10.0)` exactly.
fn poll_quantum_for(timeout: Duration) -> Duration {
    let scaled = timeout.as_secs_f64() / 10.0;
    Duration::from_secs_f64(scaled.min(0.5).max(0.001))
}

fn read_tail(file: &mut File, max_lines: usize) -> Result<Vec<String>> {
    file.seek(SeekFrom::Start(0))?;
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    let lines: Vec<String> = text.lines().map(str::to_owned).collect();
    let start = lines.len().saturating_sub(max_lines);
    Ok(lines[start..].to_vec())
}

/// Write `content` to a sibling temporary path and atomically rename it
/// onto `target`, then mark it executable. Used for every binary-install
/// step in the orchestrator (spec §5, "atomic rename pattern") so a
/// concurrently-exiting child holding the old file descriptor never sees a
/// half-written file.
pub fn atomic_install(target: &std::path::Path, content: &[u8]) -> Result<()> {
    let tmp_path = target.with_extension("mutantfuzz_tmp");
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(content)?;
        tmp.sync_all()?;
    }
    std::fs::rename(&tmp_path, target)?;
    mark_executable(target)?;
    Ok(())
}

#[cfg(unix)]
fn mark_executable(path: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_command_exits_cleanly() {
        let result = run_with_timeout("exit 0", Duration::from_secs(2), false).unwrap();
        assert_eq!(result.outcome, Outcome::Exited(0));
        assert!(result.outcome.is_clean_exit_zero());
    }

    #[test]
    fn nonzero_exit_is_not_clean() {
        let result = run_with_timeout("exit 7", Duration::from_secs(2), false).unwrap();
        assert_eq!(result.outcome, Outcome::Exited(7));
        assert!(!result.outcome.is_clean_exit_zero());
    }

    #[test]
    fn timeout_kills_the_whole_group() {
        let result = run_with_timeout("sleep 5 & wait", Duration::from_millis(200), false).unwrap();
        assert_eq!(result.outcome, Outcome::TimedOut);
        assert!(result.elapsed < Duration::from_secs(2));
    }

    #[test]
    fn poll_quantum_scales_down_for_small_timeouts() {
        assert_eq!(poll_quantum_for(Duration::from_millis(100)), Duration::from_millis(10));
        assert_eq!(poll_quantum_for(Duration::from_secs(60)), Duration::from_millis(500));
    }

    #[test]
    fn atomic_install_writes_executable_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("bin");
        atomic_install(&target, b"\x7fELF").unwrap();
        let meta = std::fs::metadata(&target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"\x7fELF");
        use std::os::unix::fs::PermissionsExt;
        assert!(meta.permissions().mode() & 0o111 != 0);
    }
}
