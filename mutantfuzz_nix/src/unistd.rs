//! Process identifiers and the sliver of `wait(2)` the supervisor needs to
//! poll a child without blocking. Shaped after `nix_subset::unistd::Pid`.

use std::fmt;
use std::io;

/// Newtype around `pid_t`, so a raw integer offset can never be passed
/// where a process id is expected by accident.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Pid(libc::pid_t);

impl Pid {
    pub fn from_raw(pid: libc::pid_t) -> Self {
        Pid(pid)
    }

    pub fn as_raw(self) -> libc::pid_t {
        self.0
    }

    pub fn this() -> Self {
        Pid(unsafe { libc::getpid() })
    }
}

impl From<Pid> for libc::pid_t {
    fn from(pid: Pid) -> Self {
        pid.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum WaitStatus {
    /// The child exited on its own; carries its exit code.
    Exited(i32),
    /// The child was killed by a signal before it could exit normally.
    Signaled(i32),
    /// `waitpid(WNOHANG)` found nothing to report yet.
    StillAlive,
}

/// Non-blocking poll of a single child pid, used in the supervisor's timeout
/// loop instead of a blocking `wait(2)` so the elapsed-time budget can be
/// checked between polls.
pub fn waitpid_nohang(pid: Pid) -> io::Result<WaitStatus> {
    let mut status: libc::c_int = 0;
    let ret = unsafe { libc::waitpid(pid.as_raw(), &mut status, libc::WNOHANG) };
    if ret == 0 {
        return Ok(WaitStatus::StillAlive);
    }
    if ret == -1 {
        return Err(io::Error::last_os_error());
    }
    unsafe {
        if libc::WIFEXITED(status) {
            Ok(WaitStatus::Exited(libc::WEXITSTATUS(status)))
        } else if libc::WIFSIGNALED(status) {
            Ok(WaitStatus::Signaled(libc::WTERMSIG(status)))
        } else {
            Ok(WaitStatus::StillAlive)
        }
    }
}

/// Returns the pid of the process group led by `pid`. Used right after
/// spawning a child started with `setsid()`, whose pgid equals its own pid.
pub fn getpgid(pid: Pid) -> io::Result<Pid> {
    let ret = unsafe { libc::getpgid(pid.as_raw()) };
    if ret == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(Pid::from_raw(ret))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn this_pid_matches_own_group() {
        let pid = Pid::this();
        assert!(pid.as_raw() > 0);
        assert_eq!(getpgid(pid).unwrap().as_raw() > 0, true);
    }
}
