//! Operating system signals, trimmed to the ones the orchestrator installs
//! handlers for or sends to a child process group.

use std::fmt;
use std::io;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[repr(i32)]
pub enum Signal {
    SIGHUP = libc::SIGHUP,
    SIGINT = libc::SIGINT,
    SIGQUIT = libc::SIGQUIT,
    SIGABRT = libc::SIGABRT,
    SIGBUS = libc::SIGBUS,
    SIGFPE = libc::SIGFPE,
    SIGKILL = libc::SIGKILL,
    SIGSEGV = libc::SIGSEGV,
    SIGALRM = libc::SIGALRM,
    SIGTERM = libc::SIGTERM,
    SIGCHLD = libc::SIGCHLD,
}

impl Signal {
    pub fn as_str(self) -> &'static str {
        match self {
            Signal::SIGHUP => "SIGHUP",
            Signal::SIGINT => "SIGINT",
            Signal::SIGQUIT => "SIGQUIT",
            Signal::SIGABRT => "SIGABRT",
            Signal::SIGBUS => "SIGBUS",
            Signal::SIGFPE => "SIGFPE",
            Signal::SIGKILL => "SIGKILL",
            Signal::SIGSEGV => "SIGSEGV",
            Signal::SIGALRM => "SIGALRM",
            Signal::SIGTERM => "SIGTERM",
            Signal::SIGCHLD => "SIGCHLD",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signals the orchestrator traps so it can run the restoration routine
/// before the process actually dies. Mirrors the set the teacher's
/// `signals_handler.rs` installs (`SIGINT, SIGTERM, SIGSEGV, SIGBUS,
/// SIGABRT, SIGFPE, SIGALRM`).
pub const TRAPPED_SIGNALS: [Signal; 7] = [
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGSEGV,
    Signal::SIGBUS,
    Signal::SIGABRT,
    Signal::SIGFPE,
    Signal::SIGALRM,
];

/// Install `handler` for every signal in `TRAPPED_SIGNALS`. `handler` must
/// never return: it is expected to restore the base image and then
/// re-raise or exit.
///
/// # Safety
/// Only safe to call once; the previous disposition for each trapped
/// signal is discarded, not saved. Matches the single-shot usage in
/// `set_signal_handlers` that grounds this function.
pub unsafe fn install_handler(handler: extern "C" fn(libc::c_int)) -> io::Result<()> {
    for signal in TRAPPED_SIGNALS {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler as usize;
        action.sa_flags = 0;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(signal as libc::c_int, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Reverts every trapped signal back to its default disposition (`SIG_DFL`),
/// used right before re-raising inside the handler so the second delivery
/// actually terminates the process instead of looping.
pub fn reset_to_default() -> io::Result<()> {
    for signal in TRAPPED_SIGNALS {
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = libc::SIG_DFL;
            action.sa_flags = 0;
            libc::sigemptyset(&mut action.sa_mask);
            if libc::sigaction(signal as libc::c_int, &action, std::ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }
    Ok(())
}

/// Send `signal` to the process *group* led by `pgid`, the way the
/// supervisor tears down a fuzzer's whole process tree on timeout.
pub fn kill_process_group(pgid: i32, signal: Signal) -> io::Result<()> {
    let ret = unsafe { libc::killpg(pgid, signal as libc::c_int) };
    if ret == -1 {
        let err = io::Error::last_os_error();
        // ESRCH: the group is already gone, not our problem.
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        return Err(err);
    }
    Ok(())
}
