/// Status reported for a foreground pipeline that was suspended (128 + SIGTSTP).
pub const SUSPENDED: i32 = 128 + libc::SIGTSTP;

/// What `waitpid` told us about one child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Exited or killed; carries the shell-style exit code.
    Exited(i32),
    Stopped,
    Continued,
}

/// Decode a raw `waitpid` status word.
///
/// Processes terminated by a signal map to `128 + signal`.
pub fn decode_wait_status(raw_status: libc::c_int) -> WaitOutcome {
    if unsafe { libc::WIFEXITED(raw_status) } {
        return WaitOutcome::Exited(unsafe { libc::WEXITSTATUS(raw_status) });
    }

    if unsafe { libc::WIFSIGNALED(raw_status) } {
        let signal = unsafe { libc::WTERMSIG(raw_status) };
        return WaitOutcome::Exited(128 + signal);
    }

    if unsafe { libc::WIFSTOPPED(raw_status) } {
        return WaitOutcome::Stopped;
    }

    WaitOutcome::Continued
}
