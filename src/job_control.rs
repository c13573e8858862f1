use std::io;

use crate::status::{self, WaitOutcome};

/// Block until `pid` exits or stops.
pub fn wait_for_pid(pid: libc::pid_t) -> io::Result<WaitOutcome> {
    loop {
        match waitpid(pid, libc::WUNTRACED)? {
            Some(WaitOutcome::Continued) | None => continue,
            Some(outcome) => return Ok(outcome),
        }
    }
}

/// Non-blocking status check; `Ok(None)` means nothing changed.
pub fn poll_pid(pid: libc::pid_t) -> io::Result<Option<WaitOutcome>> {
    waitpid(pid, libc::WNOHANG | libc::WUNTRACED | libc::WCONTINUED)
}

fn waitpid(pid: libc::pid_t, flags: libc::c_int) -> io::Result<Option<WaitOutcome>> {
    let mut raw_status: libc::c_int = 0;

    loop {
        let rc = unsafe { libc::waitpid(pid, &mut raw_status, flags) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }

        if rc == 0 {
            return Ok(None);
        }

        return Ok(Some(status::decode_wait_status(raw_status)));
    }
}

/// Send `signal` to one process, retrying on EINTR.
pub fn send_signal(pid: libc::pid_t, signal: libc::c_int) -> io::Result<()> {
    if pid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process id",
        ));
    }

    loop {
        let rc = unsafe { libc::kill(pid, signal) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// Resume every process of a job. A process that already exited is skipped.
pub fn continue_all(pids: &[libc::pid_t]) -> io::Result<()> {
    for &pid in pids {
        match send_signal(pid, libc::SIGCONT) {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == Some(libc::ESRCH) => {
                log::debug!("pid {pid} gone before SIGCONT");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
