//! Bridge between asynchronous signals and the synchronous executor.
//!
//! Handlers only touch the atomics in this module: a fixed array mirroring the
//! foreground pids, and one pending flag per signal. Anything that needs to
//! allocate or print (reaping, moving jobs around, announcing) happens later,
//! when the executor drains the flags at a synchronous point.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use crate::error::ShellError;

const TRACKED_SLOTS: usize = 64;

static FOREGROUND: [AtomicI32; TRACKED_SLOTS] = [const { AtomicI32::new(0) }; TRACKED_SLOTS];

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static SUSPENDED: AtomicBool = AtomicBool::new(false);
static CHILD_CHANGED: AtomicBool = AtomicBool::new(false);
static CONTINUED: AtomicBool = AtomicBool::new(false);

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Handle to the signal bridge, limited to the operations the executor needs:
/// mirroring the foreground set and draining pending-signal flags.
///
/// A detached bridge has no handlers behind it; its operations are no-ops.
#[derive(Debug, Clone, Copy)]
pub struct SignalBridge {
    attached: bool,
}

impl SignalBridge {
    /// Install handlers for SIGINT, SIGTSTP, SIGCHLD and SIGCONT.
    ///
    /// Can succeed only once per process.
    pub fn install() -> Result<Self, ShellError> {
        if INSTALLED.swap(true, Ordering::SeqCst) {
            return Err(ShellError::SignalSetup(
                "signal handlers already installed".to_string(),
            ));
        }

        // ctrlc runs this on its own thread, outside signal context.
        ctrlc::set_handler(on_interrupt)?;

        let install = |signal: libc::c_int, handler: extern "C" fn(libc::c_int)| {
            install_handler(signal, handler).map_err(|e| ShellError::SignalSetup(e.to_string()))
        };
        install(libc::SIGTSTP, on_suspend)?;
        install(libc::SIGCHLD, on_child)?;
        install(libc::SIGCONT, on_continue)?;

        log::debug!("signal bridge installed");
        Ok(Self { attached: true })
    }

    pub fn detached() -> Self {
        Self { attached: false }
    }

    /// Make `pid` reachable from the interrupt and suspend handlers.
    pub fn track(&self, pid: libc::pid_t) {
        if self.attached && !track_slot(pid) {
            log::warn!("foreground set full; pid {pid} will not receive forwarded signals");
        }
    }

    pub fn untrack(&self, pid: libc::pid_t) {
        if self.attached {
            untrack_slot(pid);
        }
    }

    pub fn clear(&self) {
        if self.attached {
            clear_slots();
        }
    }

    pub fn take_interrupted(&self) -> bool {
        self.attached && INTERRUPTED.swap(false, Ordering::SeqCst)
    }

    pub fn take_suspended(&self) -> bool {
        self.attached && SUSPENDED.swap(false, Ordering::SeqCst)
    }

    pub fn take_child_changed(&self) -> bool {
        self.attached && CHILD_CHANGED.swap(false, Ordering::SeqCst)
    }

    pub fn take_continued(&self) -> bool {
        self.attached && CONTINUED.swap(false, Ordering::SeqCst)
    }
}

fn track_slot(pid: libc::pid_t) -> bool {
    FOREGROUND.iter().any(|slot| {
        slot.compare_exchange(0, pid, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    })
}

fn untrack_slot(pid: libc::pid_t) {
    for slot in FOREGROUND.iter() {
        let _ = slot.compare_exchange(pid, 0, Ordering::SeqCst, Ordering::SeqCst);
    }
}

fn clear_slots() {
    for slot in FOREGROUND.iter() {
        slot.store(0, Ordering::SeqCst);
    }
}

/// Send `signal` to every tracked pid. Async-signal-safe: atomics and kill(2).
fn forward(signal: libc::c_int) {
    for slot in FOREGROUND.iter() {
        let pid = slot.load(Ordering::SeqCst);
        if pid > 0 {
            unsafe {
                libc::kill(pid, signal);
            }
        }
    }
}

fn on_interrupt() {
    forward(libc::SIGINT);
    clear_slots();
    INTERRUPTED.store(true, Ordering::SeqCst);
}

extern "C" fn on_suspend(_signal: libc::c_int) {
    let _errno = ErrnoGuard::save();
    forward(libc::SIGTSTP);
    SUSPENDED.store(true, Ordering::SeqCst);
}

extern "C" fn on_child(_signal: libc::c_int) {
    CHILD_CHANGED.store(true, Ordering::SeqCst);
}

extern "C" fn on_continue(_signal: libc::c_int) {
    CONTINUED.store(true, Ordering::SeqCst);
}

/// `sigaction` with the signal itself masked during the handler, so the
/// handler never re-enters.
fn install_handler(signal: libc::c_int, handler: extern "C" fn(libc::c_int)) -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaddset(&mut action.sa_mask, signal);

        if libc::sigaction(signal, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Restores `errno` on drop so a handler's kill(2) can't clobber the value
/// the interrupted code is about to read.
struct ErrnoGuard(libc::c_int);

impl ErrnoGuard {
    fn save() -> Self {
        Self(unsafe { *errno_location() })
    }
}

impl Drop for ErrnoGuard {
    fn drop(&mut self) {
        unsafe {
            *errno_location() = self.0;
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn errno_location() -> *mut libc::c_int {
    unsafe { libc::__errno_location() }
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
unsafe fn errno_location() -> *mut libc::c_int {
    unsafe { libc::__error() }
}

#[cfg(any(target_os = "netbsd", target_os = "openbsd"))]
unsafe fn errno_location() -> *mut libc::c_int {
    unsafe { libc::__errno() }
}
