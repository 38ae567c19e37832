//! Shutdown Handling
//!
//! On Unix, SIGINT and SIGTERM set a process-wide flag instead of killing the
//! driver outright, so the in-flight child can be torn down and no partial
//! artifact is left behind. `CancelToken` combines that flag with an explicit,
//! per-run cancellation switch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Global flag set by the signal handler to request a graceful shutdown.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Check if a graceful shutdown has been requested via SIGINT/SIGTERM.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

/// Install SIGINT/SIGTERM handlers that set the shutdown flag.
/// The handler is async-signal-safe (only sets an atomic).
#[cfg(unix)]
pub fn install_shutdown_handler() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = shutdown_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(libc::SIGINT, &sa, std::ptr::null_mut());
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
    }
}

#[cfg(unix)]
extern "C" fn shutdown_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

/// No-op on non-Unix.
#[cfg(not(unix))]
pub fn install_shutdown_handler() {}

/// Cancellation signal shared between the driver loop and the output
/// collector. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested on this token or by a signal
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || shutdown_requested()
    }
}
