//! SIGINT handling.
//!
//! Ctrl-C must not kill the process while the destination is mounted. The
//! handler only records the request; the running tool receives the same
//! signal and fails, and the orchestrator checks the flag between steps so
//! the error path unwinds and unmounts.

use std::sync::atomic::{AtomicBool, Ordering};

static CANCEL_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_signal: libc::c_int) {
    CANCEL_REQUESTED.store(true, Ordering::SeqCst);
}

/// Install the SIGINT handler. Call once from `main`.
///
/// `SA_RESTART` is left unset so a blocked read at a prompt returns
/// `EINTR` instead of waiting for the operator to press Enter.
pub fn install_handler() {
    let handler: extern "C" fn(libc::c_int) = on_sigint;
    // SAFETY: the handler only performs an atomic store, which is
    // async-signal-safe, and `action` is fully initialised before use.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler as libc::sighandler_t;
        action.sa_flags = 0;
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
    }
}

pub fn cancel_requested() -> bool {
    CANCEL_REQUESTED.load(Ordering::SeqCst)
}

pub fn clear_cancel_flag() {
    CANCEL_REQUESTED.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_flag_round_trip() {
        clear_cancel_flag();
        assert!(!cancel_requested());
        on_sigint(libc::SIGINT);
        assert!(cancel_requested());
        clear_cancel_flag();
        assert!(!cancel_requested());
    }

    #[test]
    #[serial]
    fn test_installed_handler_records_sigint() {
        install_handler();
        clear_cancel_flag();
        unsafe {
            libc::raise(libc::SIGINT);
        }
        assert!(cancel_requested());
        clear_cancel_flag();
    }
}
