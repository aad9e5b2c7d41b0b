//! Operator interrupt handling
//!
//! SIGINT and SIGTERM only raise a flag. Probes poll it while waiting on their
//! child and the run controller checks it between stages, so an interrupted
//! run still unwinds through snapshot release instead of dying mid-copy.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_signal: libc::c_int) {
    // Only async-signal-safe work here.
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT and SIGTERM to the interrupt flag.
pub fn install() -> Result<(), std::io::Error> {
    for signal in [libc::SIGINT, libc::SIGTERM] {
        let previous = unsafe {
            libc::signal(
                signal,
                on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t,
            )
        };
        if previous == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Whether the operator asked the run to stop
pub fn requested() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}
