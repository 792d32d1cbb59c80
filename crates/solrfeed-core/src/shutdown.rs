//! Graceful shutdown via an atomic flag set from signal handlers

use std::sync::atomic::{AtomicBool, Ordering};

/// Exit status used when a run stops on SIGINT/SIGTERM
pub const INTERRUPTED_EXIT_CODE: u8 = 130;

/// Global shutdown flag
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

/// Install SIGINT/SIGTERM handlers.
///
/// First signal: set the shutdown flag so the pipeline stops after the
/// batch in flight. Second signal: exit immediately.
pub fn install_signal_handlers() -> std::io::Result<()> {
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        // SAFETY: the handler only does an atomic swap and `_exit`, both async-signal-safe
        unsafe {
            signal_hook::low_level::register(signal, || {
                if shutdown_flag().swap(true, Ordering::Relaxed) {
                    signal_hook::low_level::exit(i32::from(INTERRUPTED_EXIT_CODE));
                }
            })?;
        }
    }
    Ok(())
}
