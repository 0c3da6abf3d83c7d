//! Turning SIGTERM and SIGINT into an orderly exit.
//!
//! The handler itself only wakes a dedicated thread; cleanup runs on that
//! thread, where locks and logging are safe to use. Once cleanup is done the
//! signal is re-raised with its default action, so the process still ends
//! as "killed by signal" for whoever waits on it.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Run `cleanup` when SIGTERM or SIGINT arrives, then terminate with that
/// signal.
///
/// Only the first call installs anything.
#[cfg(unix)]
pub fn on_termination<F>(cleanup: F) -> io::Result<()>
where
    F: FnOnce(i32) + Send + 'static,
{
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    if INSTALLED.swap(true, Ordering::SeqCst) {
        warn!("termination handler already installed");
        return Ok(());
    }

    let mut signals = Signals::new([SIGTERM, SIGINT])?;
    std::thread::Builder::new()
        .name("offshoot-signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(pid = std::process::id(), signal, "termination signal received");
                cleanup(signal);
                terminate_with(signal);
            }
        })?;
    Ok(())
}

#[cfg(not(unix))]
pub fn on_termination<F>(_cleanup: F) -> io::Result<()>
where
    F: FnOnce(i32) + Send + 'static,
{
    INSTALLED.store(true, Ordering::SeqCst);
    Ok(())
}

#[cfg(unix)]
fn terminate_with(signal: i32) -> ! {
    if let Err(e) = signal_hook::low_level::emulate_default_handler(signal) {
        warn!(signal, error = %e, "could not re-raise signal");
    }
    std::process::exit(128 + signal)
}
