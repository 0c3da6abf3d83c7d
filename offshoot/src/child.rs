//! Isolated processes, child side.
//!
//! A program that can be used as an isolated child calls [`take_ticket`] at
//! the top of `main`, before any thread exists. If it gets a ticket it builds
//! its [`Spawner`] and logging and hands the ticket to [`run_isolated`],
//! which runs the job and exits.

use std::time::Instant;

use tracing::{error, info, warn};

use crate::logging;
use crate::process::{os, run_guarded, ChildTicket, Outcome};
use crate::{signals, Spawner};

/// Exit status when the job failed, panicked or could not be prepared.
pub const EXIT_FAILED: i32 = 1;

/// Exit status when the ticket could not be read.
pub const EXIT_BAD_TICKET: i32 = 2;

/// Take the ticket out of the environment, if this process was launched as
/// an isolated child.
///
/// Must run while the process is still single-threaded.
pub fn take_ticket() -> Option<anyhow::Result<ChildTicket>> {
    ChildTicket::take_from_env()
}

/// Run the job described by `ticket` and exit.
///
/// Exits through [`std::process::exit`], so no destructors run: a parent's
/// `ShutdownGuard` re-created by the same `main` does not fire here. SIGTERM
/// and SIGINT still get the cleanup a finished job gets before the signal
/// ends the process.
pub fn run_isolated(spawner: &Spawner, ticket: anyhow::Result<ChildTicket>) -> ! {
    let code = match ticket {
        Ok(ticket) => {
            install_termination_cleanup(spawner);
            run_ticket(spawner, ticket)
        }
        Err(e) => {
            error!(pid = std::process::id(), error = %format!("{e:#}"), "unreadable child ticket");
            EXIT_BAD_TICKET
        }
    };

    logging::flush();
    std::process::exit(code);
}

fn install_termination_cleanup(spawner: &Spawner) {
    let spawner = spawner.clone();
    let installed = signals::on_termination(move |signal| {
        warn!(pid = std::process::id(), signal, "isolated process interrupted");
        interrupted_cleanup(&spawner);
        logging::flush();
    });
    if let Err(e) = installed {
        warn!(pid = std::process::id(), error = %e, "could not install termination handler");
    }
}

/// Step 7 for a child that will not reach the end of [`run_ticket`].
fn interrupted_cleanup(spawner: &Spawner) {
    spawner.pool().release_all_connections();
    spawner.shutdown_hook().fire();
}

/// Run one ticket in this process and return the exit status to use.
///
/// The order matters: registries inherited from the parent are cleared and
/// released before the host gets its own connections, and cleanup runs
/// whatever the job did.
pub fn run_ticket(spawner: &Spawner, ticket: ChildTicket) -> i32 {
    let started = Instant::now();
    let pid = std::process::id();
    let job = ticket.job.name.clone();

    // The parent's children are not ours to terminate.
    spawner.children().reset();

    if let Some(hint) = ticket.priority_hint {
        if let Err(e) = os::set_process_niceness(hint) {
            warn!(pid, niceness = hint, error = %e, "could not apply process priority");
        }
    }

    let drained = spawner.resources().drain();
    if drained.failed > 0 {
        warn!(pid, failed = drained.failed, "some inherited resources did not close");
    }

    let outcome = match spawner.pool().reconnect() {
        Ok(()) => {
            if let Some(name) = &ticket.display_name {
                if let Err(e) = os::set_process_title(name) {
                    warn!(pid, name = %name, error = %e, "could not set process title");
                }
            }
            match spawner.catalog().resolve(ticket.job) {
                Ok(run) => run_guarded(&job, run),
                Err(e) => {
                    error!(pid, job = %job, error = %e, "isolated job failed");
                    Outcome::Failed
                }
            }
        }
        Err(e) => {
            error!(pid, job = %job, error = %format!("{e:#}"), "could not reconnect in isolated process");
            Outcome::Failed
        }
    };

    spawner.pool().release_all_connections();
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    info!(
        pid,
        parent = ticket.parent_pid,
        job = %job,
        %outcome,
        elapsed_ms,
        "isolated process finished"
    );
    spawner.shutdown_hook().fire();

    if outcome.is_success() {
        0
    } else {
        EXIT_FAILED
    }
}
