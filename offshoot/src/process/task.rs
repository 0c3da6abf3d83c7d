//! Concurrent tasks: one named thread per unit of work.

use std::thread;

use tracing::{debug, warn, Dispatch};
use uuid::Uuid;

use crate::error::{Result, SpawnError};
use crate::jobs::Work;
use crate::names;

use super::guard::run_guarded;
use super::handle::Completion;
use super::os;
use super::spawn::Shared;
use super::{SpawnHandle, SpawnOptions};

/// Start `work` on its own thread and return without waiting for it.
///
/// The thread inherits the caller's `tracing` dispatcher so its logs land
/// in the same subscriber, and enters the caller's Tokio runtime when there
/// is one so the work can spawn isolated processes of its own.
pub(crate) fn spawn_task(shared: &Shared, options: &SpawnOptions, work: Work) -> Result<SpawnHandle> {
    let label = work.label().to_string();
    let run = shared.catalog.runnable(work)?;

    shared.pool.discard_stale_connections();

    let id = Uuid::now_v7();
    let thread_name = options
        .display_name
        .clone()
        .unwrap_or_else(names::generate_name);
    let niceness = options
        .priority_hint
        .map(|hint| shared.task_priority.niceness(hint));
    let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
    let runtime = tokio::runtime::Handle::try_current().ok();
    let (settler, completion) = Completion::channel();
    let task_label = label.clone();

    thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            let _runtime = runtime.as_ref().map(tokio::runtime::Handle::enter);
            tracing::dispatcher::with_default(&dispatch, || {
                if let Some(niceness) = niceness {
                    // Best effort: raising priority usually needs privileges.
                    if let Err(e) = os::set_thread_niceness(niceness) {
                        warn!(task = %id, niceness, error = %e, "could not apply task priority");
                    }
                }
                debug!(task = %id, work = %task_label, "task started");
                let outcome = run_guarded(&task_label, run);
                debug!(task = %id, %outcome, "task finished");
                settler.settle(outcome);
            });
        })
        .map_err(|source| SpawnError::Task {
            name: thread_name.clone(),
            source,
        })?;

    debug!(task = %id, thread = %thread_name, work = %label, "scheduled concurrent task");
    Ok(SpawnHandle::task(id, label, completion))
}
