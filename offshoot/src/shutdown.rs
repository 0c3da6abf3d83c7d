//! Terminating kill-on-exit children when this process shuts down.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::registry::{ChildRegistry, SweepReport};

/// Sweeps the child registry at shutdown.
#[derive(Debug)]
pub struct ShutdownHook {
    children: ChildRegistry,
    fired: AtomicUsize,
}

impl ShutdownHook {
    pub fn new(children: ChildRegistry) -> Self {
        Self {
            children,
            fired: AtomicUsize::new(0),
        }
    }

    /// Signal every live tracked child and clear the registry.
    ///
    /// Safe to call more than once; later calls find an empty registry
    /// unless new children were registered in between.
    pub fn fire(&self) -> SweepReport {
        let previous = self.fired.fetch_add(1, Ordering::SeqCst);
        let report = self.children.sweep();
        if previous == 0 {
            info!(
                signalled = report.signalled.len(),
                already_dead = report.already_dead.len(),
                failed = report.failed.len(),
                "shutdown sweep complete"
            );
        } else {
            debug!(signalled = report.signalled.len(), "shutdown sweep repeated");
        }
        report
    }

    /// How many times the hook has fired.
    pub fn times_fired(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }
}

/// Fires the shutdown hook when dropped.
///
/// Keep it alive for the lifetime of `main`. An isolated child leaves through
/// `std::process::exit`, which skips destructors, so a guard inherited by
/// re-running the same `main` never fires there.
#[must_use = "the hook fires when the guard is dropped"]
#[derive(Debug)]
pub struct ShutdownGuard {
    hook: Arc<ShutdownHook>,
}

impl ShutdownGuard {
    pub(crate) const fn new(hook: Arc<ShutdownHook>) -> Self {
        Self { hook }
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.hook.fire();
    }
}
