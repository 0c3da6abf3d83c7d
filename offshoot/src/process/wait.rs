//! Blocking on spawned work.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::persistence::ConnectionPool;

use super::{Outcome, SpawnHandle};

/// Waits for handles to settle.
#[derive(Clone)]
pub struct Waiter {
    pool: Arc<dyn ConnectionPool>,
}

impl Waiter {
    pub fn new(pool: Arc<dyn ConnectionPool>) -> Self {
        Self { pool }
    }

    /// Wait for every handle, in order, and return their outcomes.
    ///
    /// Never fails: work errors were already logged where they happened, and
    /// a process reaped by someone else counts as finished. Once everything
    /// has settled, connections left by finished tasks are discarded.
    pub async fn wait(&self, handles: &[SpawnHandle]) -> Vec<Outcome> {
        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            let outcome = handle.settled().await;
            debug!(id = %handle.id(), work = handle.label(), %outcome, "execution settled");
            outcomes.push(outcome);
        }
        self.pool.discard_stale_connections();
        outcomes
    }
}

impl fmt::Debug for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter").finish_non_exhaustive()
    }
}
