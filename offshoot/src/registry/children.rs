//! Isolated children to terminate when this process shuts down.

use std::fmt;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::process::os;

/// Liveness and signalling for process ids.
pub trait ProcessProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
    fn terminate(&self, pid: u32) -> io::Result<()>;
}

/// Probe backed by real OS calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    fn is_alive(&self, pid: u32) -> bool {
        os::is_alive(pid)
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        os::terminate(pid)
    }
}

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Pids that were sent a termination signal.
    pub signalled: Vec<u32>,
    /// Pids already gone at sweep time.
    pub already_dead: Vec<u32>,
    /// Pids that could not be signalled.
    pub failed: Vec<u32>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.signalled.is_empty() && self.already_dead.is_empty() && self.failed.is_empty()
    }
}

/// Pids of children marked kill-on-exit, scoped to the current process.
///
/// Entries are pruned lazily, so the set may still list children that have
/// exited since the last spawn.
#[derive(Clone)]
pub struct ChildRegistry {
    pids: Arc<Mutex<Vec<u32>>>,
    probe: Arc<dyn ProcessProbe>,
}

impl Default for ChildRegistry {
    fn default() -> Self {
        Self::with_probe(Arc::new(SystemProbe))
    }
}

impl ChildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry using a custom probe.
    pub fn with_probe(probe: Arc<dyn ProcessProbe>) -> Self {
        Self {
            pids: Arc::new(Mutex::new(Vec::new())),
            probe,
        }
    }

    /// Track `pid`; returns `false` if it was already tracked.
    pub fn add(&self, pid: u32) -> bool {
        let mut pids = self.pids.lock();
        if pids.contains(&pid) {
            return false;
        }
        pids.push(pid);
        true
    }

    /// Stop tracking `pid`.
    pub fn remove(&self, pid: u32) -> bool {
        let mut pids = self.pids.lock();
        let before = pids.len();
        pids.retain(|p| *p != pid);
        pids.len() != before
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.pids.lock().contains(&pid)
    }

    pub fn len(&self) -> usize {
        self.pids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.lock().is_empty()
    }

    /// Tracked pids in insertion order.
    pub fn snapshot(&self) -> Vec<u32> {
        self.pids.lock().clone()
    }

    /// Whether `pid` is alive according to this registry's probe.
    pub fn is_alive(&self, pid: u32) -> bool {
        self.probe.is_alive(pid)
    }

    /// Drop entries whose process has exited; returns how many were dropped.
    pub fn prune_dead(&self) -> usize {
        let mut pids = self.pids.lock();
        let before = pids.len();
        pids.retain(|pid| self.probe.is_alive(*pid));
        before - pids.len()
    }

    /// Forget every entry without signalling.
    pub fn reset(&self) {
        self.pids.lock().clear();
    }

    /// Signal every live entry, then clear the registry.
    ///
    /// Signal failures are expected when a child exits between the liveness
    /// check and the signal; they are recorded and skipped.
    pub fn sweep(&self) -> SweepReport {
        let pids = std::mem::take(&mut *self.pids.lock());
        let mut report = SweepReport::default();

        for pid in pids {
            if !self.probe.is_alive(pid) {
                report.already_dead.push(pid);
                continue;
            }
            match self.probe.terminate(pid) {
                Ok(()) => {
                    info!(pid, "terminated child on exit");
                    report.signalled.push(pid);
                }
                Err(e) => {
                    debug!(pid, error = %e, "child vanished before it could be signalled");
                    report.failed.push(pid);
                }
            }
        }

        report
    }
}

impl fmt::Debug for ChildRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildRegistry")
            .field("pids", &self.snapshot())
            .finish_non_exhaustive()
    }
}
