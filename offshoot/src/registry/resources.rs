//! Resources that a fresh isolated process must release before doing work.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// A handle the host can close.
pub trait Closable: Send + Sync {
    /// Whether the resource is already released.
    fn is_closed(&self) -> bool;

    /// Release the resource.
    fn close(&self) -> Result<()>;

    /// Name used in logs.
    fn describe(&self) -> String {
        "resource".to_string()
    }
}

/// Any owned value tracked as a resource; closing drops it.
///
/// Dropping a `TcpListener`, `File` or connection is what releases the
/// descriptor, so this covers most host resources.
pub struct Tracked<T> {
    name: String,
    value: Mutex<Option<T>>,
}

impl<T> Tracked<T> {
    /// Track `value` under `name`.
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            value: Mutex::new(Some(value)),
        }
    }

    /// Run `f` against the value if it is still open.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.value.lock().as_ref().map(f)
    }
}

impl<T: Send> Closable for Tracked<T> {
    fn is_closed(&self) -> bool {
        self.value.lock().is_none()
    }

    fn close(&self) -> Result<()> {
        drop(self.value.lock().take());
        Ok(())
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

impl<T> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("name", &self.name)
            .field("open", &self.value.lock().is_some())
            .finish()
    }
}

/// Counts from one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub closed: usize,
    pub already_closed: usize,
    pub failed: usize,
}

/// Ordered list of resources registered by the host.
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    entries: Arc<Mutex<Vec<Arc<dyn Closable>>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tracked list wholesale.
    pub fn replace(&self, resources: Vec<Arc<dyn Closable>>) {
        *self.entries.lock() = resources;
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Close every entry that is still open, then forget all of them.
    ///
    /// The list is taken before closing, so a nested drain sees nothing.
    pub fn drain(&self) -> DrainReport {
        let entries = std::mem::take(&mut *self.entries.lock());
        let mut report = DrainReport::default();

        for entry in entries {
            if entry.is_closed() {
                report.already_closed += 1;
                continue;
            }
            match entry.close() {
                Ok(()) => {
                    debug!(resource = %entry.describe(), "closed inherited resource");
                    report.closed += 1;
                }
                Err(e) => {
                    warn!(resource = %entry.describe(), error = %e, "failed to close inherited resource");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.entries.lock().iter().map(|e| e.describe()).collect();
        f.debug_struct("ResourceRegistry").field("entries", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        closes: AtomicUsize,
    }

    impl Closable for Counting {
        fn is_closed(&self) -> bool {
            self.closes.load(Ordering::SeqCst) > 0
        }

        fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Stubborn;

    impl Closable for Stubborn {
        fn is_closed(&self) -> bool {
            false
        }

        fn close(&self) -> Result<()> {
            anyhow::bail!("device busy")
        }
    }

    #[test]
    fn test_drain_closes_each_open_entry_once() {
        let first = Arc::new(Counting::default());
        let second = Arc::new(Counting::default());
        second.close().unwrap();

        let registry = ResourceRegistry::new();
        registry.replace(vec![first.clone(), second.clone()]);

        let report = registry.drain();
        assert_eq!(report.closed, 1);
        assert_eq!(report.already_closed, 1);
        assert_eq!(first.closes.load(Ordering::SeqCst), 1);
        assert_eq!(second.closes.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());

        assert_eq!(registry.drain(), DrainReport::default());
        assert_eq!(first.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_replace_is_not_additive() {
        let registry = ResourceRegistry::new();
        registry.replace(vec![Arc::new(Counting::default()), Arc::new(Counting::default())]);
        registry.replace(vec![Arc::new(Counting::default())]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failed_close_does_not_stop_drain() {
        let after = Arc::new(Counting::default());
        let registry = ResourceRegistry::new();
        registry.replace(vec![Arc::new(Stubborn), after.clone()]);

        let report = registry.drain();
        assert_eq!(report.failed, 1);
        assert_eq!(report.closed, 1);
        assert!(after.is_closed());
    }

    #[test]
    fn test_tracked_listener_is_released() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let tracked = Arc::new(Tracked::new("http", listener));

        let registry = ResourceRegistry::new();
        registry.replace(vec![tracked.clone()]);
        assert_eq!(tracked.with(|l| l.local_addr().unwrap()), Some(addr));

        registry.drain();
        assert!(tracked.is_closed());
        assert_eq!(tracked.with(|_| ()), None);
        // The port is free again once the listener is dropped.
        assert!(std::net::TcpListener::bind(addr).is_ok());
    }

    #[test]
    fn test_tracked_file() {
        let file = tempfile::tempfile().unwrap();
        let tracked = Tracked::new("scratch", file);
        assert!(!tracked.is_closed());
        assert_eq!(tracked.describe(), "scratch");
        tracked.close().unwrap();
        assert!(tracked.is_closed());
    }
}
