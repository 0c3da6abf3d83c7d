//! Hooks into the host's connection pool.
//!
//! A process launched by the spawner must not share live connections with
//! its parent, and finished concurrent tasks leave connections behind. The
//! spawner calls these hooks at the matching points; the pool itself lives
//! in the host application.

use anyhow::Result;

/// Connection pool lifecycle hooks.
pub trait ConnectionPool: Send + Sync {
    /// Establish this process's own connections. Called once in an isolated
    /// child before its work runs.
    fn reconnect(&self) -> Result<()>;

    /// Close every connection owned by this process. Called once when an
    /// isolated child finishes, whatever the outcome.
    fn release_all_connections(&self);

    /// Drop connections held by threads that have finished.
    fn discard_stale_connections(&self);
}

/// Pool hooks for hosts without a connection pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPool;

impl ConnectionPool for NoPool {
    fn reconnect(&self) -> Result<()> {
        Ok(())
    }

    fn release_all_connections(&self) {}

    fn discard_stale_connections(&self) {}
}
