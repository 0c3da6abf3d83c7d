//! Errors surfaced synchronously by [`Spawner::spawn`](crate::Spawner::spawn).
//!
//! Failures inside a unit of work never show up here: they are caught at the
//! task or process boundary and only reach the logs.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to start a unit of work.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The OS refused to create the isolated process.
    #[error("failed to launch isolated process from {}: {source}", program.display())]
    Process {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The OS refused to create the thread backing a concurrent task.
    #[error("failed to start concurrent task '{name}': {source}")]
    Task {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Isolated processes are reaped by a Tokio task, so a runtime must be entered.
    #[error("isolated processes can only be spawned from within a Tokio runtime")]
    NoRuntime,

    /// Closures capture live state and cannot be replayed in another process.
    #[error("work '{0}' is a closure and cannot run in an isolated process; register it as a job")]
    NotTransferable(String),

    /// The job name is not in the catalog.
    #[error("unknown job '{0}'")]
    UnknownJob(String),

    /// Isolated processes are not available on this platform.
    #[error("isolated processes are not supported on this platform")]
    Unsupported,

    /// The child ticket could not be encoded.
    #[error("failed to encode child ticket: {0}")]
    Ticket(#[from] serde_json::Error),
}

pub type Result<T, E = SpawnError> = std::result::Result<T, E>;
