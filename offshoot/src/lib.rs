//! Offshoot - run units of work inline, on a concurrent task, or in an
//! isolated process.
//!
//! Isolated children are launched by re-running a program (the current
//! executable unless configured otherwise), so a host that spawns isolated
//! work must call [`child::take_ticket`] before starting any threads and
//! hand a ticket it finds to [`child::run_isolated`].

pub mod child;
pub mod config;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod names;
pub mod persistence;
pub mod process;
pub mod registry;
pub mod shutdown;
pub mod signals;

#[cfg(test)]
mod testing;

pub use error::{Result, SpawnError};
pub use jobs::{Job, JobCatalog, Work};
pub use persistence::{ConnectionPool, NoPool};
pub use process::{OptionOverrides, Outcome, SpawnHandle, SpawnOptions, Spawner, Strategy};
pub use shutdown::{ShutdownGuard, ShutdownHook};
