//! Isolated processes, parent side.
//!
//! A closure cannot follow work into a new process, so the parent re-runs a
//! program (by default its own executable) with a ticket in the environment.
//! The program's `main` hands the ticket to [`crate::child::run_isolated`],
//! which replays the child-side protocol and exits.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SpawnError};
use crate::jobs::{Job, Work};

use super::handle::Completion;
use super::spawn::Shared;
use super::{Outcome, SpawnHandle, SpawnOptions};

/// Environment variable carrying the JSON ticket into the child.
pub const TICKET_ENV: &str = "OFFSHOOT_TICKET";

/// Everything a child needs to run one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildTicket {
    pub job: Job,
    pub priority_hint: Option<i32>,
    pub display_name: Option<String>,
    pub parent_pid: u32,
    pub launched_at: DateTime<Utc>,
}

impl ChildTicket {
    pub(crate) fn new(job: Job, options: &SpawnOptions) -> Self {
        Self {
            job,
            priority_hint: options.priority_hint,
            display_name: options.display_name.clone(),
            parent_pid: std::process::id(),
            launched_at: Utc::now(),
        }
    }

    /// Serialise for the environment.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a ticket produced by [`ChildTicket::encode`].
    pub fn decode(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).context("failed to parse child ticket")
    }

    /// Take the ticket out of this process's environment, if there is one.
    ///
    /// The variable is removed so programs this child launches do not
    /// mistake themselves for isolated children. Changing the environment is
    /// only sound while this is the sole thread, so call it first in `main`.
    pub fn take_from_env() -> Option<anyhow::Result<Self>> {
        let raw = std::env::var_os(TICKET_ENV)?;
        std::env::remove_var(TICKET_ENV);
        Some(
            raw.into_string()
                .map_err(|_| anyhow::anyhow!("{TICKET_ENV} is not valid UTF-8"))
                .and_then(|raw| Self::decode(&raw)),
        )
    }
}

/// Launch `work` in a new process.
///
/// After launch a Tokio task owns the child and reaps it, then the registry
/// is pruned and, for kill-on-exit children, the pid is recorded.
#[cfg(unix)]
pub(crate) fn launch(shared: &Shared, options: &SpawnOptions, work: Work) -> Result<SpawnHandle> {
    let job = match work {
        Work::Job(job) => job,
        Work::Closure(_) => return Err(SpawnError::NotTransferable("closure".to_string())),
    };
    if !shared.catalog.contains(&job.name) {
        return Err(SpawnError::UnknownJob(job.name));
    }

    let runtime = tokio::runtime::Handle::try_current().map_err(|_| SpawnError::NoRuntime)?;
    let program = shared.child_program()?;
    let label = job.name.clone();
    let ticket = ChildTicket::new(job, options).encode()?;

    let mut command = tokio::process::Command::new(&program);
    command
        .envs(shared.child_env.iter().map(|(k, v)| (k, v)))
        .env(TICKET_ENV, ticket)
        .stdin(Stdio::null());
    if let Some(name) = &options.display_name {
        command.arg0(name);
    }

    let mut child = command.spawn().map_err(|source| SpawnError::Process {
        program: program.clone(),
        source,
    })?;
    let pid = child.id().ok_or_else(|| SpawnError::Process {
        program,
        source: std::io::Error::other("child exited before its pid was read"),
    })?;

    let (settler, completion) = Completion::channel();
    runtime.spawn(async move {
        let outcome = match child.wait().await {
            Ok(status) => Outcome::from_status(status),
            Err(e) => {
                debug!(pid, error = %e, "isolated process was reaped elsewhere");
                Outcome::Reaped
            }
        };
        debug!(pid, %outcome, "isolated process exited");
        settler.settle(outcome);
    });

    let pruned = shared.children.prune_dead();
    if options.kill_on_exit {
        shared.children.add(pid);
    }

    info!(
        pid,
        job = %label,
        kill_on_exit = options.kill_on_exit,
        pruned,
        "launched isolated process"
    );
    Ok(SpawnHandle::process(pid, label, completion))
}

#[cfg(not(unix))]
pub(crate) fn launch(_shared: &Shared, _options: &SpawnOptions, _work: Work) -> Result<SpawnHandle> {
    Err(SpawnError::Unsupported)
}

/// Resolve the program an isolated child runs.
pub(crate) fn resolve_program(configured: Option<&PathBuf>) -> Result<PathBuf> {
    match configured {
        Some(path) => Ok(path.clone()),
        None => std::env::current_exe().map_err(|source| SpawnError::Process {
            program: PathBuf::from("<current executable>"),
            source,
        }),
    }
}
