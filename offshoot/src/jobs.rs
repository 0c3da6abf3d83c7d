//! Units of work and the catalog of named jobs.
//!
//! A [`Job`] is a name plus a JSON payload. Because it is plain data it can
//! be handed to a freshly launched process, which looks the name up in its
//! own [`JobCatalog`]. Closures are only usable in-process.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::SpawnError;
use crate::process::{OptionOverrides, Strategy};
use crate::Spawner;

/// A registered job body.
pub type JobFn = Arc<dyn Fn(&Value) -> Result<()> + Send + Sync>;

/// A unit of work ready to run on the current process.
pub type Runnable = Box<dyn FnOnce() -> Result<()> + Send>;

/// A named job invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Catalog name.
    pub name: String,
    /// Arguments handed to the job body.
    #[serde(default)]
    pub payload: Value,
}

impl Job {
    /// Create a job invocation with an empty payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Value::Null,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Something the spawner can run.
pub enum Work {
    /// A catalog job, runnable under every strategy.
    Job(Job),
    /// An in-process closure, runnable inline or as a concurrent task.
    Closure(Runnable),
}

impl Work {
    /// Wrap a closure.
    pub fn closure<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Self::Closure(Box::new(f))
    }

    /// Short name used in logs.
    pub fn label(&self) -> &str {
        match self {
            Self::Job(job) => &job.name,
            Self::Closure(_) => "closure",
        }
    }
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Job(job) => f.debug_tuple("Job").field(job).finish(),
            Self::Closure(_) => f.write_str("Closure(..)"),
        }
    }
}

impl From<Job> for Work {
    fn from(job: Job) -> Self {
        Self::Job(job)
    }
}

/// Registry of named job bodies.
///
/// Both sides of a process boundary must register the same names: the parent
/// validates a job before launching, the child resolves it to run it.
#[derive(Clone, Default)]
pub struct JobCatalog {
    jobs: Arc<RwLock<BTreeMap<String, JobFn>>>,
}

impl JobCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a job body.
    #[must_use]
    pub fn register<F>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Value) -> Result<()> + Send + Sync + 'static,
    {
        self.insert(name, body);
        self
    }

    /// Register a job body in place. Clones of the catalog see it too.
    pub fn insert<F>(&self, name: impl Into<String>, body: F)
    where
        F: Fn(&Value) -> Result<()> + Send + Sync + 'static,
    {
        self.jobs.write().insert(name.into(), Arc::new(body));
    }

    /// Whether a job with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.jobs.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.jobs.read().keys().cloned().collect()
    }

    /// Bind a job invocation to its body.
    pub fn resolve(&self, job: Job) -> Result<Runnable, SpawnError> {
        let body = self
            .jobs
            .read()
            .get(&job.name)
            .cloned()
            .ok_or_else(|| SpawnError::UnknownJob(job.name.clone()))?;
        Ok(Box::new(move || body(&job.payload)))
    }

    /// Turn any [`Work`] into something runnable here.
    pub(crate) fn runnable(&self, work: Work) -> Result<Runnable, SpawnError> {
        match work {
            Work::Job(job) => self.resolve(job),
            Work::Closure(run) => Ok(run),
        }
    }

    /// Catalog with the demonstration jobs shipped by the `offshoot` binary.
    ///
    /// `fan-out` needs a spawner, so it is added with
    /// [`JobCatalog::install_fan_out`] once one exists.
    pub fn with_builtins() -> Self {
        Self::new()
            .register("sleep", |payload| {
                let ms = payload.get("ms").and_then(Value::as_u64).unwrap_or(100);
                std::thread::sleep(Duration::from_millis(ms));
                Ok(())
            })
            .register("echo", |payload| {
                let message = payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                info!(message, "echo");
                Ok(())
            })
            .register("fail", |payload| {
                let message = payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("job failed on purpose");
                bail!("{message}")
            })
            .register("panic", |payload| {
                let message = payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("job panicked on purpose")
                    .to_string();
                std::panic::panic_any(message)
            })
    }

    /// Register `fan-out {count, ms}`: spawn `count` isolated `sleep` jobs that
    /// are killed when the spawning process exits, and wait for them.
    pub fn install_fan_out(&self, spawner: Spawner) {
        self.insert("fan-out", move |payload| {
            let count = payload.get("count").and_then(Value::as_u64).unwrap_or(2);
            let ms = payload.get("ms").and_then(Value::as_u64).unwrap_or(100);
            let runtime = tokio::runtime::Handle::try_current()
                .context("fan-out needs an entered Tokio runtime")?;

            let overrides = OptionOverrides::new()
                .strategy(Strategy::IsolatedProcess)
                .kill_on_exit(true);
            let mut handles = Vec::new();
            for _ in 0..count {
                let job = Job::new("sleep").payload(serde_json::json!({ "ms": ms }));
                handles.push(spawner.spawn(&overrides, job)?);
            }
            let outcomes = runtime.block_on(spawner.wait(&handles));
            let failed = outcomes.iter().filter(|o| !o.is_success()).count();
            anyhow::ensure!(failed == 0, "{failed} of {count} sleeps did not succeed");
            Ok(())
        });
    }
}

impl fmt::Debug for JobCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobCatalog")
            .field("jobs", &self.names())
            .finish()
    }
}
