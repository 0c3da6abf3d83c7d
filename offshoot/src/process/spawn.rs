//! The dispatcher.
//!
//! A [`Spawner`] owns everything that would otherwise be process-wide state:
//! the default options, the resource and child registries, the job catalog
//! and the connection pool hooks. Clones share all of it.
//!
//! # Example
//!
//! ```rust,no_run
//! use offshoot::jobs::{Job, JobCatalog, Work};
//! use offshoot::process::{OptionOverrides, Spawner, Strategy};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let spawner = Spawner::builder()
//!         .catalog(JobCatalog::with_builtins())
//!         .build();
//!     let _shutdown = spawner.install_shutdown_hook();
//!
//!     let isolated = spawner.spawn(
//!         &OptionOverrides::new().kill_on_exit(true),
//!         Job::new("sleep").payload(serde_json::json!({ "ms": 50 })),
//!     )?;
//!     let task = spawner.spawn(
//!         &OptionOverrides::new().strategy(Strategy::ConcurrentTask),
//!         Work::closure(|| Ok(())),
//!     )?;
//!
//!     for outcome in spawner.wait(&[isolated, task]).await {
//!         println!("{outcome}");
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::jobs::{JobCatalog, Work};
use crate::persistence::{ConnectionPool, NoPool};
use crate::registry::{ChildRegistry, Closable, ProcessProbe, ResourceRegistry};
use crate::shutdown::{ShutdownGuard, ShutdownHook};

use super::guard::run_guarded;
use super::handle::Completion;
use super::{isolated, task};
use super::{
    OptionOverrides, Outcome, SpawnDefaults, SpawnHandle, SpawnOptions, Strategy, TaskPriority,
    Waiter,
};

/// State shared by every clone of a [`Spawner`].
pub(crate) struct Shared {
    pub(crate) defaults: SpawnDefaults,
    pub(crate) catalog: JobCatalog,
    pub(crate) resources: ResourceRegistry,
    pub(crate) children: ChildRegistry,
    pub(crate) pool: Arc<dyn ConnectionPool>,
    pub(crate) shutdown: Arc<ShutdownHook>,
    pub(crate) child_program: Option<PathBuf>,
    pub(crate) child_env: Vec<(String, String)>,
    pub(crate) task_priority: TaskPriority,
}

impl Shared {
    pub(crate) fn child_program(&self) -> Result<PathBuf> {
        isolated::resolve_program(self.child_program.as_ref())
    }
}

/// Runs units of work under a chosen [`Strategy`].
#[derive(Clone)]
pub struct Spawner {
    shared: Arc<Shared>,
}

impl Spawner {
    pub fn builder() -> SpawnerBuilder {
        SpawnerBuilder::default()
    }

    /// Run `work` with `overrides` merged over the current defaults.
    ///
    /// Only fails when the execution context cannot be created; errors from
    /// the work itself are logged at the task or process boundary.
    pub fn spawn(&self, overrides: &OptionOverrides, work: impl Into<Work>) -> Result<SpawnHandle> {
        let options = self.shared.defaults.resolve(overrides);
        let work = work.into();
        debug!(strategy = %options.strategy, work = work.label(), "spawning work");

        match options.strategy {
            Strategy::Inline => self.run_inline(work),
            Strategy::ConcurrentTask => task::spawn_task(&self.shared, &options, work),
            Strategy::IsolatedProcess => isolated::launch(&self.shared, &options, work),
        }
    }

    fn run_inline(&self, work: Work) -> Result<SpawnHandle> {
        let label = work.label().to_string();
        let run = self.shared.catalog.runnable(work)?;
        let outcome = run_guarded(&label, run);
        Ok(SpawnHandle::task(Uuid::now_v7(), label, Completion::settled(outcome)))
    }

    /// Wait for `handles`; see [`Waiter::wait`].
    pub async fn wait(&self, handles: &[SpawnHandle]) -> Vec<Outcome> {
        self.waiter().wait(handles).await
    }

    /// A waiter sharing this spawner's pool hooks.
    pub fn waiter(&self) -> Waiter {
        Waiter::new(Arc::clone(&self.shared.pool))
    }

    /// Merge `overrides` into the defaults used by later spawns.
    pub fn set_defaults(&self, overrides: &OptionOverrides) {
        self.shared.defaults.set(overrides);
    }

    /// Current defaults.
    pub fn defaults(&self) -> SpawnOptions {
        self.shared.defaults.snapshot()
    }

    /// Replace the resources an isolated child must close before working.
    pub fn register_resources(&self, resources: Vec<Arc<dyn Closable>>) {
        self.shared.resources.replace(resources);
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.shared.resources
    }

    pub fn children(&self) -> &ChildRegistry {
        &self.shared.children
    }

    pub fn catalog(&self) -> &JobCatalog {
        &self.shared.catalog
    }

    pub(crate) fn pool(&self) -> &dyn ConnectionPool {
        self.shared.pool.as_ref()
    }

    /// The hook that sweeps kill-on-exit children.
    pub fn shutdown_hook(&self) -> &Arc<ShutdownHook> {
        &self.shared.shutdown
    }

    /// Arm the shutdown sweep; it fires when the returned guard drops.
    pub fn install_shutdown_hook(&self) -> ShutdownGuard {
        ShutdownGuard::new(Arc::clone(&self.shared.shutdown))
    }
}

impl fmt::Debug for Spawner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spawner")
            .field("defaults", &self.defaults())
            .field("catalog", &self.shared.catalog)
            .field("children", &self.shared.children)
            .field("resources", &self.shared.resources)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Spawner`].
#[derive(Default)]
pub struct SpawnerBuilder {
    defaults: SpawnOptions,
    catalog: JobCatalog,
    pool: Option<Arc<dyn ConnectionPool>>,
    probe: Option<Arc<dyn ProcessProbe>>,
    child_program: Option<PathBuf>,
    child_env: Vec<(String, String)>,
    task_priority: TaskPriority,
}

impl SpawnerBuilder {
    /// Starting defaults (before any `set_defaults`).
    #[must_use]
    pub fn defaults(mut self, defaults: SpawnOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Apply partial overrides to the starting defaults.
    #[must_use]
    pub fn overrides(mut self, overrides: &OptionOverrides) -> Self {
        self.defaults = self.defaults.merged(overrides);
        self
    }

    #[must_use]
    pub fn catalog(mut self, catalog: JobCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Connection pool hooks; defaults to [`NoPool`].
    #[must_use]
    pub fn pool(mut self, pool: Arc<dyn ConnectionPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Liveness probe for the child registry.
    #[must_use]
    pub fn probe(mut self, probe: Arc<dyn ProcessProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Program launched for isolated processes; defaults to the current executable.
    #[must_use]
    pub fn child_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.child_program = Some(program.into());
        self
    }

    /// Extra environment passed to every isolated child.
    #[must_use]
    pub fn child_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.child_env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn task_priority(mut self, mapping: TaskPriority) -> Self {
        self.task_priority = mapping;
        self
    }

    pub fn build(self) -> Spawner {
        let children = self
            .probe
            .map_or_else(ChildRegistry::new, ChildRegistry::with_probe);
        let shutdown = Arc::new(ShutdownHook::new(children.clone()));

        Spawner {
            shared: Arc::new(Shared {
                defaults: SpawnDefaults::new(self.defaults),
                catalog: self.catalog,
                resources: ResourceRegistry::new(),
                children,
                pool: self.pool.unwrap_or_else(|| Arc::new(NoPool)),
                shutdown,
                child_program: self.child_program,
                child_env: self.child_env,
                task_priority: self.task_priority,
            }),
        }
    }
}
