//! Handles returned by [`Spawner::spawn`](crate::Spawner::spawn).

use std::fmt;
use std::process::ExitStatus;

use tokio::sync::watch;
use uuid::Uuid;

/// What kind of execution a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// An isolated OS process.
    Process,
    /// A concurrent task or an inline run.
    Task,
}

/// Identifier of the underlying execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionId {
    /// OS process id.
    Process(u32),
    /// Task id (UUIDv7, time ordered).
    Task(Uuid),
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process(pid) => write!(f, "pid:{pid}"),
            Self::Task(id) => write!(f, "task:{id}"),
        }
    }
}

/// How a unit of work ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Work returned `Ok` (or the child exited with status 0).
    Succeeded,
    /// Work returned an error or panicked in this process.
    Failed,
    /// Child exited with a non-zero status.
    Exited(i32),
    /// Child was killed by a signal.
    Signalled(i32),
    /// Child was reaped by someone else; its status is unknown.
    Reaped,
}

impl Outcome {
    /// Map a child's exit status.
    pub fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            return Self::Succeeded;
        }
        if let Some(code) = status.code() {
            return Self::Exited(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signalled(signal);
            }
        }
        Self::Reaped
    }

    /// Whether the work completed without error.
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
            Self::Exited(code) => write!(f, "exited with status {code}"),
            Self::Signalled(signal) => write!(f, "killed by signal {signal}"),
            Self::Reaped => f.write_str("reaped elsewhere"),
        }
    }
}

/// Write side of a handle's completion; settles the handle exactly once.
#[derive(Debug)]
pub(crate) struct Settler {
    tx: watch::Sender<Option<Outcome>>,
}

impl Settler {
    pub(crate) fn settle(self, outcome: Outcome) {
        self.tx.send_replace(Some(outcome));
    }
}

/// Read side of a handle's completion.
#[derive(Debug, Clone)]
pub(crate) struct Completion {
    rx: watch::Receiver<Option<Outcome>>,
}

impl Completion {
    pub(crate) fn channel() -> (Settler, Self) {
        let (tx, rx) = watch::channel(None);
        (Settler { tx }, Self { rx })
    }

    pub(crate) fn settled(outcome: Outcome) -> Self {
        let (settler, completion) = Self::channel();
        settler.settle(outcome);
        completion
    }

    fn current(&self) -> Option<Outcome> {
        *self.rx.borrow()
    }

    async fn wait(&self) -> Outcome {
        let mut rx = self.rx.clone();
        // A dropped settler without a value means the executor vanished.
        let settled = rx.wait_for(Option::is_some).await.map(|value| *value);
        match settled {
            Ok(Some(outcome)) => outcome,
            _ => Outcome::Failed,
        }
    }
}

/// Opaque record of one spawn call.
///
/// Cloning is cheap; every clone observes the same completion.
#[derive(Debug, Clone)]
pub struct SpawnHandle {
    id: ExecutionId,
    label: String,
    completion: Completion,
}

impl SpawnHandle {
    pub(crate) fn process(pid: u32, label: impl Into<String>, completion: Completion) -> Self {
        Self {
            id: ExecutionId::Process(pid),
            label: label.into(),
            completion,
        }
    }

    pub(crate) fn task(id: Uuid, label: impl Into<String>, completion: Completion) -> Self {
        Self {
            id: ExecutionId::Task(id),
            label: label.into(),
            completion,
        }
    }

    /// Process or task.
    pub const fn kind(&self) -> HandleKind {
        match self.id {
            ExecutionId::Process(_) => HandleKind::Process,
            ExecutionId::Task(_) => HandleKind::Task,
        }
    }

    /// Underlying identifier.
    pub const fn id(&self) -> ExecutionId {
        self.id
    }

    /// OS pid for process handles.
    pub const fn pid(&self) -> Option<u32> {
        match self.id {
            ExecutionId::Process(pid) => Some(pid),
            ExecutionId::Task(_) => None,
        }
    }

    /// Job name, closure marker or thread name.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Outcome if the execution already finished.
    pub fn outcome(&self) -> Option<Outcome> {
        self.completion.current()
    }

    /// Whether the execution already finished.
    pub fn is_finished(&self) -> bool {
        self.outcome().is_some()
    }

    pub(crate) async fn settled(&self) -> Outcome {
        self.completion.wait().await
    }
}
