//! Running units of work inline, as concurrent tasks, or as isolated processes.
//!
//! [`Spawner`] is the single entry point. It merges per-call
//! [`OptionOverrides`] over its defaults, picks a [`Strategy`], and returns a
//! [`SpawnHandle`] that [`Waiter`] can block on.

mod guard;
mod handle;
pub(crate) mod isolated;
mod options;
pub mod os;
mod spawn;
mod task;
mod wait;

pub use guard::in_guarded_work;
pub(crate) use guard::{panic_message, run_guarded};
pub use handle::{ExecutionId, HandleKind, Outcome, SpawnHandle};
pub use isolated::{ChildTicket, TICKET_ENV};
pub use options::{OptionOverrides, SpawnDefaults, SpawnOptions, Strategy, TaskPriority};
pub use os::is_alive;
pub use spawn::{Spawner, SpawnerBuilder};
pub use wait::Waiter;
