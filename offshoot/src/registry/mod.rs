//! Per-process bookkeeping: resources to release in a new isolated process,
//! and children to terminate on exit.

mod children;
mod resources;

pub use children::{ChildRegistry, ProcessProbe, SweepReport, SystemProbe};
pub use resources::{Closable, DrainReport, ResourceRegistry, Tracked};

#[cfg(test)]
pub(crate) use children::tests::FakeProbe;
