//! Shared task spawning for modkit.
//!
//! Every spawn goes through this crate so tasks are classified for tracing, and synchronous
//! entry points can run async bodies without re-entering the caller's scheduler.

mod bridge;
mod class;
mod join_set;
mod spawn;

pub use bridge::{BridgeError, block_on_detached};
pub use class::TaskClass;
pub use join_set::WorkerJoinSet;
pub use spawn::spawn_blocking;
