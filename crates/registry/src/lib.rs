//! Wrapper registry.
//!
//! Maps a [`ResourceType`](modkit_primitives::ResourceType) to the priority-ordered list of
//! [`WrapperDescriptor`]s that claim it, plus an optional default bucket used as the fallback.
//!
//! # Mental model
//!
//! * Readers load an `Arc<RegistrySnapshot>` and resolve against that immutable view.
//! * Writers build a replacement snapshot and publish it with CAS, retrying on contention.
//! * Each descriptor carries a [`ModuleLease`]; unloading a module deregisters all of its
//!   descriptors in one publication and then revokes the lease.
//!
//! # Invariants
//!
//! * Buckets are sorted by priority (highest first), ties broken by registration sequence
//!   number (earliest first). Sequence numbers come from the snapshot, never the clock.
//! * Re-registering `(type, module)` keeps the original sequence number.
//! * A lookup observes either all or none of one module's descriptors.
//! * Disabled modules are skipped by lookups without touching the bucket snapshot.

mod collision;
mod descriptor;
mod error;
mod lease;
mod runtime;
mod snapshot;

pub use collision::{RegistrationOutcome, WinnerChange};
pub use descriptor::{FactoryContext, FactoryError, ModuleId, TypeBinding, WrapperDescriptor, WrapperFactory};
pub use error::RegistryError;
pub use lease::{LeaseGuard, LeaseRevoked, ModuleLease};
pub use runtime::WrapperRegistry;
pub use snapshot::{RankedEntry, RegistrySnapshot};

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_fixtures;
#[cfg(test)]
mod tests;
