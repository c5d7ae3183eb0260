//! Resource dispatch.
//!
//! [`ResourceDispatcher`] ties a [`ResourceKey`](modkit_primitives::ResourceKey) to a decoded
//! resource: it picks the winning descriptor from the registry (or the default wrapper), fetches
//! the record bytes from a [`ResourceSource`] only after a wrapper is chosen, pins the owning
//! module's lease and runs the factory off the async reactor.
//!
//! Every async entry point has a blocking twin that runs on the detached bridge runtime, so
//! legacy synchronous callers can use it from inside another runtime without deadlocking.

mod dispatcher;
mod error;
mod fallback;
mod legacy;
mod source;

pub use dispatcher::{KnownType, ResourceDispatcher};
pub use error::{DispatchError, SourceError};
pub use fallback::{BUILTIN_MODULE, FALLBACK_PRIORITY, RawResourceFactory, fallback_descriptor, install_fallback};
pub use legacy::{BoundDispatcher, DisabledModules};
pub use source::{DirectorySource, MemorySource, ResourceSource};
