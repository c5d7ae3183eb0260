//! Isolated handler modules.
//!
//! A module is a directory (or manifest file) declaring which resource types it handles and
//! how its handler code is obtained. [`ModuleDiscoveryService`] loads each candidate into its
//! own [`ModuleContext`], materializes one [`WrapperDescriptor`](modkit_registry::WrapperDescriptor)
//! per declared type and registers them. One module failing never stops the others.
//!
//! # Lifecycle
//!
//! `Unloaded -> Loading -> Loaded -> Unloading -> Unloaded`, with `Loading -> Unloaded` on
//! failure. Only the discovery service transitions a context.

mod context;
mod discovery;
mod error;
mod loader;
mod manifest;

pub use context::{ModuleContext, ModuleInfo, ModuleState};
pub use discovery::{
	DiscoveryFailure, DiscoveryOptions, DiscoveryReport, LoadedModuleReport, ModuleDiscoveryService, SkipReason, SkippedCandidate,
	TypeEnumerationFailure,
};
pub use error::{ManifestError, ModuleError};
pub use loader::catalog::{CatalogLoader, HandlerCatalog, LibraryReg};
pub use loader::dylib::{self as abi, DylibLoader, DylibResource};
pub use loader::{FactoryTable, HandlerLibrary, LoadedLibrary, ModuleLoader};
pub use manifest::{HandlerDecl, LoaderSpec, ModuleManifest};

#[doc(hidden)]
pub use inventory;
