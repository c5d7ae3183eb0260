//! Loader seam: how a manifest's `loader` section becomes handler factories.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use modkit_registry::{TypeBinding, WrapperFactory};
use rustc_hash::FxHashMap;

use crate::{ModuleError, ModuleManifest};

pub mod catalog;
pub mod dylib;

/// Handler code of one loaded module.
pub trait HandlerLibrary: Send + Sync {
	/// Materializes the factory serving `binding`, or explains why it cannot.
	fn factory(&self, binding: TypeBinding) -> Result<Arc<dyn WrapperFactory>, String>;
}

/// Result of a successful [`ModuleLoader::load`].
pub struct LoadedLibrary {
	pub library: Arc<dyn HandlerLibrary>,
	/// Kept alive by the module lease for as long as any descriptor of this load exists.
	pub retained: Option<Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for LoadedLibrary {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LoadedLibrary")
			.field("retained", &self.retained.is_some())
			.finish_non_exhaustive()
	}
}

/// Materializes handler libraries for one `loader.kind`.
///
/// `load` runs on a blocking worker thread and may perform file or dynamic-library I/O.
pub trait ModuleLoader: Send + Sync {
	fn kind(&self) -> &'static str;

	fn load(&self, manifest: &ModuleManifest, base_dir: &Path) -> Result<LoadedLibrary, ModuleError>;
}

/// In-process [`HandlerLibrary`] built from explicit factories.
#[derive(Clone, Default)]
pub struct FactoryTable {
	entries: FxHashMap<TypeBinding, Arc<dyn WrapperFactory>>,
}

impl FactoryTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds (or replaces) the factory for `binding`.
	pub fn with(mut self, binding: impl Into<TypeBinding>, factory: Arc<dyn WrapperFactory>) -> Self {
		self.entries.insert(binding.into(), factory);
		self
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

impl HandlerLibrary for FactoryTable {
	fn factory(&self, binding: TypeBinding) -> Result<Arc<dyn WrapperFactory>, String> {
		self.entries
			.get(&binding)
			.cloned()
			.ok_or_else(|| format!("library has no handler for {binding}"))
	}
}

impl std::fmt::Debug for FactoryTable {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut bindings: Vec<_> = self.entries.keys().copied().collect();
		bindings.sort_unstable();
		f.debug_struct("FactoryTable").field("bindings", &bindings).finish()
	}
}
