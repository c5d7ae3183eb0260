//! Handler libraries linked into the host binary.
//!
//! Libraries are submitted at link time with [`submit_library!`](crate::submit_library) or
//! inserted at runtime with [`HandlerCatalog::insert`]. Runtime entries shadow linked ones of
//! the same name, which is how a reload picks up replaced handler code.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::{HandlerLibrary, LoadedLibrary, ModuleLoader};
use crate::{ModuleError, ModuleManifest};

/// Link-time registration of a handler library.
pub struct LibraryReg {
	pub name: &'static str,
	pub build: fn() -> Arc<dyn HandlerLibrary>,
}

inventory::collect!(LibraryReg);

/// Submits a handler library to the link-time catalog.
///
/// ```ignore
/// fn textures() -> Arc<dyn HandlerLibrary> { Arc::new(FactoryTable::new().with(...)) }
/// modkit_modules::submit_library!("textures", textures);
/// ```
#[macro_export]
macro_rules! submit_library {
	($name:expr, $build:path) => {
		$crate::inventory::submit! {
			$crate::LibraryReg { name: $name, build: $build }
		}
	};
}

/// Named handler libraries available to [`CatalogLoader`].
#[derive(Default)]
pub struct HandlerCatalog {
	runtime: RwLock<FxHashMap<String, Arc<dyn HandlerLibrary>>>,
}

impl HandlerCatalog {
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts or replaces a runtime library. Returns true if one was replaced.
	pub fn insert(&self, name: impl Into<String>, library: Arc<dyn HandlerLibrary>) -> bool {
		self.runtime.write().insert(name.into(), library).is_some()
	}

	/// Removes a runtime library. Linked libraries cannot be removed.
	pub fn remove(&self, name: &str) -> bool {
		self.runtime.write().remove(name).is_some()
	}

	/// Looks up `name`, preferring runtime entries over linked ones.
	pub fn get(&self, name: &str) -> Option<Arc<dyn HandlerLibrary>> {
		if let Some(library) = self.runtime.read().get(name) {
			return Some(Arc::clone(library));
		}
		inventory::iter::<LibraryReg>
			.into_iter()
			.find(|reg| reg.name == name)
			.map(|reg| (reg.build)())
	}

	/// All known library names, sorted and deduplicated.
	pub fn names(&self) -> Vec<String> {
		let mut names: Vec<String> = self.runtime.read().keys().cloned().collect();
		names.extend(inventory::iter::<LibraryReg>.into_iter().map(|reg| reg.name.to_string()));
		names.sort_unstable();
		names.dedup();
		names
	}
}

impl std::fmt::Debug for HandlerCatalog {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HandlerCatalog").field("names", &self.names()).finish()
	}
}

/// Loader for `kind = "catalog"`: `entry` names a catalog library.
#[derive(Debug, Clone)]
pub struct CatalogLoader {
	catalog: Arc<HandlerCatalog>,
}

impl CatalogLoader {
	pub const KIND: &'static str = "catalog";

	pub fn new(catalog: Arc<HandlerCatalog>) -> Self {
		Self { catalog }
	}
}

impl ModuleLoader for CatalogLoader {
	fn kind(&self) -> &'static str {
		Self::KIND
	}

	fn load(&self, manifest: &ModuleManifest, _base_dir: &Path) -> Result<LoadedLibrary, ModuleError> {
		let entry = &manifest.loader.entry;
		let library = self.catalog.get(entry).ok_or_else(|| ModuleError::Library {
			entry: entry.clone(),
			reason: "no such catalog library".into(),
		})?;
		Ok(LoadedLibrary { library, retained: None })
	}
}
