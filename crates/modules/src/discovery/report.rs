use std::fmt;
use std::path::PathBuf;

use modkit_registry::{ModuleId, TypeBinding};

use crate::ModuleError;

/// Outcome of one discovery run. Failures never abort the run; they are collected here.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
	pub loaded: Vec<LoadedModuleReport>,
	pub failures: Vec<DiscoveryFailure>,
	pub skipped: Vec<SkippedCandidate>,
}

impl DiscoveryReport {
	/// True when every candidate loaded with all declared types.
	pub fn is_clean(&self) -> bool {
		self.failures.is_empty() && self.loaded.iter().all(|m| m.partial.is_empty())
	}

	pub fn loaded_ids(&self) -> Vec<&str> {
		self.loaded.iter().map(|m| &*m.id).collect()
	}

	pub fn failure_for(&self, module: &str) -> Option<&DiscoveryFailure> {
		self.failures.iter().find(|f| f.module.as_deref() == Some(module))
	}
}

impl fmt::Display for DiscoveryReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let partial = self.loaded.iter().filter(|m| !m.partial.is_empty()).count();
		write!(
			f,
			"{} loaded ({} partial), {} failed, {} skipped",
			self.loaded.len(),
			partial,
			self.failures.len(),
			self.skipped.len()
		)
	}
}

/// A module that reached `Loaded`.
#[derive(Debug, Clone)]
pub struct LoadedModuleReport {
	pub id: ModuleId,
	pub path: PathBuf,
	pub generation: u64,
	pub bindings: Vec<TypeBinding>,
	/// Declared types that could not be materialized.
	pub partial: Vec<TypeEnumerationFailure>,
}

/// One declared type that failed to materialize while the rest of its module loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeEnumerationFailure {
	pub declared: String,
	pub reason: String,
}

/// A candidate that failed to load.
#[derive(Debug, Clone)]
pub struct DiscoveryFailure {
	pub path: PathBuf,
	/// Known once the manifest was read.
	pub module: Option<ModuleId>,
	pub error: ModuleError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
	AlreadyLoaded,
	/// A previous load failed; use `retry_failed` or `reload`.
	Disabled,
	/// Another operation is transitioning this module.
	Busy,
}

#[derive(Debug, Clone)]
pub struct SkippedCandidate {
	pub path: PathBuf,
	pub module: ModuleId,
	pub reason: SkipReason,
}
