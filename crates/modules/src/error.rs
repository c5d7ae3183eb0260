use std::path::PathBuf;
use std::time::Duration;

use crate::context::ModuleState;

/// Failure to read or validate a `module.toml`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
	#[error("cannot read manifest {path}: {message}")]
	Io { path: PathBuf, message: String },
	#[error("malformed manifest: {0}")]
	Parse(String),
	#[error("invalid manifest: {0}")]
	Invalid(String),
}

/// Module lifecycle errors.
///
/// Lifecycle misuse ([`ModuleError::InvalidTransition`], [`ModuleError::Busy`],
/// [`ModuleError::NotLoaded`], [`ModuleError::UnknownModule`]) aside, every variant is a load failure: the candidate is recorded, marked
/// disabled and discovery moves on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleError {
	#[error(transparent)]
	Manifest(#[from] ManifestError),
	#[error("no loader registered for kind '{0}'")]
	UnknownLoader(String),
	#[error("cannot load handler library '{entry}': {reason}")]
	Library { entry: String, reason: String },
	#[error("no declared handler type could be materialized ({0} declared)")]
	NoHandlers(usize),
	#[error("module id '{id}' is already provided by {existing}")]
	DuplicateId { id: String, existing: PathBuf },
	#[error("module load timed out after {0:?}")]
	Timeout(Duration),
	#[error("module load panicked: {0}")]
	Panicked(String),
	#[error("module load cancelled")]
	Cancelled,
	#[error("invalid module state transition {from:?} -> {to:?}")]
	InvalidTransition { from: ModuleState, to: ModuleState },
	#[error("module '{id}' is {state} and cannot be queried")]
	Busy { id: String, state: ModuleState },
	#[error("module '{0}' is not loaded")]
	NotLoaded(String),
	#[error("unknown module '{0}'")]
	UnknownModule(String),
}

impl ModuleError {
	/// Returns true for failures that should keep the module disabled until explicitly retried.
	pub fn disables_module(&self) -> bool {
		!matches!(
			self,
			ModuleError::Cancelled
				| ModuleError::InvalidTransition { .. }
				| ModuleError::Busy { .. }
				| ModuleError::NotLoaded(_)
				| ModuleError::UnknownModule(_)
		)
	}
}
