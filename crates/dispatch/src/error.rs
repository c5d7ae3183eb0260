use std::path::PathBuf;

use modkit_primitives::{ApiVersion, ResourceKey, ResourceType};
use modkit_registry::{FactoryError, LeaseRevoked, ModuleId, RegistryError};
use modkit_worker::BridgeError;

/// Failure reported by a [`ResourceSource`](crate::ResourceSource).
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
	#[error("cannot read {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("resource source unavailable: {0}")]
	Unavailable(String),
}

/// Typed dispatch failure. Callers always get one of these, never a silently substituted resource.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
	#[error("no wrapper or default wrapper available for type {0}")]
	NoWrapperAvailable(ResourceType),
	#[error("wrapper '{handler}' for type {resource_type} does not support api version {requested}")]
	UnsupportedApiVersion {
		resource_type: ResourceType,
		handler: String,
		requested: ApiVersion,
	},
	#[error("wrapper '{handler}' failed to construct a resource of type {resource_type}")]
	ResourceConstructionFailed {
		resource_type: ResourceType,
		handler: String,
		#[source]
		source: FactoryError,
	},
	/// The chosen module was unloaded before its factory could run. Retry the resolution.
	#[error("module '{module}' (generation {generation}) was unloaded during dispatch")]
	ModuleUnloadedDuringDispatch { module: ModuleId, generation: u64 },
	#[error("dispatch cancelled")]
	Cancelled,
	#[error("no record for key {0}")]
	NotFound(ResourceKey),
	#[error(transparent)]
	Source(#[from] SourceError),
	#[error("blocking dispatch failed: {0}")]
	BridgeFailed(#[from] BridgeError),
}

impl DispatchError {
	/// True for the one failure a caller is expected to retry from scratch.
	pub fn is_retryable(&self) -> bool {
		matches!(self, DispatchError::ModuleUnloadedDuringDispatch { .. })
	}
}

impl From<RegistryError> for DispatchError {
	fn from(err: RegistryError) -> Self {
		match err {
			RegistryError::NoWrapperAvailable(ty) => DispatchError::NoWrapperAvailable(ty),
		}
	}
}

impl From<LeaseRevoked> for DispatchError {
	fn from(err: LeaseRevoked) -> Self {
		DispatchError::ModuleUnloadedDuringDispatch {
			module: err.module,
			generation: err.generation,
		}
	}
}
