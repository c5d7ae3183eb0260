use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use modkit_primitives::{ApiVersion, KeyParseError, Resource, ResourceType};

use crate::lease::ModuleLease;

/// Identifier of the module that contributed a descriptor.
pub type ModuleId = Arc<str>;

/// Which bucket a descriptor is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeBinding {
	/// A specific resource type.
	Type(ResourceType),
	/// The wildcard default/fallback bucket.
	Default,
}

impl TypeBinding {
	pub fn resource_type(self) -> Option<ResourceType> {
		match self {
			TypeBinding::Type(ty) => Some(ty),
			TypeBinding::Default => None,
		}
	}

	pub fn is_default(self) -> bool {
		matches!(self, TypeBinding::Default)
	}
}

impl From<ResourceType> for TypeBinding {
	fn from(ty: ResourceType) -> Self {
		TypeBinding::Type(ty)
	}
}

impl fmt::Display for TypeBinding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TypeBinding::Type(ty) => ty.fmt(f),
			TypeBinding::Default => f.write_str("*"),
		}
	}
}

impl FromStr for TypeBinding {
	type Err = KeyParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim() {
			"*" => Ok(TypeBinding::Default),
			other => other.parse().map(TypeBinding::Type),
		}
	}
}

/// Arguments handed to a factory for one construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactoryContext {
	pub api_version: ApiVersion,
	pub resource_type: ResourceType,
}

/// Failure reported by handler code.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
	#[error("api version {requested} is not supported")]
	UnsupportedApiVersion { requested: ApiVersion },
	#[error("malformed resource data: {0}")]
	Malformed(String),
	#[error(transparent)]
	Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Builds resources for the types a descriptor is bound to.
///
/// Factories may do CPU-heavy decoding; callers run them off the async reactor.
pub trait WrapperFactory: Send + Sync + 'static {
	/// Handler name used in diagnostics and the known-types listing.
	fn name(&self) -> &str;

	/// Returns false for API versions this factory refuses outright.
	fn supports_api_version(&self, version: ApiVersion) -> bool {
		let _ = version;
		true
	}

	/// Builds a resource from the raw record bytes.
	fn decode(&self, ctx: FactoryContext, data: Bytes) -> Result<Box<dyn Resource>, FactoryError>;

	/// Builds a default-initialized resource with no backing bytes.
	fn create_empty(&self, ctx: FactoryContext) -> Result<Box<dyn Resource>, FactoryError>;
}

/// Binds a type (or the default bucket) to a factory owned by one module.
///
/// Descriptors are immutable once built; an update is a new descriptor registered under the
/// same `(binding, module)`.
#[derive(Clone)]
pub struct WrapperDescriptor {
	binding: TypeBinding,
	priority: i32,
	factory: Arc<dyn WrapperFactory>,
	lease: ModuleLease,
}

impl WrapperDescriptor {
	pub fn new(binding: impl Into<TypeBinding>, priority: i32, factory: Arc<dyn WrapperFactory>, lease: ModuleLease) -> Self {
		Self {
			binding: binding.into(),
			priority,
			factory,
			lease,
		}
	}

	#[inline]
	pub fn binding(&self) -> TypeBinding {
		self.binding
	}

	#[inline]
	pub fn priority(&self) -> i32 {
		self.priority
	}

	#[inline]
	pub fn module(&self) -> &ModuleId {
		self.lease.module()
	}

	pub fn handler_name(&self) -> &str {
		self.factory.name()
	}

	pub fn factory(&self) -> &Arc<dyn WrapperFactory> {
		&self.factory
	}

	pub fn lease(&self) -> &ModuleLease {
		&self.lease
	}
}

impl fmt::Debug for WrapperDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WrapperDescriptor")
			.field("binding", &self.binding)
			.field("priority", &self.priority)
			.field("module", self.module())
			.field("generation", &self.lease.generation())
			.field("handler", &self.handler_name())
			.finish()
	}
}
