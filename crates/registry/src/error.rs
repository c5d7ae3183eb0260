use modkit_primitives::ResourceType;

/// Lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
	/// Neither a type-specific nor a default descriptor is live.
	#[error("no wrapper registered for {0} and no default wrapper available")]
	NoWrapperAvailable(ResourceType),
}
