use std::sync::Arc;

use bytes::Bytes;
use modkit_primitives::{RawResource, Resource};
use modkit_registry::{
	FactoryContext, FactoryError, ModuleLease, RegistrationOutcome, TypeBinding, WrapperDescriptor, WrapperFactory, WrapperRegistry,
};

/// Module id owning the built-in default wrapper.
pub const BUILTIN_MODULE: &str = "builtin";

/// Ranks below any module-provided default wrapper.
pub const FALLBACK_PRIORITY: i32 = i32::MIN;

/// Pass-through factory: wraps the record bytes in a [`RawResource`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RawResourceFactory;

impl WrapperFactory for RawResourceFactory {
	fn name(&self) -> &str {
		"raw"
	}

	fn decode(&self, ctx: FactoryContext, data: Bytes) -> Result<Box<dyn Resource>, FactoryError> {
		Ok(Box::new(RawResource::new(ctx.resource_type, ctx.api_version, data)))
	}

	fn create_empty(&self, ctx: FactoryContext) -> Result<Box<dyn Resource>, FactoryError> {
		Ok(Box::new(RawResource::empty(ctx.resource_type, ctx.api_version)))
	}
}

/// Default descriptor backed by [`RawResourceFactory`], owned by [`BUILTIN_MODULE`].
pub fn fallback_descriptor() -> WrapperDescriptor {
	WrapperDescriptor::new(
		TypeBinding::Default,
		FALLBACK_PRIORITY,
		Arc::new(RawResourceFactory),
		ModuleLease::new(BUILTIN_MODULE, 0),
	)
}

/// Registers the built-in default wrapper.
pub fn install_fallback(registry: &WrapperRegistry) -> RegistrationOutcome {
	registry.register(fallback_descriptor())
}
