use std::sync::Arc;

use bytes::Bytes;
use modkit_primitives::{RawResource, Resource, ResourceType};

use crate::{FactoryContext, FactoryError, ModuleLease, TypeBinding, WrapperDescriptor, WrapperFactory};

pub(crate) struct TestFactory {
	pub name: &'static str,
}

impl WrapperFactory for TestFactory {
	fn name(&self) -> &str {
		self.name
	}

	fn decode(&self, ctx: FactoryContext, data: Bytes) -> Result<Box<dyn Resource>, FactoryError> {
		Ok(Box::new(RawResource::new(ctx.resource_type, ctx.api_version, data)))
	}

	fn create_empty(&self, ctx: FactoryContext) -> Result<Box<dyn Resource>, FactoryError> {
		Ok(Box::new(RawResource::empty(ctx.resource_type, ctx.api_version)))
	}
}

pub(crate) fn lease(module: &str) -> ModuleLease {
	ModuleLease::new(module, 1)
}

pub(crate) fn make_desc(ty: u32, priority: i32, module: &str) -> WrapperDescriptor {
	make_desc_with_lease(TypeBinding::Type(ResourceType(ty)), priority, lease(module))
}

pub(crate) fn make_default(priority: i32, module: &str) -> WrapperDescriptor {
	make_desc_with_lease(TypeBinding::Default, priority, lease(module))
}

pub(crate) fn make_desc_with_lease(binding: TypeBinding, priority: i32, lease: ModuleLease) -> WrapperDescriptor {
	WrapperDescriptor::new(binding, priority, Arc::new(TestFactory { name: "test" }), lease)
}

pub(crate) fn winner_module(desc: Option<Arc<WrapperDescriptor>>) -> Option<String> {
	desc.map(|d| d.module().to_string())
}
