//! Compatibility surface for callers written against the old static dispatcher.

use std::sync::Arc;

use modkit_primitives::{ApiVersion, Resource, ResourceKey, ResourceType};
use modkit_registry::{ModuleId, WrapperRegistry};

use crate::{DispatchError, ResourceDispatcher, ResourceSource};

/// Live, mutable view of the registry's disabled-module set.
///
/// Inserting a module id makes every lookup skip that module's descriptors on the very next
/// call; no descriptor is deregistered.
#[derive(Debug, Clone)]
pub struct DisabledModules {
	registry: Arc<WrapperRegistry>,
}

impl DisabledModules {
	pub(crate) fn new(registry: Arc<WrapperRegistry>) -> Self {
		Self { registry }
	}

	/// Returns true if the module was not already disabled.
	pub fn insert(&self, module: &str) -> bool {
		self.registry.disable_module(module)
	}

	/// Returns true if the module was disabled.
	pub fn remove(&self, module: &str) -> bool {
		self.registry.enable_module(module)
	}

	pub fn contains(&self, module: &str) -> bool {
		self.registry.is_disabled(module)
	}

	/// Disabled module ids, sorted.
	pub fn to_vec(&self) -> Vec<ModuleId> {
		self.registry.disabled_modules()
	}

	pub fn len(&self) -> usize {
		self.to_vec().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn clear(&self) {
		for module in self.to_vec() {
			self.registry.enable_module(&module);
		}
	}
}

/// A dispatcher bound to one container, with the legacy call shapes.
#[derive(Clone)]
pub struct BoundDispatcher {
	dispatcher: ResourceDispatcher,
	source: Arc<dyn ResourceSource>,
}

impl std::fmt::Debug for BoundDispatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BoundDispatcher").field("dispatcher", &self.dispatcher).finish_non_exhaustive()
	}
}

impl BoundDispatcher {
	pub fn new(dispatcher: ResourceDispatcher, source: Arc<dyn ResourceSource>) -> Self {
		Self { dispatcher, source }
	}

	pub fn dispatcher(&self) -> &ResourceDispatcher {
		&self.dispatcher
	}

	pub fn get_resource(&self, api_version: ApiVersion, key: ResourceKey) -> Result<Box<dyn Resource>, DispatchError> {
		self.get_resource_with_fallback(api_version, key, false)
	}

	pub fn get_resource_with_fallback(
		&self, api_version: ApiVersion, key: ResourceKey, always_use_fallback: bool,
	) -> Result<Box<dyn Resource>, DispatchError> {
		self.dispatcher
			.resolve_resource_blocking(api_version, Arc::clone(&self.source), key, always_use_fallback)
	}

	pub async fn get_resource_async(&self, api_version: ApiVersion, key: ResourceKey) -> Result<Box<dyn Resource>, DispatchError> {
		self.dispatcher.resolve_resource(api_version, &*self.source, key, false).await
	}

	pub fn create_new_resource(&self, api_version: ApiVersion, resource_type: ResourceType) -> Result<Box<dyn Resource>, DispatchError> {
		self.dispatcher.create_empty_resource_blocking(api_version, resource_type)
	}

	pub async fn create_new_resource_async(
		&self, api_version: ApiVersion, resource_type: ResourceType,
	) -> Result<Box<dyn Resource>, DispatchError> {
		self.dispatcher.create_empty_resource(api_version, resource_type).await
	}

	/// `(type, winning module)` pairs sorted by type.
	pub fn known_types(&self) -> Vec<(ResourceType, ModuleId)> {
		self.dispatcher
			.known_types()
			.into_iter()
			.map(|known| (known.resource_type, known.module))
			.collect()
	}

	pub fn disabled_modules(&self) -> DisabledModules {
		self.dispatcher.disabled_modules()
	}
}
