use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use modkit_primitives::{
	ApiVersion, NoopObserver, OperationEvent, OperationKind, OperationObserver, Resource, ResourceKey, ResourceType, Subject,
};
use modkit_registry::{FactoryContext, FactoryError, ModuleId, WrapperDescriptor, WrapperRegistry};
use modkit_worker::{TaskClass, WorkerJoinSet};
use tokio_util::sync::CancellationToken;

use crate::legacy::DisabledModules;
use crate::{DispatchError, ResourceSource};

type DispatchResult = Result<Box<dyn Resource>, DispatchError>;

/// One `(type, winner)` row of [`ResourceDispatcher::known_types`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownType {
	pub resource_type: ResourceType,
	pub module: ModuleId,
	pub handler: String,
}

struct DispatcherInner {
	registry: Arc<WrapperRegistry>,
	observer: Arc<dyn OperationObserver>,
}

/// Resolves keys to resources through a [`WrapperRegistry`].
///
/// Cheap to clone; clones share the registry and observer.
#[derive(Clone)]
pub struct ResourceDispatcher {
	inner: Arc<DispatcherInner>,
}

impl std::fmt::Debug for ResourceDispatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ResourceDispatcher")
			.field("registry", &self.inner.registry)
			.finish_non_exhaustive()
	}
}

impl ResourceDispatcher {
	pub fn new(registry: Arc<WrapperRegistry>) -> Self {
		Self::with_observer(registry, Arc::new(NoopObserver))
	}

	pub fn with_observer(registry: Arc<WrapperRegistry>, observer: Arc<dyn OperationObserver>) -> Self {
		Self {
			inner: Arc::new(DispatcherInner { registry, observer }),
		}
	}

	pub fn registry(&self) -> &Arc<WrapperRegistry> {
		&self.inner.registry
	}

	/// Resolves `key` to a resource.
	///
	/// With `force_fallback`, or when no type-specific wrapper is live, the default wrapper
	/// serves the key. Record bytes are fetched only after a wrapper has been chosen.
	pub async fn resolve_resource(
		&self, api_version: ApiVersion, source: &dyn ResourceSource, key: ResourceKey, force_fallback: bool,
	) -> DispatchResult {
		self.resolve_resource_with_cancel(api_version, source, key, force_fallback, &CancellationToken::new())
			.await
	}

	/// Like [`Self::resolve_resource`]; once `cancel` fires the call returns
	/// [`DispatchError::Cancelled`] and any resource still being built is discarded.
	pub async fn resolve_resource_with_cancel(
		&self, api_version: ApiVersion, source: &dyn ResourceSource, key: ResourceKey, force_fallback: bool, cancel: &CancellationToken,
	) -> DispatchResult {
		let start = Instant::now();
		let resource_type = key.resource_type();
		let mut served_by = None;
		let result: DispatchResult = async {
			let desc = self.select(api_version, resource_type, force_fallback)?;
			served_by = Some(desc.module().clone());

			let fetched = tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(DispatchError::Cancelled),
				fetched = source.raw_bytes(&key) => fetched?,
			};
			let data = fetched.ok_or(DispatchError::NotFound(key))?;
			self.construct(&desc, api_version, resource_type, Some(data), cancel).await
		}
		.await;

		self.observe_resolve(resource_type, served_by.as_deref(), start, &result);
		if let Err(err) = &result {
			tracing::debug!(%key, error = %err, "dispatch.resolve_failed");
		}
		result
	}

	/// Builds a default-initialized resource of `resource_type` with no backing bytes.
	pub async fn create_empty_resource(&self, api_version: ApiVersion, resource_type: ResourceType) -> DispatchResult {
		self.create_empty_with_cancel(api_version, resource_type, &CancellationToken::new()).await
	}

	pub async fn create_empty_with_cancel(
		&self, api_version: ApiVersion, resource_type: ResourceType, cancel: &CancellationToken,
	) -> DispatchResult {
		let start = Instant::now();
		let mut served_by = None;
		let result: DispatchResult = async {
			let desc = self.select(api_version, resource_type, false)?;
			served_by = Some(desc.module().clone());
			self.construct(&desc, api_version, resource_type, None, cancel).await
		}
		.await;
		self.observe_resolve(resource_type, served_by.as_deref(), start, &result);
		result
	}

	/// Resolves every key `source` holds, concurrently. Results are sorted by key.
	pub async fn resolve_all(
		&self, api_version: ApiVersion, source: Arc<dyn ResourceSource>,
	) -> Result<Vec<(ResourceKey, DispatchResult)>, DispatchError> {
		let keys = source.keys().await?;
		let mut set = WorkerJoinSet::new(TaskClass::Dispatch);
		for key in keys {
			let this = self.clone();
			let source = Arc::clone(&source);
			set.spawn(async move {
				let result = this.resolve_resource(api_version, &*source, key, false).await;
				(key, result)
			});
		}
		let mut results = Vec::with_capacity(set.len());
		while let Some(joined) = set.join_next().await {
			match joined {
				Ok(entry) => results.push(entry),
				Err(err) => tracing::warn!(error = %err, "dispatch task failed"),
			}
		}
		results.sort_by(|a, b| a.0.cmp(&b.0));
		Ok(results)
	}

	/// Blocking twin of [`Self::resolve_resource`]. Safe to call from inside a runtime.
	pub fn resolve_resource_blocking(
		&self, api_version: ApiVersion, source: Arc<dyn ResourceSource>, key: ResourceKey, force_fallback: bool,
	) -> DispatchResult {
		let this = self.clone();
		modkit_worker::block_on_detached(TaskClass::Dispatch, async move {
			this.resolve_resource(api_version, &*source, key, force_fallback).await
		})?
	}

	/// Blocking twin of [`Self::create_empty_resource`].
	pub fn create_empty_resource_blocking(&self, api_version: ApiVersion, resource_type: ResourceType) -> DispatchResult {
		let this = self.clone();
		modkit_worker::block_on_detached(TaskClass::Dispatch, async move {
			this.create_empty_resource(api_version, resource_type).await
		})?
	}

	/// Current winner of every type, sorted by type.
	pub fn known_types(&self) -> Vec<KnownType> {
		self.inner
			.registry
			.winners()
			.into_iter()
			.map(|(resource_type, desc)| KnownType {
				resource_type,
				module: desc.module().clone(),
				handler: desc.handler_name().to_string(),
			})
			.collect()
	}

	/// Mutable view of the disabled-module set; changes apply to the very next resolution.
	pub fn disabled_modules(&self) -> DisabledModules {
		DisabledModules::new(Arc::clone(&self.inner.registry))
	}

	/// Picks the descriptor and checks the api version before any bytes are fetched.
	fn select(&self, api_version: ApiVersion, resource_type: ResourceType, force_fallback: bool) -> Result<Arc<WrapperDescriptor>, DispatchError> {
		let start = Instant::now();
		let registry = &self.inner.registry;
		let found = if force_fallback {
			registry.resolve_default().ok_or(DispatchError::NoWrapperAvailable(resource_type))
		} else {
			registry.resolve_or_default(resource_type).map_err(DispatchError::from)
		};
		self.inner.observer.observe(OperationEvent {
			kind: OperationKind::Lookup,
			subject: Subject::Type(resource_type),
			module: found.as_ref().ok().map(|d| &**d.module()),
			duration: start.elapsed(),
			success: found.is_ok(),
		});

		let desc = found?;
		if desc.binding().is_default() {
			tracing::debug!(%resource_type, module = %desc.module(), forced = force_fallback, "dispatch.fallback");
		}
		if !desc.factory().supports_api_version(api_version) {
			return Err(DispatchError::UnsupportedApiVersion {
				resource_type,
				handler: desc.handler_name().to_string(),
				requested: api_version,
			});
		}
		Ok(desc)
	}

	/// Pins the descriptor's module and runs its factory on a blocking worker.
	async fn construct(
		&self, desc: &WrapperDescriptor, api_version: ApiVersion, resource_type: ResourceType, data: Option<Bytes>,
		cancel: &CancellationToken,
	) -> DispatchResult {
		let guard = desc.lease().acquire()?;
		let factory = Arc::clone(desc.factory());
		let ctx = FactoryContext {
			api_version,
			resource_type,
		};
		let task = modkit_worker::spawn_blocking(TaskClass::CpuBlocking, move || {
			let _guard = guard;
			match data {
				Some(data) => factory.decode(ctx, data),
				None => factory.create_empty(ctx),
			}
		});

		let joined = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(DispatchError::Cancelled),
			joined = task => joined,
		};
		let handler = desc.handler_name();
		let built = joined.map_err(|join| DispatchError::ResourceConstructionFailed {
			resource_type,
			handler: handler.to_string(),
			source: FactoryError::Other(format!("handler panicked: {join}").into()),
		})?;
		built.map_err(|err| match err {
			FactoryError::UnsupportedApiVersion { requested } => DispatchError::UnsupportedApiVersion {
				resource_type,
				handler: handler.to_string(),
				requested,
			},
			source => DispatchError::ResourceConstructionFailed {
				resource_type,
				handler: handler.to_string(),
				source,
			},
		})
	}

	fn observe_resolve(&self, resource_type: ResourceType, module: Option<&str>, start: Instant, result: &DispatchResult) {
		self.inner.observer.observe(OperationEvent {
			kind: OperationKind::Resolve,
			subject: Subject::Type(resource_type),
			module,
			duration: start.elapsed(),
			success: result.is_ok(),
		});
	}
}
