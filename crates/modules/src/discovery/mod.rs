//! Module discovery and lifecycle management.
//!
//! # Role
//!
//! Turns manifest locations into registered descriptors. Loads run concurrently (each bounded
//! by a timeout and the caller's cancellation token); registration then happens sequentially
//! in sorted path order so equal-priority conflicts resolve the same way on every run.
//!
//! # Invariants
//!
//! - A failed candidate never prevents other candidates from loading.
//! - A module with at least one materialized type is registered even if others failed.
//! - A module that failed to load is not retried until [`ModuleDiscoveryService::retry_failed`]
//!   or [`ModuleDiscoveryService::reload`] is called.
//! - Unloading deregisters every descriptor of the module before revoking its lease.
//! - Reloading replaces a module's descriptors in place and revokes the previous lease only
//!   after the new generation is registered, so the module keeps its tie-break position.
//! - The context table lock is never held across an await.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use modkit_primitives::{NoopObserver, OperationEvent, OperationKind, OperationObserver, Subject};
use modkit_registry::{ModuleId, ModuleLease, TypeBinding, WrapperDescriptor, WrapperRegistry};
use modkit_worker::{TaskClass, WorkerJoinSet};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;

use crate::context::{ModuleContext, ModuleInfo, ModuleState, RetiredGeneration};
use crate::loader::{LoadedLibrary, ModuleLoader};
use crate::{ManifestError, ModuleError, ModuleManifest};

mod report;

pub use report::{DiscoveryFailure, DiscoveryReport, LoadedModuleReport, SkipReason, SkippedCandidate, TypeEnumerationFailure};

/// Tuning for discovery runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOptions {
	/// Upper bound for loading one module.
	pub load_timeout: Duration,
	/// Priority of handler groups when neither the group nor the manifest sets one.
	pub baseline_priority: i32,
}

impl Default for DiscoveryOptions {
	fn default() -> Self {
		Self {
			load_timeout: Duration::from_millis(5000),
			baseline_priority: 0,
		}
	}
}

type LoaderMap = FxHashMap<&'static str, Arc<dyn ModuleLoader>>;

struct Prepared {
	manifest: ModuleManifest,
	library: LoadedLibrary,
}

/// Failure carrying the module id when the manifest got far enough to name it.
type LoadResult = Result<Prepared, (Option<ModuleId>, ModuleError)>;

struct Materialized {
	id: ModuleId,
	lease: ModuleLease,
	bindings: Vec<TypeBinding>,
	partial: Vec<TypeEnumerationFailure>,
	manifest: ModuleManifest,
}

/// Owns every [`ModuleContext`] and keeps the registry in step with their lifecycle.
pub struct ModuleDiscoveryService {
	registry: Arc<WrapperRegistry>,
	loaders: Arc<LoaderMap>,
	contexts: Mutex<Vec<ModuleContext>>,
	options: DiscoveryOptions,
	observer: Arc<dyn OperationObserver>,
	next_generation: AtomicU64,
}

impl std::fmt::Debug for ModuleDiscoveryService {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut kinds: Vec<_> = self.loaders.keys().copied().collect();
		kinds.sort_unstable();
		f.debug_struct("ModuleDiscoveryService")
			.field("loaders", &kinds)
			.field("modules", &self.contexts.lock().len())
			.field("options", &self.options)
			.finish_non_exhaustive()
	}
}

impl ModuleDiscoveryService {
	pub fn new(registry: Arc<WrapperRegistry>) -> Self {
		Self {
			registry,
			loaders: Arc::new(LoaderMap::default()),
			contexts: Mutex::new(Vec::new()),
			options: DiscoveryOptions::default(),
			observer: Arc::new(NoopObserver),
			next_generation: AtomicU64::new(0),
		}
	}

	/// Registers a loader for its [`ModuleLoader::kind`], replacing any previous one.
	pub fn with_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
		Arc::make_mut(&mut self.loaders).insert(loader.kind(), loader);
		self
	}

	pub fn with_options(mut self, options: DiscoveryOptions) -> Self {
		self.options = options;
		self
	}

	pub fn with_observer(mut self, observer: Arc<dyn OperationObserver>) -> Self {
		self.observer = observer;
		self
	}

	pub fn registry(&self) -> &Arc<WrapperRegistry> {
		&self.registry
	}

	pub fn options(&self) -> DiscoveryOptions {
		self.options
	}

	/// Discovers and loads every module under `paths`.
	///
	/// Each path is a `module.toml`, a module directory containing one, or a directory whose
	/// immediate subdirectories are modules.
	pub async fn discover(&self, paths: &[PathBuf]) -> DiscoveryReport {
		self.discover_with_cancel(paths, &CancellationToken::new()).await
	}

	/// Like [`Self::discover`]; loads still pending when `cancel` fires end as
	/// [`ModuleError::Cancelled`] without disabling their modules.
	pub async fn discover_with_cancel(&self, paths: &[PathBuf], cancel: &CancellationToken) -> DiscoveryReport {
		let started = Instant::now();
		let mut report = DiscoveryReport::default();

		let roots = paths.to_vec();
		let (candidates, unreadable) = match modkit_worker::spawn_blocking(TaskClass::IoBlocking, move || expand_candidates(&roots)).await
		{
			Ok(found) => found,
			Err(err) => {
				tracing::warn!(error = %err, "module candidate scan failed");
				return report;
			}
		};
		for (path, error) in unreadable {
			tracing::warn!(path = %path.display(), %error, "module path unreadable");
			report.failures.push(DiscoveryFailure {
				path,
				module: None,
				error: error.into(),
			});
		}

		let scheduled = self.schedule(candidates, &mut report);
		self.run_scheduled(scheduled, cancel, &mut report).await;

		tracing::info!(
			loaded = report.loaded.len(),
			failed = report.failures.len(),
			skipped = report.skipped.len(),
			elapsed_ms = started.elapsed().as_millis() as u64,
			"module discovery finished"
		);
		report
	}

	/// Moves eligible candidates to `Loading` and assigns their generations.
	fn schedule(&self, candidates: Vec<PathBuf>, report: &mut DiscoveryReport) -> Vec<(PathBuf, u64)> {
		let mut contexts = self.contexts.lock();
		let mut scheduled = Vec::new();
		for path in candidates {
			let idx = context_index(&mut contexts, &path);
			let ctx = &mut contexts[idx];
			let reason = match ctx.state() {
				ModuleState::Loaded if ctx.is_reloading() => Some(SkipReason::Busy),
				ModuleState::Loaded => Some(SkipReason::AlreadyLoaded),
				ModuleState::Loading | ModuleState::Unloading => Some(SkipReason::Busy),
				ModuleState::Unloaded if ctx.is_disabled() => Some(SkipReason::Disabled),
				ModuleState::Unloaded => None,
			};
			if let Some(reason) = reason {
				tracing::debug!(module = %ctx.id(), ?reason, "module.skip");
				report.skipped.push(SkippedCandidate {
					path,
					module: ctx.id().clone(),
					reason,
				});
				continue;
			}
			let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
			match ctx.begin_load(generation) {
				Ok(()) => scheduled.push((path, generation)),
				Err(err) => tracing::warn!(module = %ctx.id(), error = %err, "module.schedule"),
			}
		}
		scheduled
	}

	/// Loads every scheduled context, then finalizes them one by one in schedule order.
	async fn run_scheduled(&self, scheduled: Vec<(PathBuf, u64)>, cancel: &CancellationToken, report: &mut DiscoveryReport) {
		let mut results = self.load_all(&scheduled, cancel).await;
		for (slot, (path, generation)) in scheduled.into_iter().enumerate() {
			let (result, elapsed) = results[slot]
				.take()
				.unwrap_or_else(|| (Err((None, ModuleError::Panicked("load task aborted".into()))), Duration::ZERO));
			self.finalize(path, generation, result, elapsed, report);
		}
	}

	/// Runs every scheduled load concurrently; results come back indexed by schedule slot.
	async fn load_all(&self, scheduled: &[(PathBuf, u64)], cancel: &CancellationToken) -> Vec<Option<(LoadResult, Duration)>> {
		let mut results: Vec<Option<(LoadResult, Duration)>> = scheduled.iter().map(|_| None).collect();
		let mut set = WorkerJoinSet::new(TaskClass::Discovery);
		for (slot, (path, _)) in scheduled.iter().enumerate() {
			let loaders = Arc::clone(&self.loaders);
			let path = path.clone();
			let timeout = self.options.load_timeout;
			let cancel = cancel.clone();
			set.spawn(async move {
				let start = Instant::now();
				let result = load_candidate(loaders, path, timeout, cancel).await;
				(slot, result, start.elapsed())
			});
		}
		while let Some(joined) = set.join_next().await {
			match joined {
				Ok((slot, result, elapsed)) => results[slot] = Some((result, elapsed)),
				Err(err) => tracing::warn!(error = %err, "module load task failed"),
			}
		}
		results
	}

	fn finalize(&self, path: PathBuf, generation: u64, result: LoadResult, elapsed: Duration, report: &mut DiscoveryReport) {
		let mut contexts = self.contexts.lock();
		let Some(idx) = contexts.iter().position(|c| c.path() == path) else {
			return;
		};

		let materialized = result.and_then(|prepared| self.materialize(&contexts, idx, generation, prepared));
		match materialized {
			Ok(done) => {
				let Materialized {
					id,
					lease,
					bindings,
					partial,
					manifest,
				} = done;
				match contexts[idx].finish_load(id.clone(), lease, bindings.clone(), manifest.name, manifest.version) {
					Ok(Some(retired)) => self.retire(retired, Some((&id, bindings.as_slice()))),
					Ok(None) => {}
					Err(err) => tracing::warn!(module = %id, error = %err, "module.finish_load"),
				}
				if !partial.is_empty() {
					tracing::warn!(
						module = %id,
						failed = partial.len(),
						loaded = bindings.len(),
						"module loaded with partial type enumeration"
					);
				}
				tracing::info!(module = %id, generation, types = bindings.len(), "module loaded");
				self.observe_module(OperationKind::ModuleLoad, &id, elapsed, true);
				report.loaded.push(LoadedModuleReport {
					id,
					path,
					generation,
					bindings,
					partial,
				});
			}
			Err((id, error)) => {
				let shown = id.clone().unwrap_or_else(|| contexts[idx].id().clone());
				tracing::warn!(module = %shown, path = %path.display(), %error, "module failed to load");
				match contexts[idx].fail_load(id.clone(), error.clone()) {
					Ok(Some(retired)) => self.retire(retired, None),
					Ok(None) => {}
					Err(err) => tracing::warn!(module = %shown, error = %err, "module.fail_load"),
				}
				self.observe_module(OperationKind::ModuleLoad, &shown, elapsed, false);
				report.failures.push(DiscoveryFailure { path, module: id, error });
			}
		}
	}

	/// Tears down the generation a reload replaced.
	///
	/// When the module kept its id, `register_all` already swapped its surviving descriptors in
	/// place; only types the new generation no longer declares are removed here.
	fn retire(&self, retired: RetiredGeneration, current: Option<(&ModuleId, &[TypeBinding])>) {
		let removed = match current {
			Some((id, bindings)) if *id == retired.id => {
				let stale: Vec<TypeBinding> = retired.bindings.iter().copied().filter(|b| !bindings.contains(b)).collect();
				self.registry.deregister_bindings(id, &stale).removed
			}
			_ => self.registry.deregister_module(&retired.id).removed,
		};
		let in_flight = retired.lease.revoke();
		tracing::info!(
			module = %retired.id,
			generation = retired.lease.generation(),
			removed,
			in_flight,
			"module generation retired"
		);
	}

	/// Builds one descriptor per materializable declared type and registers them together.
	fn materialize(
		&self, contexts: &[ModuleContext], idx: usize, generation: u64, prepared: Prepared,
	) -> Result<Materialized, (Option<ModuleId>, ModuleError)> {
		let Prepared { manifest, library } = prepared;
		let id: ModuleId = manifest.id.as_str().into();

		let clash = contexts
			.iter()
			.enumerate()
			.find(|(i, c)| *i != idx && c.id() == &id && matches!(c.state(), ModuleState::Loaded | ModuleState::Unloading));
		if let Some((_, existing)) = clash {
			return Err((
				Some(id.clone()),
				ModuleError::DuplicateId {
					id: id.to_string(),
					existing: existing.path().to_path_buf(),
				},
			));
		}

		let lease = match library.retained {
			Some(retained) => ModuleLease::with_retained(id.clone(), generation, retained),
			None => ModuleLease::new(id.clone(), generation),
		};

		let mut descriptors = Vec::new();
		let mut bindings: Vec<TypeBinding> = Vec::new();
		let mut partial = Vec::new();
		for decl in &manifest.handlers {
			let priority = manifest.priority_for(decl, self.options.baseline_priority);
			for declared in &decl.types {
				let binding = match declared.parse::<TypeBinding>() {
					Ok(binding) => binding,
					Err(err) => {
						partial.push(TypeEnumerationFailure {
							declared: declared.clone(),
							reason: err.to_string(),
						});
						continue;
					}
				};
				if bindings.contains(&binding) {
					partial.push(TypeEnumerationFailure {
						declared: declared.clone(),
						reason: "declared more than once".into(),
					});
					continue;
				}
				match library.library.factory(binding) {
					Ok(factory) => {
						descriptors.push(WrapperDescriptor::new(binding, priority, factory, lease.clone()));
						bindings.push(binding);
					}
					Err(reason) => partial.push(TypeEnumerationFailure {
						declared: declared.clone(),
						reason,
					}),
				}
			}
		}

		if descriptors.is_empty() {
			return Err((Some(id), ModuleError::NoHandlers(manifest.declared_count())));
		}

		self.registry.register_all(descriptors);
		Ok(Materialized {
			id,
			lease,
			bindings,
			partial,
			manifest,
		})
	}

	/// Unloads a loaded module: deregisters its descriptors, then revokes its lease.
	///
	/// Returns the number of dispatch operations still in flight at revocation; they finish
	/// with the resources they already hold.
	pub fn unload(&self, id: &str) -> Result<usize, ModuleError> {
		let start = Instant::now();
		let mut contexts = self.contexts.lock();
		let result = match contexts.iter().position(|c| &**c.id() == id && c.state() == ModuleState::Loaded) {
			Some(idx) => self.unload_at(&mut contexts[idx]),
			None => Err(ModuleError::NotLoaded(id.to_string())),
		};
		drop(contexts);
		self.observe_module(OperationKind::ModuleUnload, id, start.elapsed(), result.is_ok());
		result
	}

	fn unload_at(&self, ctx: &mut ModuleContext) -> Result<usize, ModuleError> {
		let lease = ctx.begin_unload()?;
		let outcome = self.registry.deregister_module(ctx.id());
		let in_flight = lease.map_or(0, |lease| lease.revoke());
		ctx.finish_unload()?;
		tracing::info!(module = %ctx.id(), removed = outcome.removed, in_flight, "module unloaded");
		Ok(in_flight)
	}

	/// Unloads every loaded module. Returns how many were unloaded.
	pub fn unload_all(&self) -> usize {
		let loaded: Vec<ModuleId> = {
			let contexts = self.contexts.lock();
			contexts
				.iter()
				.filter(|c| c.state() == ModuleState::Loaded)
				.map(|c| c.id().clone())
				.collect()
		};
		loaded.iter().filter(|id| self.unload(id).is_ok()).count()
	}

	/// Loads the module again from its manifest under a fresh generation and lease, clearing
	/// any disabled flag.
	///
	/// A loaded module keeps serving from its current generation until the new one registers.
	/// If the reload fails, the module ends up unloaded and its previous lease is revoked.
	pub async fn reload(&self, id: &str) -> Result<DiscoveryReport, ModuleError> {
		let scheduled = {
			let mut contexts = self.contexts.lock();
			let idx = find_by_id(&contexts, id).ok_or_else(|| ModuleError::UnknownModule(id.to_string()))?;
			let ctx = &mut contexts[idx];
			let state = ctx.state();
			if ctx.is_reloading() || matches!(state, ModuleState::Loading | ModuleState::Unloading) {
				return Err(ModuleError::Busy {
					id: id.to_string(),
					state,
				});
			}
			let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
			if state == ModuleState::Loaded {
				ctx.begin_reload(generation)?;
			} else {
				ctx.clear_disabled();
				ctx.begin_load(generation)?;
			}
			(ctx.path().to_path_buf(), generation)
		};
		tracing::debug!(module = id, path = %scheduled.0.display(), generation = scheduled.1, "module.reload");

		let mut report = DiscoveryReport::default();
		self.run_scheduled(vec![scheduled], &CancellationToken::new(), &mut report).await;
		Ok(report)
	}

	/// Retries every module disabled by an earlier failed load.
	pub async fn retry_failed(&self) -> DiscoveryReport {
		let paths: Vec<PathBuf> = {
			let mut contexts = self.contexts.lock();
			contexts
				.iter_mut()
				.filter(|c| c.state() == ModuleState::Unloaded)
				.filter_map(|c| c.clear_disabled().then(|| c.path().to_path_buf()))
				.collect()
		};
		if paths.is_empty() {
			return DiscoveryReport::default();
		}
		self.discover(&paths).await
	}

	/// Snapshot of every known module context, sorted by id.
	pub fn contexts(&self) -> Vec<ModuleInfo> {
		let mut infos: Vec<ModuleInfo> = self.contexts.lock().iter().map(ModuleContext::info).collect();
		infos.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.path.cmp(&b.path)));
		infos
	}

	/// Lifecycle state of a module, if known.
	pub fn state(&self, id: &str) -> Option<ModuleState> {
		let contexts = self.contexts.lock();
		find_by_id(&contexts, id).map(|idx| contexts[idx].state())
	}

	/// Live lease of a loaded module.
	pub fn lease(&self, id: &str) -> Option<ModuleLease> {
		let contexts = self.contexts.lock();
		find_by_id(&contexts, id).and_then(|idx| contexts[idx].lease().cloned())
	}

	fn observe_module(&self, kind: OperationKind, module: &str, duration: Duration, success: bool) {
		self.observer.observe(OperationEvent {
			kind,
			subject: Subject::Module(module),
			module: Some(module),
			duration,
			success,
		});
	}
}

/// Context answering for `id`: one that is loaded or in transition, else the first match.
///
/// Several contexts can carry one id when a module failed as a duplicate of another.
fn find_by_id(contexts: &[ModuleContext], id: &str) -> Option<usize> {
	let mut fallback = None;
	for (idx, ctx) in contexts.iter().enumerate() {
		if &**ctx.id() != id {
			continue;
		}
		if ctx.state() != ModuleState::Unloaded {
			return Some(idx);
		}
		fallback.get_or_insert(idx);
	}
	fallback
}

fn context_index(contexts: &mut Vec<ModuleContext>, path: &Path) -> usize {
	match contexts.iter().position(|c| c.path() == path) {
		Some(idx) => idx,
		None => {
			contexts.push(ModuleContext::new(path));
			contexts.len() - 1
		}
	}
}

async fn load_candidate(loaders: Arc<LoaderMap>, path: PathBuf, timeout: Duration, cancel: CancellationToken) -> LoadResult {
	let work = modkit_worker::spawn_blocking(TaskClass::IoBlocking, move || prepare(&loaders, &path));
	tokio::select! {
		biased;
		_ = cancel.cancelled() => Err((None, ModuleError::Cancelled)),
		res = tokio::time::timeout(timeout, work) => match res {
			Err(_) => Err((None, ModuleError::Timeout(timeout))),
			Ok(Err(join)) => Err((None, ModuleError::Panicked(join.to_string()))),
			Ok(Ok(result)) => result,
		},
	}
}

fn prepare(loaders: &LoaderMap, path: &Path) -> LoadResult {
	let manifest = ModuleManifest::read(path).map_err(|e| (None::<ModuleId>, ModuleError::from(e)))?;
	let id: ModuleId = manifest.id.as_str().into();
	let loader = loaders
		.get(manifest.loader.kind.as_str())
		.ok_or_else(|| (Some(id.clone()), ModuleError::UnknownLoader(manifest.loader.kind.clone())))?;
	let base_dir = path.parent().unwrap_or(Path::new("."));
	let library = loader.load(&manifest, base_dir).map_err(|e| (Some(id), e))?;
	Ok(Prepared { manifest, library })
}

/// Expands roots into manifest paths in root order; modules inside one directory are sorted.
fn expand_candidates(roots: &[PathBuf]) -> (Vec<PathBuf>, Vec<(PathBuf, ManifestError)>) {
	let mut found = Vec::new();
	let mut unreadable = Vec::new();
	for root in roots {
		if root.is_file() {
			found.push(root.clone());
			continue;
		}
		let own = root.join(ModuleManifest::FILE_NAME);
		if own.is_file() {
			found.push(own);
			continue;
		}
		match std::fs::read_dir(root) {
			Ok(entries) => {
				let mut nested: Vec<PathBuf> = entries
					.flatten()
					.map(|entry| entry.path().join(ModuleManifest::FILE_NAME))
					.filter(|manifest| manifest.is_file())
					.collect();
				nested.sort();
				found.extend(nested);
			}
			Err(err) => unreadable.push((
				root.clone(),
				ManifestError::Io {
					path: root.clone(),
					message: err.to_string(),
				},
			)),
		}
	}
	let mut seen = rustc_hash::FxHashSet::default();
	found.retain(|path| seen.insert(path.clone()));
	(found, unreadable)
}
