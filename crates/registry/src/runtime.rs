//! Runtime registry container with atomic publication.
//!
//! # Role
//!
//! Thread-safe entrypoint for reading and updating wrapper buckets. Handles the CAS-based
//! publication loop.
//!
//! # Invariants
//!
//! - Concurrent registrations must be linearizable (see `invariants::concurrent_registrations_are_not_lost`).
//! - Deregistration of a module is one publication (see `invariants::deregistration_is_all_or_nothing`).
//! - The disabled set lives in its own cell; toggling it never republishes buckets.

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use modkit_primitives::{NoopObserver, OperationEvent, OperationKind, OperationObserver, ResourceType, Subject};
use rustc_hash::FxHashSet;

use crate::collision::{RegistrationOutcome, WinnerChange};
use crate::descriptor::{ModuleId, TypeBinding, WrapperDescriptor};
use crate::error::RegistryError;
use crate::snapshot::{RankedEntry, RegistrySnapshot, insert_ranked};

/// Concurrent index from resource type to ranked wrapper descriptors.
pub struct WrapperRegistry {
	snap: ArcSwap<RegistrySnapshot>,
	disabled: ArcSwap<FxHashSet<ModuleId>>,
	observer: Arc<dyn OperationObserver>,
}

impl Default for WrapperRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for WrapperRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let snap = self.snap.load();
		f.debug_struct("WrapperRegistry")
			.field("descriptors", &snap.len())
			.field("next_seq", &snap.next_seq)
			.field("disabled", &self.disabled.load().len())
			.finish()
	}
}

impl WrapperRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::with_observer(Arc::new(NoopObserver))
	}

	/// Creates an empty registry reporting registrations to `observer`.
	pub fn with_observer(observer: Arc<dyn OperationObserver>) -> Self {
		Self {
			snap: ArcSwap::from_pointee(RegistrySnapshot::default()),
			disabled: ArcSwap::from_pointee(FxHashSet::default()),
			observer,
		}
	}

	/// Returns the currently published snapshot.
	pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
		self.snap.load_full()
	}

	/// Highest-priority live descriptor for `resource_type`. Never falls back to the default.
	pub fn resolve(&self, resource_type: ResourceType) -> Option<Arc<WrapperDescriptor>> {
		self.resolve_binding(TypeBinding::Type(resource_type))
	}

	/// Highest-priority live default descriptor.
	pub fn resolve_default(&self) -> Option<Arc<WrapperDescriptor>> {
		self.resolve_binding(TypeBinding::Default)
	}

	/// Type-specific winner, else the default winner.
	pub fn resolve_or_default(&self, resource_type: ResourceType) -> Result<Arc<WrapperDescriptor>, RegistryError> {
		let snap = self.snap.load();
		let disabled = self.disabled.load();
		snap.winner(TypeBinding::Type(resource_type), &disabled)
			.or_else(|| snap.winner(TypeBinding::Default, &disabled))
			.cloned()
			.ok_or(RegistryError::NoWrapperAvailable(resource_type))
	}

	fn resolve_binding(&self, binding: TypeBinding) -> Option<Arc<WrapperDescriptor>> {
		let snap = self.snap.load();
		let disabled = self.disabled.load();
		snap.winner(binding, &disabled).cloned()
	}

	/// Every registered `(binding, descriptor)`, ordered by binding then rank.
	pub fn list_all(&self) -> Vec<(TypeBinding, Arc<WrapperDescriptor>)> {
		let snap = self.snap.load();
		snap.iter().map(|(binding, entry)| (binding, entry.descriptor.clone())).collect()
	}

	/// Live winner for every type-specific binding, sorted by type.
	pub fn winners(&self) -> Vec<(ResourceType, Arc<WrapperDescriptor>)> {
		let snap = self.snap.load();
		let disabled = self.disabled.load();
		snap.bindings()
			.into_iter()
			.filter_map(|binding| {
				let ty = binding.resource_type()?;
				snap.winner(binding, &disabled).map(|winner| (ty, winner.clone()))
			})
			.collect()
	}

	/// Module ids with at least one registered descriptor.
	pub fn modules(&self) -> Vec<ModuleId> {
		self.snap.load().modules()
	}

	/// Registers one descriptor.
	pub fn register(&self, descriptor: WrapperDescriptor) -> RegistrationOutcome {
		self.register_all(vec![descriptor])
	}

	/// Registers a batch of descriptors in one publication.
	///
	/// A descriptor whose `(binding, module)` already exists replaces it and inherits its
	/// sequence number, so re-registration after a reload keeps its tie-break position.
	pub fn register_all(&self, descriptors: Vec<WrapperDescriptor>) -> RegistrationOutcome {
		let start = Instant::now();
		let incoming: Vec<Arc<WrapperDescriptor>> = descriptors.into_iter().map(Arc::new).collect();
		if incoming.is_empty() {
			return RegistrationOutcome::default();
		}

		loop {
			let old = self.snap.load_full();
			let mut buckets = old.buckets.clone();
			let mut next_seq = old.next_seq;
			let mut outcome = RegistrationOutcome::default();
			let mut touched: Vec<TypeBinding> = Vec::new();

			for descriptor in &incoming {
				let binding = descriptor.binding();
				let mut entries: Vec<RankedEntry> = buckets.get(&binding).map(|b| b.to_vec()).unwrap_or_default();

				let seq = match entries.iter().position(|e| e.descriptor.module() == descriptor.module()) {
					Some(idx) => {
						outcome.replaced += 1;
						entries.remove(idx).seq
					}
					None => {
						outcome.inserted += 1;
						let seq = next_seq;
						next_seq += 1;
						seq
					}
				};
				insert_ranked(
					&mut entries,
					RankedEntry {
						descriptor: descriptor.clone(),
						seq,
					},
				);
				buckets.insert(binding, Arc::from(entries));
				if !touched.contains(&binding) {
					touched.push(binding);
				}
			}

			let new = Arc::new(RegistrySnapshot { buckets, next_seq });
			let prev = self.snap.compare_and_swap(&old, Arc::clone(&new));
			if Arc::ptr_eq(&prev, &old) {
				outcome.changes = self.winner_changes(&old, &new, &touched);
				let module = incoming[0].module().clone();
				self.finish_publication(&module, &outcome, start);
				return outcome;
			}
			// CAS lost to a concurrent writer; rebuild from the newer snapshot.
		}
	}

	/// Removes every descriptor contributed by `module` in one publication.
	pub fn deregister_module(&self, module: &str) -> RegistrationOutcome {
		self.remove_entries(module, |_| true)
	}

	/// Removes `module`'s descriptors for `bindings` only, in one publication.
	///
	/// Used when a reloaded module stops declaring some of its earlier types.
	pub fn deregister_bindings(&self, module: &str, bindings: &[TypeBinding]) -> RegistrationOutcome {
		if bindings.is_empty() {
			return RegistrationOutcome::default();
		}
		self.remove_entries(module, |binding| bindings.contains(&binding))
	}

	fn remove_entries(&self, module: &str, selected: impl Fn(TypeBinding) -> bool) -> RegistrationOutcome {
		let start = Instant::now();
		loop {
			let old = self.snap.load_full();
			let mut buckets = old.buckets.clone();
			let mut outcome = RegistrationOutcome::default();
			let mut touched = Vec::new();

			for (binding, bucket) in old.buckets.iter() {
				if !selected(*binding) || !bucket.iter().any(|e| &**e.descriptor.module() == module) {
					continue;
				}
				let kept: Vec<RankedEntry> = bucket.iter().filter(|e| &**e.descriptor.module() != module).cloned().collect();
				outcome.removed += bucket.len() - kept.len();
				touched.push(*binding);
				if kept.is_empty() {
					buckets.remove(binding);
				} else {
					buckets.insert(*binding, Arc::from(kept));
				}
			}

			if touched.is_empty() {
				return outcome;
			}
			touched.sort_unstable();

			let new = Arc::new(RegistrySnapshot {
				buckets,
				next_seq: old.next_seq,
			});
			let prev = self.snap.compare_and_swap(&old, Arc::clone(&new));
			if Arc::ptr_eq(&prev, &old) {
				outcome.changes = self.winner_changes(&old, &new, &touched);
				self.finish_publication(&ModuleId::from(module), &outcome, start);
				return outcome;
			}
		}
	}

	/// Makes lookups skip `module`'s descriptors. Returns false if it was already disabled.
	pub fn disable_module(&self, module: &str) -> bool {
		let mut changed = false;
		self.disabled.rcu(|current| {
			let mut next = (**current).clone();
			changed = next.insert(ModuleId::from(module));
			next
		});
		if changed {
			tracing::debug!(module, "module disabled for resolution");
		}
		changed
	}

	/// Re-enables a disabled module. Returns false if it was not disabled.
	pub fn enable_module(&self, module: &str) -> bool {
		let mut changed = false;
		self.disabled.rcu(|current| {
			let mut next = (**current).clone();
			changed = next.remove(module);
			next
		});
		if changed {
			tracing::debug!(module, "module re-enabled for resolution");
		}
		changed
	}

	pub fn is_disabled(&self, module: &str) -> bool {
		self.disabled.load().contains(module)
	}

	/// Disabled module ids, sorted.
	pub fn disabled_modules(&self) -> Vec<ModuleId> {
		let mut modules: Vec<ModuleId> = self.disabled.load().iter().cloned().collect();
		modules.sort_unstable();
		modules
	}

	fn winner_changes(&self, old: &RegistrySnapshot, new: &RegistrySnapshot, touched: &[TypeBinding]) -> Vec<WinnerChange> {
		let disabled = self.disabled.load();
		touched
			.iter()
			.filter_map(|&binding| {
				let previous = old.winner(binding, &disabled);
				let current = new.winner(binding, &disabled);
				let same = match (previous, current) {
					(Some(a), Some(b)) => a.module() == b.module(),
					(None, None) => true,
					_ => false,
				};
				(!same).then(|| WinnerChange {
					binding,
					previous: previous.map(|d| d.module().clone()),
					current: current.map(|d| d.module().clone()),
				})
			})
			.collect()
	}

	fn finish_publication(&self, module: &ModuleId, outcome: &RegistrationOutcome, start: Instant) {
		for change in &outcome.changes {
			change.log();
		}
		tracing::trace!(
			module = %module,
			inserted = outcome.inserted,
			replaced = outcome.replaced,
			removed = outcome.removed,
			"registry.publish"
		);
		self.observer.observe(OperationEvent {
			kind: OperationKind::Registration,
			subject: Subject::Module(module),
			module: Some(module),
			duration: start.elapsed(),
			success: true,
		});
	}
}
