//! Immutable registry views.
//!
//! # Role
//!
//! A [`RegistrySnapshot`] is the published state readers resolve against. It contains no
//! mutation logic; writers in `runtime` build a replacement and swap it in whole.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::collision::rank_cmp;
use crate::descriptor::{ModuleId, TypeBinding, WrapperDescriptor};

/// A descriptor together with the sequence number it was first registered with.
#[derive(Debug, Clone)]
pub struct RankedEntry {
	pub descriptor: Arc<WrapperDescriptor>,
	/// Monotonic registration sequence used for tie-breaking.
	pub seq: u64,
}

impl RankedEntry {
	/// Returns true if lookups may pick this entry.
	pub(crate) fn is_live(&self, disabled: &FxHashSet<ModuleId>) -> bool {
		!disabled.contains(self.descriptor.module()) && !self.descriptor.lease().is_revoked()
	}
}

/// Published registry state.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
	pub(crate) buckets: FxHashMap<TypeBinding, Arc<[RankedEntry]>>,
	/// Next sequence number to hand out.
	pub(crate) next_seq: u64,
}

impl RegistrySnapshot {
	/// Returns the ranked bucket for `binding` (empty when nothing is registered).
	pub fn bucket(&self, binding: TypeBinding) -> &[RankedEntry] {
		self.buckets.get(&binding).map(|b| &b[..]).unwrap_or(&[])
	}

	/// Highest ranked live descriptor for `binding`.
	pub fn winner(&self, binding: TypeBinding, disabled: &FxHashSet<ModuleId>) -> Option<&Arc<WrapperDescriptor>> {
		self.bucket(binding)
			.iter()
			.find(|entry| entry.is_live(disabled))
			.map(|entry| &entry.descriptor)
	}

	/// Bindings with at least one descriptor, in ascending order (default bucket last).
	pub fn bindings(&self) -> Vec<TypeBinding> {
		let mut bindings: Vec<_> = self.buckets.keys().copied().collect();
		bindings.sort_unstable();
		bindings
	}

	/// Iterates every `(binding, entry)` pair, ordered by binding then rank.
	pub fn iter(&self) -> impl Iterator<Item = (TypeBinding, &RankedEntry)> + '_ {
		self.bindings()
			.into_iter()
			.flat_map(move |binding| self.bucket(binding).iter().map(move |entry| (binding, entry)))
	}

	/// Distinct module ids with at least one registered descriptor, sorted.
	pub fn modules(&self) -> Vec<ModuleId> {
		let mut modules: Vec<ModuleId> = self
			.buckets
			.values()
			.flat_map(|bucket| bucket.iter().map(|e| e.descriptor.module().clone()))
			.collect();
		modules.sort_unstable();
		modules.dedup();
		modules
	}

	/// Total number of registered descriptors.
	pub fn len(&self) -> usize {
		self.buckets.values().map(|b| b.len()).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.buckets.is_empty()
	}

	/// Checks the ordering invariant for every bucket.
	#[cfg(test)]
	pub(crate) fn assert_sorted(&self) {
		for (binding, bucket) in &self.buckets {
			assert!(!bucket.is_empty(), "empty bucket left for {binding}");
			for pair in bucket.windows(2) {
				assert_eq!(
					rank_cmp(&pair[0], &pair[1]),
					std::cmp::Ordering::Less,
					"bucket {binding} out of order"
				);
			}
		}
	}
}

/// Inserts `entry` at its ranked position.
pub(crate) fn insert_ranked(entries: &mut Vec<RankedEntry>, entry: RankedEntry) {
	let pos = entries.partition_point(|existing| rank_cmp(existing, &entry) == std::cmp::Ordering::Less);
	entries.insert(pos, entry);
}
