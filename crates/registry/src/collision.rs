//! Precedence rules and winner-change reporting.
//!
//! Two modules may claim the same type. That is never an error: the bucket ranks them and the
//! registry reports when the effective winner for a binding moves.

use std::cmp::Ordering;

use crate::descriptor::{ModuleId, TypeBinding};
use crate::snapshot::RankedEntry;

/// Compares two entries by resolution precedence.
///
/// 1. Priority (higher first)
/// 2. Registration sequence (earlier first)
///
/// `Ordering::Less` means `a` resolves before `b`.
pub(crate) fn rank_cmp(a: &RankedEntry, b: &RankedEntry) -> Ordering {
	b.descriptor
		.priority()
		.cmp(&a.descriptor.priority())
		.then_with(|| a.seq.cmp(&b.seq))
}

/// The effective winner for a binding moved from one module to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinnerChange {
	pub binding: TypeBinding,
	pub previous: Option<ModuleId>,
	pub current: Option<ModuleId>,
}

impl WinnerChange {
	pub(crate) fn log(&self) {
		match (&self.previous, &self.current) {
			(Some(prev), Some(cur)) => tracing::info!(
				binding = %self.binding,
				previous = %prev,
				current = %cur,
				"type {} was served by module {prev}, now served by module {cur}",
				self.binding
			),
			(None, Some(cur)) => tracing::debug!(binding = %self.binding, current = %cur, "type now served"),
			(Some(prev), None) => tracing::info!(binding = %self.binding, previous = %prev, "type no longer served"),
			(None, None) => {}
		}
	}
}

/// Result of one registry publication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationOutcome {
	/// Descriptors added under a new `(binding, module)`.
	pub inserted: usize,
	/// Descriptors that replaced an existing `(binding, module)`.
	pub replaced: usize,
	/// Descriptors removed by deregistration.
	pub removed: usize,
	/// Bindings whose live winner changed.
	pub changes: Vec<WinnerChange>,
}

impl RegistrationOutcome {
	/// Returns the change recorded for `binding`, if any.
	pub fn change_for(&self, binding: TypeBinding) -> Option<&WinnerChange> {
		self.changes.iter().find(|c| c.binding == binding)
	}
}
