//! Module liveness capability.
//!
//! # Role
//!
//! A [`ModuleLease`] is shared by a module context and every descriptor it contributed. The
//! discovery service revokes it when the module unloads. Dispatch acquires a [`LeaseGuard`]
//! right before invoking a factory: acquisition fails once the lease is revoked, while a guard
//! taken earlier keeps the module's retained resources alive until the call finishes.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::descriptor::ModuleId;

/// Returned when acquiring a lease whose module has been unloaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("module '{module}' (generation {generation}) was unloaded")]
pub struct LeaseRevoked {
	pub module: ModuleId,
	pub generation: u64,
}

struct LeaseInner {
	module: ModuleId,
	generation: u64,
	revoked: AtomicBool,
	in_flight: AtomicUsize,
	retained: Option<Arc<dyn Any + Send + Sync>>,
}

/// Shared liveness handle for one loaded generation of a module.
#[derive(Clone)]
pub struct ModuleLease {
	inner: Arc<LeaseInner>,
}

impl ModuleLease {
	pub fn new(module: impl Into<ModuleId>, generation: u64) -> Self {
		Self::build(module.into(), generation, None)
	}

	/// Creates a lease that keeps `retained` (e.g. a loaded library) alive while any descriptor
	/// or guard still references it.
	pub fn with_retained(module: impl Into<ModuleId>, generation: u64, retained: Arc<dyn Any + Send + Sync>) -> Self {
		Self::build(module.into(), generation, Some(retained))
	}

	fn build(module: ModuleId, generation: u64, retained: Option<Arc<dyn Any + Send + Sync>>) -> Self {
		Self {
			inner: Arc::new(LeaseInner {
				module,
				generation,
				revoked: AtomicBool::new(false),
				in_flight: AtomicUsize::new(0),
				retained,
			}),
		}
	}

	pub fn module(&self) -> &ModuleId {
		&self.inner.module
	}

	pub fn generation(&self) -> u64 {
		self.inner.generation
	}

	pub fn is_revoked(&self) -> bool {
		self.inner.revoked.load(Ordering::Acquire)
	}

	/// Marks the lease revoked. Returns the number of calls still in flight.
	pub fn revoke(&self) -> usize {
		self.inner.revoked.store(true, Ordering::SeqCst);
		self.inner.in_flight.load(Ordering::SeqCst)
	}

	/// Number of guards currently held.
	pub fn in_flight(&self) -> usize {
		self.inner.in_flight.load(Ordering::Acquire)
	}

	/// Pins the module for the duration of one factory call.
	pub fn acquire(&self) -> Result<LeaseGuard, LeaseRevoked> {
		// Count first, then check: a concurrent `revoke` either sees this call or refuses it.
		self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
		if self.inner.revoked.load(Ordering::SeqCst) {
			self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
			return Err(self.revoked_error());
		}
		Ok(LeaseGuard {
			inner: Arc::clone(&self.inner),
		})
	}

	pub fn same_lease(&self, other: &ModuleLease) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	fn revoked_error(&self) -> LeaseRevoked {
		LeaseRevoked {
			module: self.inner.module.clone(),
			generation: self.inner.generation,
		}
	}
}

impl fmt::Debug for ModuleLease {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ModuleLease")
			.field("module", &self.inner.module)
			.field("generation", &self.inner.generation)
			.field("revoked", &self.is_revoked())
			.field("in_flight", &self.in_flight())
			.field("retains", &self.inner.retained.is_some())
			.finish()
	}
}

/// Keeps a module generation alive for one in-flight call.
pub struct LeaseGuard {
	inner: Arc<LeaseInner>,
}

impl LeaseGuard {
	pub fn generation(&self) -> u64 {
		self.inner.generation
	}
}

impl Drop for LeaseGuard {
	fn drop(&mut self) {
		self.inner.in_flight.fetch_sub(1, Ordering::AcqRel);
	}
}

impl fmt::Debug for LeaseGuard {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LeaseGuard")
			.field("module", &self.inner.module)
			.field("generation", &self.inner.generation)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn guard_counts_in_flight_calls() {
		let lease = ModuleLease::new("a", 1);
		let guard = lease.acquire().unwrap();
		assert_eq!(lease.in_flight(), 1);
		assert_eq!(lease.revoke(), 1);
		assert!(lease.acquire().is_err());
		drop(guard);
		assert_eq!(lease.in_flight(), 0);
	}

	#[test]
	fn retained_value_outlives_revocation_while_guarded() {
		let payload: Arc<dyn Any + Send + Sync> = Arc::new(42u32);
		let weak = Arc::downgrade(&payload);
		let lease = ModuleLease::with_retained("a", 3, payload);
		let guard = lease.acquire().unwrap();
		lease.revoke();
		drop(lease);
		assert!(weak.upgrade().is_some());
		drop(guard);
		assert!(weak.upgrade().is_none());
	}

	#[test]
	fn revoked_error_names_generation() {
		let lease = ModuleLease::new("mod-b", 7);
		lease.revoke();
		let err = lease.acquire().unwrap_err();
		assert_eq!(err.generation, 7);
		assert_eq!(&*err.module, "mod-b");
	}
}
