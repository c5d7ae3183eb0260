//! Concurrency invariants of the runtime registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use modkit_primitives::ResourceType;

use crate::WrapperRegistry;
use crate::test_fixtures::{make_desc, make_desc_with_lease};

/// Invariant: concurrent registrations from many threads are all published.
#[test]
fn concurrent_registrations_are_not_lost() {
	let registry = Arc::new(WrapperRegistry::new());
	let threads: Vec<_> = (0..8)
		.map(|t| {
			let registry = Arc::clone(&registry);
			thread::spawn(move || {
				for i in 0..50u32 {
					registry.register(make_desc(i % 7, (i % 3) as i32, &format!("t{t}-m{i}")));
				}
			})
		})
		.collect();
	for handle in threads {
		handle.join().unwrap();
	}

	let snap = registry.snapshot();
	assert_eq!(snap.len(), 8 * 50);
	assert_eq!(snap.next_seq, 8 * 50);
	snap.assert_sorted();
}

/// Invariant: a reader sees either all or none of one module's descriptors.
#[test]
fn deregistration_is_all_or_nothing() {
	const TYPES: u32 = 16;
	let registry = Arc::new(WrapperRegistry::new());
	let stop = Arc::new(AtomicBool::new(false));
	let torn = Arc::new(AtomicUsize::new(0));

	let reader = {
		let registry = Arc::clone(&registry);
		let stop = Arc::clone(&stop);
		let torn = Arc::clone(&torn);
		thread::spawn(move || {
			while !stop.load(Ordering::Acquire) {
				let snap = registry.snapshot();
				let present = (0..TYPES)
					.filter(|ty| {
						snap.bucket(ResourceType(*ty).into())
							.iter()
							.any(|e| &**e.descriptor.module() == "cycled")
					})
					.count() as u32;
				if present != 0 && present != TYPES {
					torn.fetch_add(1, Ordering::Relaxed);
				}
			}
		})
	};

	for _ in 0..200 {
		registry.register_all((0..TYPES).map(|ty| make_desc(ty, 1, "cycled")).collect());
		registry.deregister_module("cycled");
	}
	stop.store(true, Ordering::Release);
	reader.join().unwrap();

	assert_eq!(torn.load(Ordering::Relaxed), 0, "reader observed a partially removed module");
}

/// Invariant: a descriptor captured before deregistration stays usable.
#[test]
fn captured_descriptor_survives_deregistration() {
	let registry = WrapperRegistry::new();
	let lease = crate::ModuleLease::new("A", 4);
	registry.register(make_desc_with_lease(ResourceType(1).into(), 1, lease.clone()));

	let captured = registry.resolve(ResourceType(1)).unwrap();
	registry.deregister_module("A");
	assert!(registry.resolve(ResourceType(1)).is_none());

	assert_eq!(captured.lease().generation(), 4);
	assert!(captured.lease().acquire().is_ok());
	lease.revoke();
	assert!(captured.lease().acquire().is_err());
}

/// Invariant: a winner is only displaced by an outranking registration or its removal.
#[test]
fn winner_is_stable_under_lower_ranked_registrations() {
	let registry = WrapperRegistry::new();
	registry.register(make_desc(1, 10, "W"));
	for i in 0..20 {
		let outcome = registry.register(make_desc(1, 10 - (i % 2), &format!("l{i}")));
		assert!(outcome.changes.is_empty());
		assert_eq!(&**registry.resolve(ResourceType(1)).unwrap().module(), "W");
	}
}
