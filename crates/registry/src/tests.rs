use modkit_primitives::ResourceType;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::test_fixtures::{lease, make_default, make_desc, make_desc_with_lease, winner_module};
use crate::{RegistryError, TypeBinding, WinnerChange, WrapperRegistry};

const T1: ResourceType = ResourceType(0x01);
const T2: ResourceType = ResourceType(0x02);

/// Higher priority wins regardless of registration order; unloading it exposes the runner-up.
#[test]
fn higher_priority_wins_then_unload_falls_back() {
	let registry = WrapperRegistry::new();
	registry.register(make_desc(0x01, 10, "A"));
	registry.register(make_desc(0x01, 20, "B"));

	assert_eq!(winner_module(registry.resolve(T1)).as_deref(), Some("B"));

	let outcome = registry.deregister_module("B");
	assert_eq!(outcome.removed, 1);
	assert_eq!(winner_module(registry.resolve(T1)).as_deref(), Some("A"));
}

#[test]
fn equal_priority_resolves_to_earliest_registration() {
	let registry = WrapperRegistry::new();
	registry.register(make_desc(0x01, 5, "first"));
	registry.register(make_desc(0x01, 5, "second"));
	registry.register(make_desc(0x01, 5, "third"));

	assert_eq!(winner_module(registry.resolve(T1)).as_deref(), Some("first"));
	registry.snapshot().assert_sorted();
}

#[test]
fn resolve_never_falls_back_but_resolve_or_default_does() {
	let registry = WrapperRegistry::new();
	registry.register(make_default(0, "builtin"));

	let ty = ResourceType(0x99);
	assert!(registry.resolve(ty).is_none());
	let fallback = registry.resolve_or_default(ty).expect("default registered");
	assert_eq!(fallback.binding(), TypeBinding::Default);
	assert_eq!(&**fallback.module(), "builtin");
}

#[test]
fn resolve_or_default_without_any_wrapper_fails() {
	let registry = WrapperRegistry::new();
	assert_eq!(
		registry.resolve_or_default(ResourceType(0x99)).unwrap_err(),
		RegistryError::NoWrapperAvailable(ResourceType(0x99))
	);
}

/// Re-registering an unchanged descriptor keeps its sequence number and bucket length.
#[test]
fn reregistration_is_idempotent() {
	let registry = WrapperRegistry::new();
	registry.register(make_desc(0x01, 5, "A"));
	registry.register(make_desc(0x01, 5, "B"));
	let before: Vec<u64> = registry.snapshot().bucket(T1.into()).iter().map(|e| e.seq).collect();

	let outcome = registry.register(make_desc(0x01, 5, "A"));
	assert_eq!(outcome.replaced, 1);
	assert_eq!(outcome.inserted, 0);
	assert!(outcome.changes.is_empty());

	let snap = registry.snapshot();
	let after: Vec<u64> = snap.bucket(T1.into()).iter().map(|e| e.seq).collect();
	assert_eq!(before, after);
	assert_eq!(winner_module(registry.resolve(T1)).as_deref(), Some("A"));
}

/// Raising the priority of an existing `(type, module)` moves it without duplicating it.
#[test]
fn replacement_reevaluates_position() {
	let registry = WrapperRegistry::new();
	registry.register(make_desc(0x01, 10, "A"));
	registry.register(make_desc(0x01, 20, "B"));

	let outcome = registry.register(make_desc(0x01, 30, "A"));
	assert_eq!(
		outcome.change_for(T1.into()),
		Some(&WinnerChange {
			binding: T1.into(),
			previous: Some("B".into()),
			current: Some("A".into()),
		})
	);
	assert_eq!(registry.snapshot().bucket(T1.into()).len(), 2);
	registry.snapshot().assert_sorted();
}

#[test]
fn deregistration_touches_every_bucket_of_the_module() {
	let registry = WrapperRegistry::new();
	registry.register_all(vec![make_desc(0x01, 10, "A"), make_desc(0x02, 10, "A"), make_default(10, "A")]);
	registry.register(make_desc(0x02, 1, "B"));

	let outcome = registry.deregister_module("A");
	assert_eq!(outcome.removed, 3);
	assert!(registry.resolve(T1).is_none());
	assert_eq!(winner_module(registry.resolve(T2)).as_deref(), Some("B"));
	assert!(registry.resolve_default().is_none());
	assert_eq!(registry.modules().len(), 1);
	assert!(registry.snapshot().bucket(T1.into()).is_empty());
}

/// Dropping some bindings leaves the module's other buckets and their tie-break order alone.
#[test]
fn deregistering_bindings_keeps_the_rest_of_the_module() {
	let registry = WrapperRegistry::new();
	registry.register_all(vec![make_desc(0x01, 5, "A"), make_desc(0x02, 5, "A")]);
	registry.register_all(vec![make_desc(0x01, 5, "B"), make_desc(0x02, 5, "B")]);

	let outcome = registry.deregister_bindings("A", &[TypeBinding::Type(T2)]);
	assert_eq!(outcome.removed, 1);
	assert_eq!(winner_module(registry.resolve(T1)).as_deref(), Some("A"));
	assert_eq!(winner_module(registry.resolve(T2)).as_deref(), Some("B"));
	assert_eq!(registry.deregister_bindings("A", &[]).removed, 0);
}

#[test]
fn deregistering_unknown_module_publishes_nothing() {
	let registry = WrapperRegistry::new();
	registry.register(make_desc(0x01, 10, "A"));
	let before = registry.snapshot();
	let outcome = registry.deregister_module("missing");
	assert_eq!(outcome.removed, 0);
	assert!(std::sync::Arc::ptr_eq(&before, &registry.snapshot()));
}

/// Disabling skips a module's descriptors on the very next lookup without republishing.
#[test]
fn disabled_modules_are_skipped_without_mutation() {
	let registry = WrapperRegistry::new();
	registry.register(make_desc(0x01, 10, "A"));
	registry.register(make_desc(0x01, 20, "B"));
	registry.register(make_default(0, "builtin"));
	let snap_before = registry.snapshot();

	assert!(registry.disable_module("B"));
	assert!(!registry.disable_module("B"));
	assert!(std::sync::Arc::ptr_eq(&snap_before, &registry.snapshot()));
	assert_eq!(winner_module(registry.resolve(T1)).as_deref(), Some("A"));

	registry.disable_module("A");
	assert!(registry.resolve(T1).is_none());
	assert_eq!(&**registry.resolve_or_default(T1).unwrap().module(), "builtin");

	registry.disable_module("builtin");
	assert!(registry.resolve_or_default(T1).is_err());

	assert!(registry.enable_module("B"));
	assert_eq!(winner_module(registry.resolve(T1)).as_deref(), Some("B"));
	assert_eq!(
		registry.disabled_modules().iter().map(|m| m.to_string()).collect::<Vec<_>>(),
		vec!["A".to_string(), "builtin".to_string()]
	);
}

#[test]
fn revoked_leases_are_never_resolved() {
	let registry = WrapperRegistry::new();
	let stale = lease("A");
	registry.register(make_desc_with_lease(T1.into(), 50, stale.clone()));
	registry.register(make_desc(0x01, 1, "B"));

	stale.revoke();
	assert_eq!(winner_module(registry.resolve(T1)).as_deref(), Some("B"));
}

#[test]
fn winners_and_listing_are_sorted_by_type() {
	let registry = WrapperRegistry::new();
	registry.register(make_default(0, "builtin"));
	registry.register(make_desc(0x30, 1, "C"));
	registry.register(make_desc(0x10, 1, "A"));
	registry.register(make_desc(0x10, 2, "B"));

	let winners: Vec<(u32, String)> = registry
		.winners()
		.into_iter()
		.map(|(ty, d)| (ty.get(), d.module().to_string()))
		.collect();
	assert_eq!(winners, vec![(0x10, "B".to_string()), (0x30, "C".to_string())]);

	let listed: Vec<(String, String)> = registry
		.list_all()
		.into_iter()
		.map(|(binding, d)| (binding.to_string(), d.module().to_string()))
		.collect();
	assert_eq!(
		listed,
		vec![
			("0x00000010".to_string(), "B".to_string()),
			("0x00000010".to_string(), "A".to_string()),
			("0x00000030".to_string(), "C".to_string()),
			("*".to_string(), "builtin".to_string()),
		]
	);
}

#[test]
fn type_binding_parses_wildcard() {
	assert_eq!("*".parse::<TypeBinding>(), Ok(TypeBinding::Default));
	assert_eq!("0x00000001".parse::<TypeBinding>(), Ok(TypeBinding::Type(T1)));
	assert!("nope".parse::<TypeBinding>().is_err());
}

proptest! {
	/// With distinct priorities the maximum always wins, whatever the registration order.
	#[test]
	fn max_priority_wins(priorities in proptest::collection::hash_set(-1000i32..1000, 1..12)) {
		let registry = WrapperRegistry::new();
		let priorities: Vec<i32> = priorities.into_iter().collect();
		for (idx, priority) in priorities.iter().enumerate() {
			registry.register(make_desc(0x01, *priority, &format!("m{idx}")));
		}
		let max = priorities.iter().copied().max().unwrap();
		let winner = registry.resolve(T1).unwrap();
		prop_assert_eq!(winner.priority(), max);
		registry.snapshot().assert_sorted();
	}

	/// Resolution is a pure function of the registration sequence.
	#[test]
	fn resolution_is_reproducible(priorities in proptest::collection::vec(0i32..4, 1..16)) {
		let build = || {
			let registry = WrapperRegistry::new();
			for (idx, priority) in priorities.iter().enumerate() {
				registry.register(make_desc(0x01, *priority, &format!("m{idx}")));
			}
			registry.list_all().into_iter().map(|(_, d)| d.module().to_string()).collect::<Vec<_>>()
		};
		let first = build();
		prop_assert_eq!(&first, &build());

		let max = priorities.iter().copied().max().unwrap();
		let earliest = priorities.iter().position(|p| *p == max).unwrap();
		prop_assert_eq!(first[0].clone(), format!("m{earliest}"));
	}
}
