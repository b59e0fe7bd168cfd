//! Strategy slot state machine, version policy, tracker membership, and
//! per-instance overrides.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::fixtures::{TestStrategy, harness, make_instance, make_type, upcast};

/// Exactly one of {none, strong, default} holds after any setter sequence.
#[test]
fn test_strategy_slots_are_mutually_exclusive() {
	let (_host, registry) = harness();
	let ty = make_type("Widget");
	let entry = registry.entry(&ty);

	assert!(entry.current_strategy().is_none());
	assert!(entry.strong_strategy().is_none());
	assert!(entry.default_strategy().is_none());

	let strong = TestStrategy::plain("strong");
	entry.set_strategy(Some(upcast(Arc::clone(&strong))));
	assert!(entry.strong_strategy().is_some());
	assert!(entry.default_strategy().is_none(), "installing strong clears default");

	let default = upcast(TestStrategy::plain("default"));
	entry.set_default_strategy(Some(Arc::clone(&default)));
	assert!(entry.strong_strategy().is_none(), "caching default clears strong");
	let held = entry.default_strategy().expect("default live while held");
	assert!(Arc::ptr_eq(&held, &default));

	entry.set_strategy(None);
	assert!(entry.current_strategy().is_none());
	assert!(entry.strong_strategy().is_none());
	assert!(entry.default_strategy().is_none());
}

/// A weak-held default dies once the last outside owner drops it.
#[test]
fn test_default_strategy_is_reclaimable() {
	let (_host, registry) = harness();
	let ty = make_type("Widget");
	let entry = registry.entry(&ty);

	let default = upcast(TestStrategy::plain("default"));
	entry.set_default_strategy(Some(Arc::clone(&default)));
	assert!(entry.current_strategy().is_some());

	drop(default);
	assert!(entry.current_strategy().is_none(), "registry alone must not keep it alive");
	assert!(entry.default_strategy().is_none());
}

/// Mutating calls bump the version; reads (including first-time lazy
/// descriptor/loader computation) do not.
#[test]
fn test_version_bumps_only_on_mutation() {
	let (_host, registry) = harness();
	let ty = make_type("Widget");
	let instance = make_instance(1);
	let entry = registry.entry(&ty);
	assert_eq!(entry.version(), 0);

	assert!(entry.current_strategy().is_none());
	entry.type_descriptor().expect("descriptor for live type");
	entry.artifact_loader().expect("loader for live type");
	assert!(entry.per_instance_strategy(&instance).is_none());
	assert_eq!(entry.version(), 0, "reads must not bump the version");

	entry.set_strategy(Some(upcast(TestStrategy::plain("a"))));
	assert_eq!(entry.version(), 1);

	let default = upcast(TestStrategy::plain("b"));
	entry.set_default_strategy(Some(Arc::clone(&default)));
	assert_eq!(entry.version(), 2);

	entry.set_per_instance_strategy(&instance, Some(upcast(TestStrategy::plain("c"))));
	assert_eq!(entry.version(), 3);
	entry.set_per_instance_strategy(&instance, None);
	assert_eq!(entry.version(), 4);

	let cached = entry.resolve_strategy().unwrap();
	assert!(cached.is_some(), "default still held above");
	assert_eq!(entry.version(), 4, "cache-hit resolve must not bump");
}

/// Tracker membership follows the extensibility of the installed strong
/// strategy, through installs, replacements, and demotions to default.
#[test]
fn test_tracker_follows_extensible_installs() {
	let (_host, registry) = harness();
	let ty = make_type("Widget");
	let entry = registry.entry(&ty);
	let tracker = registry.tracker();

	let ext = TestStrategy::extensible("ext");
	entry.set_strategy(Some(upcast(Arc::clone(&ext))));
	assert!(tracker.contains(&entry));
	assert!(ext.is_registered());

	entry.set_strategy(Some(upcast(TestStrategy::plain("plain"))));
	assert!(!tracker.contains(&entry), "plain install must untrack");
	assert!(!ext.is_registered());

	entry.set_strategy(Some(upcast(Arc::clone(&ext))));
	let default = upcast(TestStrategy::plain("default"));
	entry.set_default_strategy(Some(default));
	assert!(!tracker.contains(&entry), "demotion to default must untrack");
	assert!(!ext.is_registered());

	entry.set_strategy(Some(upcast(Arc::clone(&ext))));
	entry.set_strategy(None);
	assert!(tracker.is_empty());
	assert!(!ext.is_registered());
}

/// `bulk_reset` clears every tracked entry in insertion order and leaves
/// the tracker empty.
#[test]
fn test_bulk_reset_clears_all_tracked() {
	let (_host, registry) = harness();
	let first_ty = make_type("First");
	let second_ty = make_type("Second");
	let first = registry.entry(&first_ty);
	let second = registry.entry(&second_ty);

	let a = TestStrategy::extensible("a");
	let b = TestStrategy::extensible("b");
	first.set_strategy(Some(upcast(Arc::clone(&a))));
	second.set_strategy(Some(upcast(Arc::clone(&b))));

	let tracked = registry.tracker().tracked();
	assert_eq!(tracked.len(), 2);
	assert!(Arc::ptr_eq(&tracked[0], &first), "insertion order is deterministic");
	assert!(Arc::ptr_eq(&tracked[1], &second));

	let first_version = first.version();
	registry.tracker().bulk_reset();

	assert!(registry.tracker().is_empty());
	assert!(first.strong_strategy().is_none());
	assert!(second.strong_strategy().is_none());
	assert!(!a.is_registered());
	assert!(!b.is_registered());
	assert_eq!(first.version(), first_version + 1, "reset clears through the versioned path");
}

/// Per-instance overrides win over the type strategy and fall back once
/// removed.
#[test]
fn test_per_instance_override_precedence() {
	let (_host, registry) = harness();
	let ty = make_type("Widget");
	let entry = registry.entry(&ty);

	let type_level = upcast(TestStrategy::plain("type"));
	entry.set_strategy(Some(Arc::clone(&type_level)));

	let instance = make_instance(9);
	let override_strategy = upcast(TestStrategy::plain("override"));
	entry.set_per_instance_strategy(&instance, Some(Arc::clone(&override_strategy)));
	assert!(entry.has_per_instance_overrides());

	let resolved = entry.resolve_for_instance(&instance).unwrap().expect("override");
	assert!(Arc::ptr_eq(&resolved, &override_strategy));

	let other = make_instance(10);
	let resolved = entry.resolve_for_instance(&other).unwrap().expect("type strategy");
	assert!(Arc::ptr_eq(&resolved, &type_level), "unrelated instances see the type strategy");

	entry.set_per_instance_strategy(&instance, None);
	let resolved = entry.resolve_for_instance(&instance).unwrap().expect("fallback");
	assert!(Arc::ptr_eq(&resolved, &type_level));
	assert!(entry.has_per_instance_overrides(), "the map stays once created");
}

/// A reclaimed instance no longer resolves to its override.
#[test]
fn test_override_dies_with_its_instance() {
	let (_host, registry) = harness();
	let ty = make_type("Widget");
	let entry = registry.entry(&ty);
	let type_level = upcast(TestStrategy::plain("type"));
	entry.set_strategy(Some(Arc::clone(&type_level)));

	let instance = make_instance(1);
	entry.set_per_instance_strategy(&instance, Some(upcast(TestStrategy::plain("override"))));
	drop(instance);

	let fresh = make_instance(1);
	assert!(entry.per_instance_strategy(&fresh).is_none());
	let resolved = entry.resolve_for_instance(&fresh).unwrap().expect("type strategy");
	assert!(Arc::ptr_eq(&resolved, &type_level));
}

/// The slot walks Empty -> WeakDefault -> StrongInstalled -> Empty ->
/// WeakDefault; the factory runs once per gap.
#[test]
fn test_state_machine_cycle() {
	let (host, registry) = harness();
	let ty = make_type("Widget");
	let entry = registry.entry(&ty);

	let first = entry.resolve_strategy().unwrap().expect("published default");
	assert!(entry.default_strategy().is_some());
	assert_eq!(host.strategies_created.load(Ordering::SeqCst), 1);

	entry.set_strategy(Some(upcast(TestStrategy::plain("installed"))));
	assert!(entry.strong_strategy().is_some());

	entry.set_strategy(None);
	assert!(entry.current_strategy().is_none());

	let second = entry.resolve_strategy().unwrap().expect("fresh default");
	assert_eq!(host.strategies_created.load(Ordering::SeqCst), 2);
	assert!(!Arc::ptr_eq(&first, &second));
}

/// The installed-extensible accessor mirrors the strong slot only.
#[test]
fn test_extensible_strategy_accessor() {
	let (_host, registry) = harness();
	let ty = make_type("Widget");
	let entry = registry.entry(&ty);

	entry.set_strategy(Some(upcast(TestStrategy::plain("plain"))));
	assert!(entry.extensible_strategy().is_none());

	let ext = TestStrategy::extensible("ext");
	entry.set_strategy(Some(upcast(Arc::clone(&ext))));
	let found = entry.extensible_strategy().expect("extensible installed");
	assert!(Arc::ptr_eq(&found, &upcast(ext)));
}

/// Turning the global extensible mode on does not disturb the lock-free
/// cached read, but the locked per-instance path replaces a live plain
/// default with a freshly constructed extensible one.
#[test]
fn test_extensible_mode_replaces_plain_default() {
	let (host, registry) = harness();
	let ty = make_type("Widget");
	let entry = registry.entry(&ty);

	let plain_default = entry.resolve_strategy().unwrap().expect("default");
	assert_eq!(host.strategies_created.load(Ordering::SeqCst), 1);

	host.extensible_mode.store(true, Ordering::SeqCst);
	host.create_extensible.store(true, Ordering::SeqCst);

	let cached = entry.resolve_strategy().unwrap().expect("cached");
	assert!(
		Arc::ptr_eq(&cached, &plain_default),
		"the cheap read keeps returning the cached default"
	);
	assert_eq!(host.strategies_created.load(Ordering::SeqCst), 1);

	let instance = make_instance(3);
	let replacement = entry.resolve_for_instance(&instance).unwrap().expect("replacement");
	assert_eq!(host.strategies_created.load(Ordering::SeqCst), 2);
	assert!(!Arc::ptr_eq(&plain_default, &replacement));
	assert!(replacement.is_extensible());

	let reused = entry.resolve_strategy().unwrap().expect("extensible default reused");
	assert!(Arc::ptr_eq(&reused, &replacement));
	assert_eq!(host.strategies_created.load(Ordering::SeqCst), 2);
}
