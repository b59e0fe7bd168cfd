//! Per-type metadata record and dispatch strategy resolution.
//!
//! # Role
//!
//! An [`Entry`] carries everything the runtime wants to remember about one
//! live type: the lazily derived descriptor and artifact loader, the
//! current dispatch strategy, per-instance strategy overrides, and a
//! version counter consumed by downstream caches.
//!
//! # Invariants
//!
//! - The entry never keeps its type alive; the key is identity-weak.
//! - At most one of {strong strategy, default strategy} is populated at a
//!   time; the slot swap enforces this structurally.
//! - `version` never decreases. Every strategy or override mutation bumps
//!   it; cache-hit reads and first-time lazy descriptor/loader reads do
//!   not.
//! - The entry lock guards only the slow-path construction of a default
//!   strategy. The cached read path is lock-free.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::error::RegistryError;
use crate::host::{
	ArtifactLoader, HostContext, InstanceRef, StrategyRef, TypeDescriptor, TypeRef, identity,
};
use crate::lazy::LazyCell;
use crate::reclaim::{ManagedRef, Strength};
use crate::tracker::ExtensionTracker;

/// The one populated strategy holder; installing either variant displaces
/// the other.
enum StrategySlot {
	/// Explicitly installed or extensible strategy, owned by the entry.
	Strong(StrategyRef),
	/// Implicitly created default strategy, held identity-weak.
	Default(ManagedRef<dyn crate::host::DispatchStrategy>),
}

/// Per-instance strategy override, guarded by the instance's liveness.
struct OverrideSlot {
	instance: ManagedRef<dyn Any + Send + Sync>,
	strategy: StrategyRef,
}

type OverrideMap = FxHashMap<usize, OverrideSlot>;

/// Per-type metadata record owned by the registry.
pub struct Entry {
	key: ManagedRef<dyn crate::host::RuntimeType>,
	hash: u64,
	version: AtomicU64,
	descriptor: LazyCell<dyn TypeDescriptor>,
	loader: LazyCell<dyn ArtifactLoader>,
	strategy: ArcSwapOption<StrategySlot>,
	/// Lazily created on the first override; `None` means no per-instance
	/// overrides have ever existed for this type.
	overrides: RwLock<Option<OverrideMap>>,
	/// Guards only the strategy slow path; see module invariants.
	lock: Mutex<()>,
	cx: Arc<HostContext>,
	tracker: Arc<ExtensionTracker>,
	self_ref: Weak<Entry>,
}

impl Entry {
	pub(crate) fn new(
		ty: &TypeRef,
		hash: u64,
		cx: Arc<HostContext>,
		tracker: Arc<ExtensionTracker>,
	) -> Arc<Self> {
		Arc::new_cyclic(|self_ref| Self {
			key: ManagedRef::new(Strength::Weak, ty),
			hash,
			version: AtomicU64::new(0),
			descriptor: LazyCell::new(Strength::Soft),
			loader: LazyCell::new(Strength::Soft),
			strategy: ArcSwapOption::empty(),
			overrides: RwLock::new(None),
			lock: Mutex::new(()),
			cx,
			tracker,
			self_ref: self_ref.clone(),
		})
	}

	/// The owning type, or `None` once it has been reclaimed.
	pub fn key(&self) -> Option<TypeRef> {
		self.key.get()
	}

	/// Precomputed identity hash of the key, fixed for the entry's life.
	#[inline]
	pub fn hash(&self) -> u64 {
		self.hash
	}

	/// True while the owning type is reachable.
	pub fn is_live(&self) -> bool {
		!self.key.is_dead()
	}

	pub(crate) fn matches(&self, ty: &TypeRef) -> bool {
		self.key.get().is_some_and(|key| Arc::ptr_eq(&key, ty))
	}

	/// Change counter consumed by downstream caches for staleness checks.
	#[inline]
	pub fn version(&self) -> u64 {
		self.version.load(Ordering::Acquire)
	}

	/// Bumps the change counter. Exposed for collaborators that mutate
	/// strategy internals without going through the setters.
	pub fn bump_version(&self) {
		self.version.fetch_add(1, Ordering::AcqRel);
	}

	/// The derived type descriptor, computed on first use and cached
	/// pressure-resiliently. Absent only once the type is reclaimed.
	pub fn type_descriptor(&self) -> Option<Arc<dyn TypeDescriptor>> {
		self.descriptor.get_or_init(|| {
			let this = self.self_ref.upgrade()?;
			let ty = self.key.get()?;
			Some(self.cx.descriptors.create_descriptor(&ty, &this))
		})
	}

	/// The artifact loader scoped to this type, cached like the
	/// descriptor and independent of it.
	pub fn artifact_loader(&self) -> Option<Arc<dyn ArtifactLoader>> {
		self.loader.get_or_init(|| {
			let ty = self.key.get()?;
			Some(self.cx.loaders.create_loader(&ty))
		})
	}

	/// The effective strategy if one is cached: the strong strategy, else
	/// the default strategy if not yet reclaimed. Lock-free.
	#[inline]
	pub fn current_strategy(&self) -> Option<StrategyRef> {
		match self.strategy.load().as_deref() {
			Some(StrategySlot::Strong(strategy)) => Some(Arc::clone(strategy)),
			Some(StrategySlot::Default(cached)) => cached.get(),
			None => None,
		}
	}

	/// The explicitly installed strategy, if any.
	pub fn strong_strategy(&self) -> Option<StrategyRef> {
		match self.strategy.load().as_deref() {
			Some(StrategySlot::Strong(strategy)) => Some(Arc::clone(strategy)),
			_ => None,
		}
	}

	/// The implicitly created default strategy, if cached and still live.
	pub fn default_strategy(&self) -> Option<StrategyRef> {
		match self.strategy.load().as_deref() {
			Some(StrategySlot::Default(cached)) => cached.get(),
			_ => None,
		}
	}

	/// The installed strong strategy iff it is extensible.
	pub fn extensible_strategy(&self) -> Option<StrategyRef> {
		self.strong_strategy().filter(|s| s.is_extensible())
	}

	/// Installs `strategy` as the strong strategy, displacing any default
	/// strategy; `None` clears the slot entirely. Tracker membership
	/// follows the extensibility of the outgoing and incoming values.
	pub fn set_strategy(&self, strategy: Option<StrategyRef>) {
		self.bump_version();

		let slot = strategy
			.as_ref()
			.map(|s| Arc::new(StrategySlot::Strong(Arc::clone(s))));
		let previous = self.strategy.swap(slot);

		self.untrack_displaced(previous.as_deref());

		if let Some(installed) = strategy
			&& installed.is_extensible()
		{
			installed.set_registered(true);
			self.tracker.insert(self.self_ref.clone());
			tracing::trace!(version = self.version(), "installed extensible strategy");
		}
	}

	/// Caches `strategy` identity-weak as the default strategy, displacing
	/// any strong strategy; `None` clears the slot entirely.
	pub fn set_default_strategy(&self, strategy: Option<StrategyRef>) {
		self.bump_version();

		let slot = strategy
			.as_ref()
			.map(|s| Arc::new(StrategySlot::Default(ManagedRef::new(Strength::Weak, s))));
		let previous = self.strategy.swap(slot);

		self.untrack_displaced(previous.as_deref());
	}

	fn untrack_displaced(&self, previous: Option<&StrategySlot>) {
		if let Some(StrategySlot::Strong(old)) = previous
			&& old.is_extensible()
		{
			old.set_registered(false);
			self.tracker.remove(self);
		}
	}

	/// Clears the strategy slot during [`ExtensionTracker::bulk_reset`],
	/// which already drives tracker removal through its own iteration.
	pub(crate) fn clear_strategy_untracked(&self) {
		self.bump_version();
		if let Some(StrategySlot::Strong(old)) = self.strategy.swap(None).as_deref()
			&& old.is_extensible()
		{
			old.set_registered(false);
		}
	}

	/// Resolves the effective strategy for this type, constructing and
	/// publishing a default through the host factory on a cache gap.
	///
	/// Returns `Ok(None)` only once the type has been reclaimed. Factory
	/// failures propagate without publishing partial state.
	pub fn resolve_strategy(&self) -> Result<Option<StrategyRef>, RegistryError> {
		if let Some(found) = self.current_strategy() {
			return Ok(Some(found));
		}
		let _guard = self.lock.lock();
		self.resolve_locked()
	}

	/// Resolves the effective strategy for one instance: the per-instance
	/// override when present, else the type-level strategy.
	pub fn resolve_for_instance(
		&self,
		instance: &InstanceRef,
	) -> Result<Option<StrategyRef>, RegistryError> {
		if let Some(found) = self.per_instance_strategy(instance) {
			return Ok(Some(found));
		}
		let _guard = self.lock.lock();
		self.resolve_locked()
	}

	fn resolve_locked(&self) -> Result<Option<StrategyRef>, RegistryError> {
		if let Some(found) = self.strong_strategy() {
			return Ok(Some(found));
		}

		let cached = self.default_strategy();
		let extensible_mode = self.cx.config.extensible_mode_enabled();
		// A cached default is reused as-is unless the host now wants
		// extensible strategies everywhere and this one is not.
		if let Some(cached) = cached
			&& (!extensible_mode || cached.is_extensible())
		{
			return Ok(Some(cached));
		}

		let Some(ty) = self.key.get() else {
			return Ok(None);
		};
		let Some(this) = self.self_ref.upgrade() else {
			return Ok(None);
		};

		let strategy = self
			.cx
			.strategies
			.create(&ty, &this)
			.map_err(|source| RegistryError::StrategyFactory {
				type_name: ty.name().to_owned(),
				source,
			})?;
		self.cx
			.strategies
			.initialize(&strategy)
			.map_err(|source| RegistryError::StrategyFactory {
				type_name: ty.name().to_owned(),
				source,
			})?;

		if self.cx.config.retain_strategies_strongly() {
			self.set_strategy(Some(Arc::clone(&strategy)));
		} else {
			self.set_default_strategy(Some(Arc::clone(&strategy)));
		}
		tracing::trace!(ty = %ty.name(), "published default dispatch strategy");
		Ok(Some(strategy))
	}

	/// The override installed for `instance`, if any and still live.
	pub fn per_instance_strategy(&self, instance: &InstanceRef) -> Option<StrategyRef> {
		let guard = self.overrides.read();
		let slot = guard.as_ref()?.get(&identity(instance))?;
		// An upgradeable guard proves the slot still belongs to this
		// allocation; a dead guard means the address may have been reused.
		slot.instance.get()?;
		Some(Arc::clone(&slot.strategy))
	}

	/// Installs or removes (`None`) a strategy override for `instance`.
	/// Dead overrides are swept while the map is already locked.
	pub fn set_per_instance_strategy(&self, instance: &InstanceRef, strategy: Option<StrategyRef>) {
		self.bump_version();

		let mut guard = self.overrides.write();
		match strategy {
			Some(strategy) => {
				let map = guard.get_or_insert_with(OverrideMap::default);
				map.retain(|_, slot| !slot.instance.is_dead());
				map.insert(
					identity(instance),
					OverrideSlot {
						instance: ManagedRef::new(Strength::Weak, instance),
						strategy,
					},
				);
			}
			None => {
				if let Some(map) = guard.as_mut() {
					map.remove(&identity(instance));
					map.retain(|_, slot| !slot.instance.is_dead());
				}
			}
		}
	}

	/// True once any per-instance override has been installed for this
	/// type, even if all have since been removed.
	pub fn has_per_instance_overrides(&self) -> bool {
		self.overrides.read().is_some()
	}

	/// Teardown run by the reaper before the entry leaves its shard:
	/// releases the strategy, descriptor, and loader so no secondary
	/// structure outlives the entry.
	pub(crate) fn finalize(&self) {
		self.set_strategy(None);
		self.descriptor.clear();
		self.loader.clear();
	}

	/// Drops pressure-resilient caches in response to a host memory
	/// pressure signal.
	pub(crate) fn release_caches(&self) {
		self.descriptor.release_pressure();
		self.loader.release_pressure();
	}
}

impl fmt::Debug for Entry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Entry")
			.field("type", &self.key.get().map(|ty| ty.name().to_owned()))
			.field("version", &self.version())
			.field("live", &self.is_live())
			.finish_non_exhaustive()
	}
}
