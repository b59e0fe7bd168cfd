//! Sharded concurrent registry keyed by type identity.
//!
//! # Role
//!
//! The registry hands out the unique [`Entry`] for each live type,
//! creating it on first observation. Shard locks guard only entry
//! creation and removal; strategy reads never touch them.
//!
//! # Invariants
//!
//! - Exactly one live entry exists per live type; concurrent callers for
//!   the same type never observe two distinct entries.
//! - Entries whose type has been reclaimed are swept amortized during
//!   shard mutations and are finalized before they are dropped, so no
//!   secondary structure retains their caches.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHasher};

use crate::entry::Entry;
use crate::error::RegistryError;
use crate::host::{HostContext, InstanceRef, StrategyRef, TypeRef, identity};
use crate::tracker::ExtensionTracker;

/// Mutations on a shard between amortized purges of dead slots.
const PURGE_INTERVAL: u32 = 64;

/// Registry construction parameters.
#[derive(Clone, Copy, Debug)]
pub struct RegistryConfig {
	/// Number of lock stripes; must be a non-zero power of two.
	pub shards: usize,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self { shards: 16 }
	}
}

#[derive(Default)]
struct ShardState {
	slots: FxHashMap<usize, Arc<Entry>>,
	ops: u32,
}

impl ShardState {
	/// Counts one mutation and purges dead slots once the interval is hit.
	fn tick(&mut self) {
		self.ops += 1;
		if self.ops >= PURGE_INTERVAL {
			self.ops = 0;
			self.purge();
		}
	}

	fn purge(&mut self) {
		let before = self.slots.len();
		self.slots.retain(|_, entry| {
			if entry.is_live() {
				true
			} else {
				entry.finalize();
				false
			}
		});
		let swept = before - self.slots.len();
		if swept > 0 {
			tracing::trace!(swept, "swept dead registry slots");
		}
	}
}

#[derive(Default)]
struct Shard {
	state: Mutex<ShardState>,
}

/// Concurrent per-type metadata registry.
pub struct Registry {
	shards: Box<[Shard]>,
	mask: u64,
	cx: Arc<HostContext>,
	tracker: Arc<ExtensionTracker>,
}

impl Registry {
	/// Creates a registry with the default shard layout.
	pub fn new(host: HostContext) -> Self {
		match Self::with_config(RegistryConfig::default(), host) {
			Ok(registry) => registry,
			Err(_) => unreachable!("default registry config is valid"),
		}
	}

	/// Creates a registry with an explicit configuration. Rejecting a bad
	/// shard count here is fatal and never deferred.
	pub fn with_config(config: RegistryConfig, host: HostContext) -> Result<Self, RegistryError> {
		if config.shards == 0 || !config.shards.is_power_of_two() {
			return Err(RegistryError::ShardCount { got: config.shards });
		}
		let shards: Box<[Shard]> = (0..config.shards).map(|_| Shard::default()).collect();
		Ok(Self {
			mask: shards.len() as u64 - 1,
			shards,
			cx: Arc::new(host),
			tracker: Arc::new(ExtensionTracker::new()),
		})
	}

	/// The tracker of entries currently in extensible state.
	pub fn tracker(&self) -> &ExtensionTracker {
		&self.tracker
	}

	fn shard_for(&self, hash: u64) -> &Shard {
		&self.shards[(hash & self.mask) as usize]
	}

	/// Returns the unique entry for `ty`, creating it on first
	/// observation. A slot whose previous type died and whose address was
	/// reused is finalized and replaced in place.
	pub fn entry(&self, ty: &TypeRef) -> Arc<Entry> {
		let addr = identity(ty);
		let hash = identity_hash(addr);
		let mut state = self.shard_for(hash).state.lock();
		state.tick();

		if let Some(existing) = state.slots.get(&addr) {
			if existing.matches(ty) {
				return Arc::clone(existing);
			}
			existing.finalize();
		}

		let created = Entry::new(ty, hash, Arc::clone(&self.cx), Arc::clone(&self.tracker));
		state.slots.insert(addr, Arc::clone(&created));
		tracing::trace!(ty = %ty.name(), "created registry entry");
		created
	}

	/// Administrative eviction of the entry for `ty`; idempotent on
	/// absence.
	pub fn remove(&self, ty: &TypeRef) {
		let addr = identity(ty);
		let hash = identity_hash(addr);
		let mut state = self.shard_for(hash).state.lock();
		state.tick();
		if let Some(removed) = state.slots.remove(&addr) {
			removed.finalize();
			tracing::trace!(ty = %ty.name(), "removed registry entry");
		}
	}

	/// Number of live entries across all shards.
	pub fn size(&self) -> usize {
		self.shards
			.iter()
			.map(|shard| {
				shard
					.state
					.lock()
					.slots
					.values()
					.filter(|entry| entry.is_live())
					.count()
			})
			.sum()
	}

	/// Live entries plus dead ones pending reclamation. Diagnostics only.
	pub fn full_size(&self) -> usize {
		self.shards.iter().map(|shard| shard.state.lock().slots.len()).sum()
	}

	/// Explicit full reclamation pass over every shard.
	pub fn sweep(&self) {
		for shard in &self.shards {
			shard.state.lock().purge();
		}
	}

	/// Host memory-pressure signal: drops every entry's pressure-resilient
	/// descriptor and loader caches. Strategies are untouched.
	pub fn release_caches(&self) {
		for shard in &self.shards {
			let state = shard.state.lock();
			for entry in state.slots.values() {
				entry.release_caches();
			}
		}
		tracing::debug!("released soft metadata caches");
	}

	/// Dispatch-time convenience: the effective strategy for `ty`.
	pub fn resolve(&self, ty: &TypeRef) -> Result<Option<StrategyRef>, RegistryError> {
		self.entry(ty).resolve_strategy()
	}

	/// Dispatch-time convenience: the effective strategy for one instance
	/// of `ty`, honoring per-instance overrides.
	pub fn resolve_for_instance(
		&self,
		ty: &TypeRef,
		instance: &InstanceRef,
	) -> Result<Option<StrategyRef>, RegistryError> {
		self.entry(ty).resolve_for_instance(instance)
	}
}

fn identity_hash(addr: usize) -> u64 {
	let mut hasher = FxHasher::default();
	addr.hash(&mut hasher);
	hasher.finish()
}
