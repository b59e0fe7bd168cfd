//! Global tracking of entries holding extensible strategies.
//!
//! # Role
//!
//! The tracker remembers, identity-weakly and in insertion order, every
//! entry whose installed strong strategy is extensible, so a host
//! reconfiguration can reset them all at once.
//!
//! # Invariants
//!
//! - An entry is tracked iff its current strong strategy is extensible;
//!   [`crate::entry::Entry::set_strategy`] and
//!   [`crate::entry::Entry::set_default_strategy`] maintain membership.
//! - `bulk_reset` snapshots the list and applies outside the lock, so
//!   entries tracked concurrently with a reset land in the fresh list and
//!   survive it.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::entry::Entry;

/// Insertion-ordered weak list of entries in extensible state.
#[derive(Default)]
pub struct ExtensionTracker {
	entries: Mutex<Vec<Weak<Entry>>>,
}

impl ExtensionTracker {
	pub fn new() -> Self {
		Self::default()
	}

	pub(crate) fn insert(&self, entry: Weak<Entry>) {
		let mut entries = self.entries.lock();
		entries.retain(|tracked| tracked.strong_count() > 0);
		entries.push(entry);
	}

	pub(crate) fn remove(&self, entry: &Entry) {
		let target = std::ptr::from_ref(entry);
		self.entries
			.lock()
			.retain(|tracked| !std::ptr::eq(tracked.as_ptr(), target) && tracked.strong_count() > 0);
	}

	/// True while `entry` is tracked.
	pub fn contains(&self, entry: &Entry) -> bool {
		let target = std::ptr::from_ref(entry);
		self.entries
			.lock()
			.iter()
			.any(|tracked| std::ptr::eq(tracked.as_ptr(), target) && tracked.strong_count() > 0)
	}

	/// Live tracked entries in insertion order.
	pub fn tracked(&self) -> Vec<Arc<Entry>> {
		self.entries.lock().iter().filter_map(Weak::upgrade).collect()
	}

	/// Number of live tracked entries.
	pub fn len(&self) -> usize {
		self.entries
			.lock()
			.iter()
			.filter(|tracked| tracked.strong_count() > 0)
			.count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Empties the tracker and clears every tracked entry's strong
	/// strategy. Snapshot-then-apply: the list is detached under the lock,
	/// then each entry is cleared without it, skipping the redundant
	/// per-entry tracker removal that iteration already performed.
	pub fn bulk_reset(&self) {
		let snapshot = std::mem::take(&mut *self.entries.lock());
		let mut cleared = 0usize;
		for entry in snapshot.iter().filter_map(Weak::upgrade) {
			entry.clear_strategy_untracked();
			cleared += 1;
		}
		tracing::debug!(cleared, "reset extensible dispatch strategies");
	}
}
