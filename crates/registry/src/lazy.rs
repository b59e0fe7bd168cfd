//! Lazily memoized, clearable value cells.
//!
//! # Role
//!
//! A [`LazyCell`] computes its value at most once and caches it behind a
//! [`ManagedRef`] of the configured strength. The cell's own mutex spans
//! the initializer call, so concurrent first reads agree on a single
//! winning instance and the initializer never runs twice for one cached
//! value.
//!
//! # Invariants
//!
//! - A failed computation (`None` from the initializer) is not memoized;
//!   the next read retries from scratch.
//! - After [`LazyCell::clear`], or after a pressure release of a soft
//!   cell, the next read recomputes.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::reclaim::{ManagedRef, Strength};

/// Thread-safe once-computed value holder.
pub struct LazyCell<T: ?Sized> {
	strength: Strength,
	slot: Mutex<Option<ManagedRef<T>>>,
}

impl<T: ?Sized> LazyCell<T> {
	/// Creates an empty cell that will cache with the given strength.
	pub fn new(strength: Strength) -> Self {
		Self {
			strength,
			slot: Mutex::new(None),
		}
	}

	/// Returns the cached value, computing it through `init` if absent.
	///
	/// `init` runs under the cell lock and must not re-enter this cell.
	pub fn get_or_init(&self, init: impl FnOnce() -> Option<Arc<T>>) -> Option<Arc<T>> {
		let mut slot = self.slot.lock();
		if let Some(existing) = slot.as_ref().and_then(ManagedRef::get) {
			return Some(existing);
		}
		let value = init()?;
		*slot = Some(ManagedRef::new(self.strength, &value));
		Some(value)
	}

	/// Returns the cached value without computing.
	pub fn peek(&self) -> Option<Arc<T>> {
		self.slot.lock().as_ref().and_then(ManagedRef::get)
	}

	/// Discards the cached value and clears the underlying reference.
	pub fn clear(&self) {
		if let Some(cached) = self.slot.lock().take() {
			cached.clear();
		}
	}

	/// Drops a soft-cached value under memory pressure.
	pub fn release_pressure(&self) {
		if let Some(cached) = self.slot.lock().as_ref() {
			cached.release_pressure();
		}
	}
}
