//! Reclaimable references.
//!
//! # Role
//!
//! A [`ManagedRef`] points at a shared value without necessarily keeping it
//! alive. Containers that hold one must treat "referent already reclaimed"
//! as a normal state, never an error.
//!
//! Three strength classes exist:
//!
//! - [`Strength::Strong`] — an ordinary owned reference, wrapped only so
//!   it can be cleared through the same surface.
//! - [`Strength::Soft`] — pressure-resilient: the value is retained until
//!   an explicit [`ManagedRef::clear`] or a memory-pressure release. It is
//!   never dropped by ordinary cache activity.
//! - [`Strength::Weak`] — identity-weak: the value is reachable only while
//!   some other owner keeps it alive.
//!
//! There is no collector notification queue to drain; owning containers
//! probe liveness and sweep dead slots amortized during their own
//! mutations (see `registry::Shard`).

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

/// Reference-strength policy for a [`ManagedRef`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strength {
	/// Owned; released only by an explicit clear.
	Strong,
	/// Retained until explicitly cleared or released under memory pressure.
	Soft,
	/// Cleared whenever the referent becomes otherwise unreachable.
	Weak,
}

enum RefSlot<T: ?Sized> {
	Owned(Arc<T>),
	Weak(Weak<T>),
	Cleared,
}

/// A clearable reference with a configured [`Strength`].
pub struct ManagedRef<T: ?Sized> {
	strength: Strength,
	slot: RwLock<RefSlot<T>>,
}

impl<T: ?Sized> ManagedRef<T> {
	/// Wraps `value` with the given strength.
	pub fn new(strength: Strength, value: &Arc<T>) -> Self {
		let slot = match strength {
			Strength::Strong | Strength::Soft => RefSlot::Owned(Arc::clone(value)),
			Strength::Weak => RefSlot::Weak(Arc::downgrade(value)),
		};
		Self {
			strength,
			slot: RwLock::new(slot),
		}
	}

	/// Returns the referent, or `None` once reclaimed or cleared.
	pub fn get(&self) -> Option<Arc<T>> {
		match &*self.slot.read() {
			RefSlot::Owned(value) => Some(Arc::clone(value)),
			RefSlot::Weak(value) => value.upgrade(),
			RefSlot::Cleared => None,
		}
	}

	/// Returns the configured strength.
	pub fn strength(&self) -> Strength {
		self.strength
	}

	/// True once the referent is unreachable through this reference.
	pub fn is_dead(&self) -> bool {
		match &*self.slot.read() {
			RefSlot::Owned(_) => false,
			RefSlot::Weak(value) => value.strong_count() == 0,
			RefSlot::Cleared => true,
		}
	}

	/// Forces absence and releases the underlying tracking, regardless of
	/// who created the referent.
	pub fn clear(&self) {
		*self.slot.write() = RefSlot::Cleared;
	}

	/// Clears soft references. Strong references ignore pressure; weak
	/// references are governed by their referent's lifetime.
	pub fn release_pressure(&self) {
		if self.strength == Strength::Soft {
			self.clear();
		}
	}
}
