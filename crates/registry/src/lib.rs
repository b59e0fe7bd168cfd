//! Concurrent, memory-aware per-type metadata registry.
//!
//! For every type the host runtime observes, the registry lazily computes
//! and caches a reflective type descriptor, an artifact loader, and a
//! mutable dispatch strategy, without ever extending the type's lifetime.
//! Strategy reads sit on the method-dispatch hot path and are lock-free;
//! construction of missing values is coordinated per entry so each factory
//! runs at most once per cache gap.
//!
//! # Modules
//!
//! - [`registry`] - sharded identity-keyed table handing out [`Entry`]s
//! - [`entry`] - per-type record: caches, strategy slot, version counter
//! - [`tracker`] - global list of entries holding extensible strategies
//! - [`lazy`] / [`reclaim`] - memoized cells and reclaimable references
//! - [`host`] - collaborator contracts implemented by the host runtime
//!
//! The registry and tracker are explicitly constructed, injectable
//! objects; nothing here is a process-wide static.

pub mod entry;
pub mod error;
pub mod host;
pub mod lazy;
pub mod reclaim;
pub mod registry;
pub mod tracker;

#[cfg(test)]
mod tests;

pub use entry::Entry;
pub use error::{FactoryError, RegistryError};
pub use host::{
	ArtifactLoader, DescriptorFactory, DispatchStrategy, HostContext, InstanceRef, LoaderFactory,
	RuntimeConfig, RuntimeType, StrategyFactory, StrategyRef, TypeDescriptor, TypeRef,
};
pub use lazy::LazyCell;
pub use reclaim::{ManagedRef, Strength};
pub use registry::{Registry, RegistryConfig};
pub use tracker::ExtensionTracker;
