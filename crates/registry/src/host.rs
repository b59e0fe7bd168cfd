//! Collaborator contracts consumed by the registry core.
//!
//! The registry never inspects the structure of a type, a descriptor, a
//! loader, or a strategy; it only caches them per type and coordinates
//! their creation. Everything behind these traits belongs to the host
//! runtime.

use std::any::Any;
use std::sync::Arc;

use crate::entry::Entry;
use crate::error::FactoryError;

/// The host runtime's representation of a type.
///
/// Identity, not equality, keys the registry: two `TypeRef`s name the same
/// type only when they point at the same allocation.
pub trait RuntimeType: Send + Sync + 'static {
	/// Host-facing name, used for diagnostics and error context.
	fn name(&self) -> &str;
}

/// Shared handle to a live type object.
pub type TypeRef = Arc<dyn RuntimeType>;

/// Shared handle to a live instance, keyed by identity in override maps.
pub type InstanceRef = Arc<dyn Any + Send + Sync>;

/// Method-resolution policy consulted when dispatching operations on
/// instances of a type.
pub trait DispatchStrategy: Send + Sync + 'static {
	/// Whether this strategy's method set can be mutated after creation.
	///
	/// Extensible strategies are retained strongly and tracked globally so
	/// they can be bulk-reset.
	fn is_extensible(&self) -> bool {
		false
	}

	/// Registration mark maintained by the registry while an extensible
	/// strategy is installed as a type's strong strategy.
	fn set_registered(&self, _registered: bool) {}
}

/// Shared handle to a dispatch strategy.
pub type StrategyRef = Arc<dyn DispatchStrategy>;

/// Derived reflective descriptor for a type. Opaque to the registry.
pub trait TypeDescriptor: Send + Sync + 'static {}

/// Artifact loader scoped to a type. Opaque to the registry.
pub trait ArtifactLoader: Send + Sync + 'static {}

/// Builds dispatch strategies for types that have none cached.
///
/// Both methods are called at most once per entry per cache gap, under that
/// entry's lock. Neither may call back into the same entry's resolve or set
/// paths; doing so deadlocks on the entry lock.
pub trait StrategyFactory: Send + Sync + 'static {
	/// Constructs a strategy for `ty`. The entry is the per-type registry
	/// context; implementations may retain it.
	fn create(&self, ty: &TypeRef, entry: &Arc<Entry>) -> Result<StrategyRef, FactoryError>;

	/// Finishes construction before the strategy is published.
	fn initialize(&self, _strategy: &StrategyRef) -> Result<(), FactoryError> {
		Ok(())
	}
}

/// Builds the reflective descriptor for a type.
pub trait DescriptorFactory: Send + Sync + 'static {
	fn create_descriptor(&self, ty: &TypeRef, entry: &Arc<Entry>) -> Arc<dyn TypeDescriptor>;
}

/// Builds the artifact loader for a type.
pub trait LoaderFactory: Send + Sync + 'static {
	fn create_loader(&self, ty: &TypeRef) -> Arc<dyn ArtifactLoader>;
}

/// Host flags read on the strategy slow path.
pub trait RuntimeConfig: Send + Sync + 'static {
	/// When true, lazily constructed default strategies are retained
	/// strongly instead of behind a reclaimable reference.
	fn retain_strategies_strongly(&self) -> bool;

	/// When true, every type is expected to carry an extensible strategy;
	/// a cached non-extensible default is replaced on the next resolve.
	fn extensible_mode_enabled(&self) -> bool;
}

/// Bundle of collaborators handed to [`crate::registry::Registry::new`].
pub struct HostContext {
	pub strategies: Arc<dyn StrategyFactory>,
	pub descriptors: Arc<dyn DescriptorFactory>,
	pub loaders: Arc<dyn LoaderFactory>,
	pub config: Arc<dyn RuntimeConfig>,
}

/// Identity address of a shared handle. Metadata is discarded so fat
/// pointers to the same allocation agree.
#[inline]
pub(crate) fn identity<T: ?Sized>(value: &Arc<T>) -> usize {
	Arc::as_ptr(value).cast::<()>() as usize
}
