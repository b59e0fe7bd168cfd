//! Registry error taxonomy.
//!
//! Internal races and reclaimed references are absorbed by the core and
//! surface as absence values; only construction-time configuration errors
//! and collaborator failures cross this boundary.

/// Failure reported by a host collaborator (strategy factory).
pub type FactoryError = Box<dyn std::error::Error + Send + Sync>;

/// Errors crossing the registry boundary.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
	/// Shard configuration rejected at registry construction.
	#[error("invalid shard count {got}: must be a non-zero power of two")]
	ShardCount { got: usize },

	/// The strategy factory failed; nothing was published and the next
	/// resolve retries construction from scratch.
	#[error("dispatch strategy construction failed for `{type_name}`")]
	StrategyFactory {
		type_name: String,
		#[source]
		source: FactoryError,
	},
}
