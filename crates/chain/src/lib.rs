//! Chain log source interface for governance delegate snapshots.
//!
//! This crate defines the trait that every chain data provider implements,
//! the three event families a snapshot is built from, and an in-memory
//! provider used by tests and dry runs. Aggregation and persistence depend
//! only on this interface, never on a concrete RPC client.

pub mod events;
pub mod memory;

use alloy::primitives::Address;
use async_trait::async_trait;

pub use events::{BalanceEvent, DelegationEvent, Support, VoteEvent};
pub use memory::InMemoryLogSource;

/// Block height on the source chain.
pub type BlockNumber = u64;

/// Error type for chain source operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Chain source unavailable: {0:#}")]
    Unavailable(#[from] anyhow::Error),
    #[error("Malformed {kind} log at block {block}: {reason}")]
    MalformedLog {
        kind: &'static str,
        block: BlockNumber,
        reason: String,
    },
    #[error("Name lookup failed for {address}: {reason}")]
    NameLookup { address: Address, reason: String },
}

/// Result type for chain source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Trait for chain log sources.
///
/// Implementations are expected to retry transient provider failures
/// internally; an error returned from any method means the retry budget
/// is exhausted. Each event query returns events in emission order
/// (block number, then log index) for all history up to and including
/// `to_block`.
#[async_trait]
pub trait ChainLogSource: Send + Sync {
    /// Get the current head block number.
    async fn current_height(&self) -> SourceResult<BlockNumber>;

    /// Get every delegate voting power change up to `to_block`.
    async fn balance_events(&self, to_block: BlockNumber) -> SourceResult<Vec<BalanceEvent>>;

    /// Get every delegation change up to `to_block`.
    async fn delegation_events(&self, to_block: BlockNumber) -> SourceResult<Vec<DelegationEvent>>;

    /// Get every vote cast up to `to_block`.
    async fn vote_events(&self, to_block: BlockNumber) -> SourceResult<Vec<VoteEvent>>;

    /// Resolve the primary name of an address, if it has one.
    async fn reverse_resolve(&self, address: Address) -> SourceResult<Option<String>>;
}
