//! Delegate aggregation for governance snapshots.
//!
//! Turns the three governance event streams into delegate records:
//! [`aggregate`] is the pure fold over events, [`enrich`] attaches primary
//! names to delegates and delegators concurrently.

pub mod aggregate;
pub mod enrich;
pub mod scale;

pub use aggregate::{aggregate, AggregatedDelegate, EventSets};
pub use enrich::{enrich, Enrichment};
pub use scale::TokenScale;

use alloy::primitives::U256;

/// Error type for aggregation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    #[error("Token decimals {0} exceed the supported maximum of {}", TokenScale::MAX_DECIMALS)]
    UnsupportedDecimals(u32),
    #[error("Amount {0} does not fit the decimal representation")]
    AmountOutOfRange(U256),
}
