//! Persisted snapshot layout.
//!
//! Field names are camelCase on the wire; downstream consumers read
//! `blockNumber`, `votingPower`, `ensName` and `proposalId` verbatim.
//! Token amounts and proposal ids are written as JSON numbers carrying
//! every digit.

use alloy::primitives::U256;
use govsnap_chain::Support;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Discriminator of the delegate snapshot record.
pub const DELEGATES_FIELD: &str = "delegates";

/// Full delegate snapshot at a block height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub field: String,
    pub block_number: u64,
    /// Epoch milliseconds at which the snapshot was assembled.
    pub timestamp: i64,
    /// Delegate records keyed by checksummed address.
    pub data: BTreeMap<String, DelegateRecord>,
}

/// A delegate and everything attributed to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateRecord {
    pub address: String,
    /// Voting power in whole tokens.
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub voting_power: Decimal,
    pub ens_name: Option<String>,
    pub delegators: Vec<Delegator>,
    /// Votes in emission order.
    pub votes: Vec<Vote>,
}

/// An address currently delegating to a delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delegator {
    pub address: String,
    pub ens_name: Option<String>,
}

/// A vote cast by a delegate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    #[serde(with = "proposal_id")]
    pub proposal_id: U256,
    pub support: Support,
    /// Vote weight in whole tokens.
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub votes: Decimal,
}

impl Snapshot {
    /// Number of delegates in the snapshot.
    pub fn delegate_count(&self) -> usize {
        self.data.len()
    }
}

/// Proposal ids are hashes on most governors, so they keep all 256 bits.
mod proposal_id {
    use alloy::primitives::U256;
    use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Number;
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(id: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        Number::from_str(&id.to_string())
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let number = Number::deserialize(deserializer)?;
        U256::from_str(&number.to_string()).map_err(de::Error::custom)
    }
}
