//! Governance events decoded from token and governor logs.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// A delegate's voting power changed.
///
/// Only the latest event per delegate is authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceEvent {
    pub delegate: Address,
    /// New voting power in the token's smallest unit.
    pub new_balance: U256,
}

/// A delegator moved its voting power between delegates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationEvent {
    pub delegator: Address,
    /// `None` when the delegator had no prior delegate.
    pub from_delegate: Option<Address>,
    /// `None` when the delegator undelegated.
    pub to_delegate: Option<Address>,
}

/// A vote cast on a governance proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteEvent {
    pub voter: Address,
    pub proposal_id: U256,
    pub support: Support,
    /// Vote weight in the token's smallest unit.
    pub votes: U256,
}

/// Vote choice.
///
/// Boolean-style governors only ever emit `Against` (0) or `For` (1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Support {
    Against,
    For,
    Abstain,
}

impl Support {
    /// Map the on-chain support value to a choice.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Support::Against),
            1 => Some(Support::For),
            2 => Some(Support::Abstain),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Support::Against => "against",
            Support::For => "for",
            Support::Abstain => "abstain",
        }
    }
}
