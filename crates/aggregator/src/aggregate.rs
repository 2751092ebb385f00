//! Pure aggregation of governance events into delegates.

use crate::scale::TokenScale;
use crate::AggregateError;
use alloy::primitives::Address;
use govsnap_chain::{BalanceEvent, DelegationEvent, VoteEvent};
use govsnap_db::Vote;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};

/// The three event streams a snapshot is built from, each in emission order.
#[derive(Debug, Clone, Default)]
pub struct EventSets {
    pub balances: Vec<BalanceEvent>,
    pub delegations: Vec<DelegationEvent>,
    pub votes: Vec<VoteEvent>,
}

/// A delegate before name enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedDelegate {
    pub address: Address,
    pub voting_power: Decimal,
    /// Current delegators in order of first delegation.
    pub delegators: Vec<Address>,
    /// Votes cast by the delegate in emission order.
    pub votes: Vec<Vote>,
}

/// Build the delegate set from the three event streams.
///
/// The delegate set is exactly the addresses named by balance events, and
/// each delegate's voting power is taken from its latest balance event.
/// Delegators are the addresses that ever delegated to the delegate minus
/// the addresses that ever moved away from it; the relative order of those
/// events is not considered. The result is ordered by address.
pub fn aggregate(
    events: &EventSets,
    scale: &TokenScale,
) -> Result<Vec<AggregatedDelegate>, AggregateError> {
    let mut voting_power: BTreeMap<Address, Decimal> = BTreeMap::new();
    for event in &events.balances {
        voting_power.insert(event.delegate, scale.scale(event.new_balance)?);
    }

    let mut delegated_to: HashMap<Address, Vec<Address>> = HashMap::new();
    let mut moved_away: HashMap<Address, HashSet<Address>> = HashMap::new();
    for event in &events.delegations {
        if let Some(to) = event.to_delegate {
            delegated_to.entry(to).or_default().push(event.delegator);
        }
        if let Some(from) = event.from_delegate {
            moved_away.entry(from).or_default().insert(event.delegator);
        }
    }

    let mut votes_by_voter: HashMap<Address, Vec<&VoteEvent>> = HashMap::new();
    for event in &events.votes {
        votes_by_voter.entry(event.voter).or_default().push(event);
    }

    voting_power
        .into_iter()
        .map(|(address, voting_power)| {
            let delegators =
                current_delegators(delegated_to.get(&address), moved_away.get(&address));
            let votes = votes_by_voter
                .get(&address)
                .map(|votes| convert_votes(votes, scale))
                .transpose()?
                .unwrap_or_default();

            Ok(AggregatedDelegate {
                address,
                voting_power,
                delegators,
                votes,
            })
        })
        .collect()
}

fn current_delegators(
    delegated: Option<&Vec<Address>>,
    moved_away: Option<&HashSet<Address>>,
) -> Vec<Address> {
    let mut seen = HashSet::new();
    delegated
        .into_iter()
        .flatten()
        .copied()
        .filter(|delegator| moved_away.map_or(true, |gone| !gone.contains(delegator)))
        .filter(|delegator| seen.insert(*delegator))
        .collect()
}

fn convert_votes(votes: &[&VoteEvent], scale: &TokenScale) -> Result<Vec<Vote>, AggregateError> {
    votes
        .iter()
        .map(|event| {
            Ok(Vote {
                proposal_id: event.proposal_id,
                support: event.support,
                votes: scale.scale(event.votes)?,
            })
        })
        .collect()
}
