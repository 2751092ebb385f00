//! In-memory chain log source.

use crate::events::{BalanceEvent, DelegationEvent, VoteEvent};
use crate::{BlockNumber, ChainLogSource, SourceError, SourceResult};
use alloy::primitives::Address;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Chain log source backed by fixed event lists.
///
/// The event lists represent the full history as of `height`, so the
/// `to_block` argument of the event queries is not used for filtering.
/// Individual operations can be switched to fail to exercise error paths.
#[derive(Debug, Default)]
pub struct InMemoryLogSource {
    height: BlockNumber,
    balances: Vec<BalanceEvent>,
    delegations: Vec<DelegationEvent>,
    votes: Vec<VoteEvent>,
    names: HashMap<Address, String>,
    failing_names: HashSet<Address>,
    unavailable: bool,
    lookups: AtomicUsize,
}

impl InMemoryLogSource {
    /// Create an empty source at the given head height.
    pub fn new(height: BlockNumber) -> Self {
        Self {
            height,
            ..Default::default()
        }
    }

    pub fn with_balances(mut self, events: Vec<BalanceEvent>) -> Self {
        self.balances = events;
        self
    }

    pub fn with_delegations(mut self, events: Vec<DelegationEvent>) -> Self {
        self.delegations = events;
        self
    }

    pub fn with_votes(mut self, events: Vec<VoteEvent>) -> Self {
        self.votes = events;
        self
    }

    /// Register a primary name for an address.
    pub fn with_name(mut self, address: Address, name: &str) -> Self {
        self.names.insert(address, name.to_string());
        self
    }

    /// Make name lookups for `address` fail.
    pub fn with_failing_name(mut self, address: Address) -> Self {
        self.failing_names.insert(address);
        self
    }

    /// Make height and event queries fail as if retries were exhausted.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Number of reverse lookups served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    fn check_available(&self) -> SourceResult<()> {
        if self.unavailable {
            return Err(SourceError::Unavailable(anyhow::anyhow!(
                "in-memory source marked unavailable"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainLogSource for InMemoryLogSource {
    async fn current_height(&self) -> SourceResult<BlockNumber> {
        self.check_available()?;
        Ok(self.height)
    }

    async fn balance_events(&self, _to_block: BlockNumber) -> SourceResult<Vec<BalanceEvent>> {
        self.check_available()?;
        Ok(self.balances.clone())
    }

    async fn delegation_events(&self, _to_block: BlockNumber) -> SourceResult<Vec<DelegationEvent>> {
        self.check_available()?;
        Ok(self.delegations.clone())
    }

    async fn vote_events(&self, _to_block: BlockNumber) -> SourceResult<Vec<VoteEvent>> {
        self.check_available()?;
        Ok(self.votes.clone())
    }

    async fn reverse_resolve(&self, address: Address) -> SourceResult<Option<String>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if self.failing_names.contains(&address) {
            return Err(SourceError::NameLookup {
                address,
                reason: "lookup failure injected".to_string(),
            });
        }
        Ok(self.names.get(&address).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;

    #[tokio::test]
    async fn test_serves_configured_events() {
        let delegate = Address::from([1; 20]);
        let source = InMemoryLogSource::new(42).with_balances(vec![BalanceEvent {
            delegate,
            new_balance: U256::from(7u64),
        }]);

        assert_eq!(source.current_height().await.unwrap(), 42);
        assert_eq!(source.balance_events(42).await.unwrap().len(), 1);
        assert!(source.delegation_events(42).await.unwrap().is_empty());
        assert!(source.vote_events(42).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_source_fails_queries() {
        let source = InMemoryLogSource::new(1).unavailable();
        assert!(matches!(
            source.current_height().await,
            Err(SourceError::Unavailable(_))
        ));
        assert!(source.balance_events(1).await.is_err());
    }

    #[tokio::test]
    async fn test_name_lookups() {
        let named = Address::from([1; 20]);
        let broken = Address::from([2; 20]);
        let source = InMemoryLogSource::new(1)
            .with_name(named, "alice.eth")
            .with_failing_name(broken);

        assert_eq!(
            source.reverse_resolve(named).await.unwrap(),
            Some("alice.eth".to_string())
        );
        assert_eq!(source.reverse_resolve(Address::ZERO).await.unwrap(), None);
        assert!(source.reverse_resolve(broken).await.is_err());
        assert_eq!(source.lookup_count(), 3);
    }
}
