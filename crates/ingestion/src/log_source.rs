//! Chain log source backed by a JSON-RPC endpoint.

use crate::abi::{
    decode_balance, decode_delegation, decode_vote, event_topic, DELEGATE_CHANGED,
    DELEGATE_VOTES_CHANGED, VOTE_CAST, VOTE_CAST_WITH_REASON,
};
use crate::ens::EnsResolver;
use crate::rpc_client::RpcClient;
use alloy::primitives::Address;
use async_trait::async_trait;
use govsnap_chain::{
    BalanceEvent, BlockNumber, ChainLogSource, DelegationEvent, SourceError, SourceResult,
    VoteEvent,
};
use tracing::info;

/// Governance contracts a snapshot is taken of.
#[derive(Debug, Clone, Copy)]
pub struct GovernanceContracts {
    /// Voting token emitting delegation events.
    pub token: Address,
    /// Governor emitting vote events.
    pub governor: Address,
}

/// [`ChainLogSource`] reading token and governor logs over JSON-RPC.
pub struct RpcLogSource {
    rpc: RpcClient,
    contracts: GovernanceContracts,
    ens: EnsResolver,
}

impl RpcLogSource {
    /// Create a new RPC log source.
    ///
    /// # Arguments
    /// * `rpc` - Retrying RPC client
    /// * `contracts` - Token and governor addresses
    /// * `ens` - Resolver used for primary names
    pub fn new(rpc: RpcClient, contracts: GovernanceContracts, ens: EnsResolver) -> Self {
        Self {
            rpc,
            contracts,
            ens,
        }
    }
}

#[async_trait]
impl ChainLogSource for RpcLogSource {
    async fn current_height(&self) -> SourceResult<BlockNumber> {
        Ok(self.rpc.get_latest_block_number().await?)
    }

    async fn balance_events(&self, to_block: BlockNumber) -> SourceResult<Vec<BalanceEvent>> {
        let logs = self
            .rpc
            .get_logs(
                self.contracts.token,
                &[event_topic(DELEGATE_VOTES_CHANGED)],
                to_block,
            )
            .await?;
        info!("Fetched {} DelegateVotesChanged logs", logs.len());
        logs.iter().map(decode_balance).collect()
    }

    async fn delegation_events(&self, to_block: BlockNumber) -> SourceResult<Vec<DelegationEvent>> {
        let logs = self
            .rpc
            .get_logs(self.contracts.token, &[event_topic(DELEGATE_CHANGED)], to_block)
            .await?;
        info!("Fetched {} DelegateChanged logs", logs.len());
        logs.iter().map(decode_delegation).collect()
    }

    async fn vote_events(&self, to_block: BlockNumber) -> SourceResult<Vec<VoteEvent>> {
        let logs = self
            .rpc
            .get_logs(
                self.contracts.governor,
                &[event_topic(VOTE_CAST), event_topic(VOTE_CAST_WITH_REASON)],
                to_block,
            )
            .await?;
        info!("Fetched {} VoteCast logs", logs.len());
        logs.iter().map(decode_vote).collect()
    }

    async fn reverse_resolve(&self, address: Address) -> SourceResult<Option<String>> {
        self.ens
            .lookup(&self.rpc, address)
            .await
            .map_err(|e| SourceError::NameLookup {
                address,
                reason: format!("{:#}", e),
            })
    }
}
