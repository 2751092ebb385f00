//! Concurrent primary-name enrichment of aggregated delegates.

use crate::aggregate::AggregatedDelegate;
use alloy::primitives::Address;
use futures_util::future;
use futures_util::stream::{self, StreamExt};
use govsnap_chain::ChainLogSource;
use govsnap_db::{DelegateRecord, Delegator};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Enriched delegate records keyed by checksummed address.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub records: BTreeMap<String, DelegateRecord>,
    /// Lookups that failed and were recorded as "no name".
    pub failed_lookups: usize,
}

struct NameLookup {
    name: Option<String>,
    failed: bool,
}

/// Resolve names for every delegate and its delegators.
///
/// Delegates are enriched independently with at most `concurrency`
/// delegates in flight; each delegate's own lookup runs alongside its
/// delegators' lookups. A failed lookup never fails enrichment.
pub async fn enrich<S>(
    delegates: Vec<AggregatedDelegate>,
    source: &S,
    concurrency: usize,
) -> Enrichment
where
    S: ChainLogSource + ?Sized,
{
    let concurrency = concurrency.max(1);

    let enriched: Vec<(DelegateRecord, usize)> = stream::iter(delegates)
        .map(|delegate| enrich_delegate(delegate, source, concurrency))
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let mut enrichment = Enrichment::default();
    for (record, failed) in enriched {
        enrichment.failed_lookups += failed;
        enrichment.records.insert(record.address.clone(), record);
    }
    enrichment
}

async fn enrich_delegate<S>(
    delegate: AggregatedDelegate,
    source: &S,
    concurrency: usize,
) -> (DelegateRecord, usize)
where
    S: ChainLogSource + ?Sized,
{
    let own = lookup_name(source, delegate.address);
    let delegators = stream::iter(delegate.delegators.iter().copied())
        .map(|address| async move { (address, lookup_name(source, address).await) })
        .buffered(concurrency)
        .collect::<Vec<_>>();

    let (own, delegators) = future::join(own, delegators).await;

    let mut failed = usize::from(own.failed);
    let delegators = delegators
        .into_iter()
        .map(|(address, lookup)| {
            failed += usize::from(lookup.failed);
            Delegator {
                address: address.to_checksum(None),
                ens_name: lookup.name,
            }
        })
        .collect();

    debug!(
        "Enriched delegate {} with {} delegators",
        delegate.address,
        delegate.delegators.len()
    );

    let record = DelegateRecord {
        address: delegate.address.to_checksum(None),
        voting_power: delegate.voting_power,
        ens_name: own.name,
        delegators,
        votes: delegate.votes,
    };
    (record, failed)
}

async fn lookup_name<S>(source: &S, address: Address) -> NameLookup
where
    S: ChainLogSource + ?Sized,
{
    match source.reverse_resolve(address).await {
        Ok(name) => NameLookup {
            name,
            failed: false,
        },
        Err(e) => {
            warn!("Name lookup for {} failed, recording no name: {}", address, e);
            NameLookup {
                name: None,
                failed: true,
            }
        }
    }
}
