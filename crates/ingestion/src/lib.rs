//! Chain ingestion and the snapshot job for governance delegates.

pub mod abi;
pub mod ens;
pub mod job;
pub mod log_source;
pub mod rpc_client;

pub use ens::EnsResolver;
pub use job::{run_isolated, JobConfig, JobStage, JobStatus, SnapshotJob};
pub use log_source::{GovernanceContracts, RpcLogSource};
pub use rpc_client::{RpcClient, RpcConfig};
