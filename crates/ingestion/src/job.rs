//! Snapshot job driver.
//!
//! One run pins the head height, fetches the three event streams
//! concurrently, aggregates and enriches delegates, and writes a single
//! replacement snapshot. Any failure before the write aborts the run
//! without writing. The run always returns a [`JobStatus`].

use chrono::Utc;
use futures_util::FutureExt;
use govsnap_aggregator::{aggregate, enrich, EventSets, TokenScale};
use govsnap_chain::ChainLogSource;
use govsnap_db::{Snapshot, SnapshotWriter, DELEGATES_FIELD};
use govsnap_telemetry::{audit, Metrics};
use serde::Serialize;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Settings for a snapshot job.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Discriminator the snapshot is stored under.
    pub field: String,
    pub token_decimals: u32,
    /// Delegates enriched with names at the same time.
    pub name_lookup_concurrency: usize,
    /// Optional path for audit samples of written snapshots.
    pub sample_output_path: Option<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            field: DELEGATES_FIELD.to_string(),
            token_decimals: 18,
            name_lookup_concurrency: 16,
            sample_output_path: None,
        }
    }
}

/// Phase of a run in which it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    /// The job could not be assembled from its configuration.
    Setup,
    Height,
    Fetch,
    Aggregate,
    Write,
    /// The run stopped abnormally outside the phases above.
    Internal,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStage::Setup => "setup",
            JobStage::Height => "height",
            JobStage::Fetch => "fetch",
            JobStage::Aggregate => "aggregate",
            JobStage::Write => "write",
            JobStage::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Machine-readable outcome of a run.
///
/// Serializes as `{"status":"ok"}` or
/// `{"status":"error","stage":"...","message":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus {
    Ok,
    Error { stage: JobStage, message: String },
}

impl JobStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, JobStatus::Ok)
    }

    pub fn failed(stage: JobStage, err: impl fmt::Display) -> Self {
        JobStatus::Error {
            stage,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct AuditSnapshot<'a> {
    field: &'a str,
    block_number: u64,
    timestamp: i64,
    delegates: usize,
    delegators: usize,
    votes: usize,
    failed_name_lookups: usize,
}

/// Builds and stores delegate snapshots.
pub struct SnapshotJob {
    source: Arc<dyn ChainLogSource>,
    writer: Arc<dyn SnapshotWriter>,
    config: JobConfig,
    metrics: Metrics,
}

impl SnapshotJob {
    /// Create a new snapshot job.
    ///
    /// # Arguments
    /// * `source` - Chain log source providing events and names
    /// * `writer` - Sink receiving the finished snapshot
    /// * `config` - Job settings
    /// * `metrics` - Metrics collector
    pub fn new(
        source: Arc<dyn ChainLogSource>,
        writer: Arc<dyn SnapshotWriter>,
        config: JobConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            source,
            writer,
            config,
            metrics,
        }
    }

    /// Run the job once.
    pub async fn run(&self) -> JobStatus {
        self.metrics.inc_job_runs();
        let status = self.execute().await;
        if let JobStatus::Error { stage, message } = &status {
            self.metrics.inc_job_failures();
            error!("Snapshot job failed during {}: {}", stage, message);
        }
        status
    }

    async fn execute(&self) -> JobStatus {
        let height = match self.source.current_height().await {
            Ok(height) => height,
            Err(e) => return JobStatus::failed(JobStage::Height, e),
        };
        info!("Building {} snapshot at block {}", self.config.field, height);

        let fetched = tokio::try_join!(
            self.source.balance_events(height),
            self.source.delegation_events(height),
            self.source.vote_events(height),
        );
        let (balances, delegations, votes) = match fetched {
            Ok(events) => events,
            Err(e) => return JobStatus::failed(JobStage::Fetch, e),
        };
        info!(
            "Fetched {} balance, {} delegation and {} vote events",
            balances.len(),
            delegations.len(),
            votes.len()
        );

        let events = EventSets {
            balances,
            delegations,
            votes,
        };
        let delegates = match TokenScale::new(self.config.token_decimals)
            .and_then(|scale| aggregate(&events, &scale))
        {
            Ok(delegates) => delegates,
            Err(e) => return JobStatus::failed(JobStage::Aggregate, e),
        };
        info!("Aggregated {} delegates", delegates.len());

        let enrichment = enrich(
            delegates,
            self.source.as_ref(),
            self.config.name_lookup_concurrency,
        )
        .await;
        if enrichment.failed_lookups > 0 {
            warn!(
                "{} name lookups failed and were recorded without a name",
                enrichment.failed_lookups
            );
            self.metrics
                .inc_name_lookup_failures(enrichment.failed_lookups as u64);
        }

        let snapshot = Snapshot {
            field: self.config.field.clone(),
            block_number: height,
            timestamp: Utc::now().timestamp_millis(),
            data: enrichment.records,
        };

        if let Err(e) = self.writer.put_snapshot(&snapshot).await {
            return JobStatus::failed(JobStage::Write, e);
        }

        self.metrics
            .set_snapshot(snapshot.delegate_count(), snapshot.block_number);
        info!(
            "Snapshot job completed: {} at block {} with {} delegates",
            snapshot.field,
            snapshot.block_number,
            snapshot.delegate_count()
        );
        self.write_audit(&snapshot, enrichment.failed_lookups);

        JobStatus::Ok
    }

    fn write_audit(&self, snapshot: &Snapshot, failed_name_lookups: usize) {
        let sample = AuditSnapshot {
            field: &snapshot.field,
            block_number: snapshot.block_number,
            timestamp: snapshot.timestamp,
            delegates: snapshot.delegate_count(),
            delegators: snapshot.data.values().map(|d| d.delegators.len()).sum(),
            votes: snapshot.data.values().map(|d| d.votes.len()).sum(),
            failed_name_lookups,
        };

        if let Err(e) = audit::write_audit_sample(self.config.sample_output_path.as_deref(), &sample) {
            warn!("Failed to write audit sample: {}", e);
        }
    }
}

/// Run the job, reporting a panic inside the run as an error status
/// instead of unwinding into the caller.
pub async fn run_isolated(job: &SnapshotJob) -> JobStatus {
    match AssertUnwindSafe(job.run()).catch_unwind().await {
        Ok(status) => status,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "job panicked".to_string());
            error!("Snapshot job aborted: {}", message);
            JobStatus::failed(JobStage::Internal, message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_status_payload() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Ok).unwrap(),
            r#"{"status":"ok"}"#
        );
    }

    #[test]
    fn test_error_status_payload() {
        let status = JobStatus::failed(JobStage::Fetch, "provider gone");
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            serde_json::json!({"status": "error", "stage": "fetch", "message": "provider gone"})
        );
        assert!(!status.is_ok());
    }

    #[test]
    fn test_setup_status_payload() {
        let status = JobStatus::failed(JobStage::Setup, "Invalid token address: 0x12");
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            serde_json::json!({"status": "error", "stage": "setup", "message": "Invalid token address: 0x12"})
        );
    }

    #[test]
    fn test_default_config() {
        let config = JobConfig::default();
        assert_eq!(config.field, "delegates");
        assert_eq!(config.token_decimals, 18);
    }
}
