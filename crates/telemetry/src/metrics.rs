//! Prometheus metrics for snapshot jobs.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntGauge, Registry, TextEncoder,
};

/// Metrics collector for the snapshot service.
///
/// Each instance owns its registry, so independent collectors can coexist
/// in one process.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    job_runs: IntCounter,
    job_failures: IntCounter,
    snapshot_delegates: IntGauge,
    snapshot_block: IntGauge,
    name_lookup_failures: IntCounter,
    rpc_errors: IntCounter,
    rpc_retries: IntCounter,
    rpc_latency: HistogramVec,
}

impl Metrics {
    /// Create a new metrics instance.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let job_runs = IntCounter::new("govsnap_job_runs_total", "Total number of snapshot job runs")?;
        registry.register(Box::new(job_runs.clone()))?;

        let job_failures = IntCounter::new(
            "govsnap_job_failures_total",
            "Total number of snapshot job runs that did not store a snapshot",
        )?;
        registry.register(Box::new(job_failures.clone()))?;

        let snapshot_delegates = IntGauge::new(
            "govsnap_snapshot_delegates",
            "Number of delegates in the last stored snapshot",
        )?;
        registry.register(Box::new(snapshot_delegates.clone()))?;

        let snapshot_block = IntGauge::new(
            "govsnap_snapshot_block_number",
            "Block height of the last stored snapshot",
        )?;
        registry.register(Box::new(snapshot_block.clone()))?;

        let name_lookup_failures = IntCounter::new(
            "govsnap_name_lookup_failures_total",
            "Total number of reverse name lookups recorded as no name after failing",
        )?;
        registry.register(Box::new(name_lookup_failures.clone()))?;

        let rpc_errors = IntCounter::new("govsnap_rpc_errors_total", "Total number of RPC errors")?;
        registry.register(Box::new(rpc_errors.clone()))?;

        let rpc_retries = IntCounter::new("govsnap_rpc_retries_total", "Total number of RPC retries")?;
        registry.register(Box::new(rpc_retries.clone()))?;

        let rpc_latency = HistogramVec::new(
            HistogramOpts::new("govsnap_rpc_latency_seconds", "RPC call latency in seconds"),
            &["operation"],
        )?;
        registry.register(Box::new(rpc_latency.clone()))?;

        Ok(Self {
            registry,
            job_runs,
            job_failures,
            snapshot_delegates,
            snapshot_block,
            name_lookup_failures,
            rpc_errors,
            rpc_retries,
            rpc_latency,
        })
    }

    pub fn inc_job_runs(&self) {
        self.job_runs.inc();
    }

    pub fn inc_job_failures(&self) {
        self.job_failures.inc();
    }

    /// Record the size and height of a stored snapshot.
    pub fn set_snapshot(&self, delegates: usize, block_number: u64) {
        self.snapshot_delegates.set(delegates as i64);
        self.snapshot_block.set(block_number as i64);
    }

    pub fn inc_name_lookup_failures(&self, count: u64) {
        self.name_lookup_failures.inc_by(count);
    }

    /// Increment the RPC errors counter.
    pub fn inc_rpc_errors(&self) {
        self.rpc_errors.inc();
    }

    pub fn inc_rpc_retries(&self) {
        self.rpc_retries.inc();
    }

    /// Record RPC latency.
    pub fn observe_rpc_latency(&self, operation: &str, duration_secs: f64) {
        self.rpc_latency.with_label_values(&[operation]).observe(duration_secs);
    }

    /// Get Prometheus metrics as a string.
    pub fn gather(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
