//! CLI for building and inspecting governance delegate snapshots.

use alloy::primitives::Address;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use govsnap_db::{DbPool, SnapshotStore, DELEGATES_FIELD};
use govsnap_ingestion::{
    run_isolated, EnsResolver, GovernanceContracts, JobConfig, JobStage, JobStatus, RpcClient,
    RpcConfig, RpcLogSource, SnapshotJob,
};
use govsnap_telemetry::{init_logging, Metrics};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "govsnap")]
#[command(about = "Governance delegate snapshots built from on-chain event history")]
struct Cli {
    /// Log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and store one snapshot, then print the job status as JSON
    Run {
        #[command(flatten)]
        job: JobArgs,
    },
    /// Build a snapshot on a fixed interval and serve Prometheus metrics
    Schedule {
        #[command(flatten)]
        job: JobArgs,

        /// Seconds between the start of consecutive runs
        #[arg(long, default_value = "3600")]
        interval_seconds: u64,

        /// Metrics bind address
        #[arg(long, default_value = "0.0.0.0:9090")]
        metrics_bind_address: String,
    },
    /// Print the stored snapshot as JSON
    Show {
        /// Database path
        #[arg(long, default_value = "govsnap.db")]
        database_path: String,

        /// Snapshot discriminator
        #[arg(long, default_value = DELEGATES_FIELD)]
        field: String,
    },
    /// Export the stored snapshot's delegates to CSV
    Export {
        /// Database path
        #[arg(long, default_value = "govsnap.db")]
        database_path: String,

        /// Snapshot discriminator
        #[arg(long, default_value = DELEGATES_FIELD)]
        field: String,

        /// Output CSV path
        #[arg(long, default_value = "delegates.csv")]
        output: String,
    },
}

#[derive(Args)]
struct JobArgs {
    /// Ethereum execution RPC URL
    #[arg(long, default_value = "https://cloudflare-eth.com/")]
    rpc_url: String,

    /// Governance token emitting DelegateVotesChanged and DelegateChanged
    #[arg(long)]
    token_address: String,

    /// Governor emitting VoteCast
    #[arg(long)]
    governance_address: String,

    /// Token decimals
    #[arg(long, default_value = "18")]
    token_decimals: u32,

    /// Retries per RPC call after the first attempt
    #[arg(long, default_value = "5")]
    max_retries: u32,

    /// Delay before the first RPC retry in milliseconds
    #[arg(long, default_value = "500")]
    retry_base_delay_ms: u64,

    /// ENS registry used for reverse name lookups
    #[arg(long)]
    ens_registry: Option<String>,

    /// Delegates enriched with names concurrently
    #[arg(long, default_value = "16")]
    name_lookup_concurrency: usize,

    /// Database path
    #[arg(long, default_value = "govsnap.db")]
    database_path: String,

    /// Snapshot discriminator
    #[arg(long, default_value = DELEGATES_FIELD)]
    field: String,

    /// Sample output path for audit logs
    #[arg(long)]
    sample_output_path: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    match cli.command {
        Commands::Run { job } => {
            let status = run_once(&job).await;
            print_status(&status)?;
        }
        Commands::Schedule {
            job,
            interval_seconds,
            metrics_bind_address,
        } => {
            let metrics = Metrics::new()?;
            start_metrics_server(&metrics_bind_address, metrics.clone()).await?;
            let job = build_job(&job, metrics).await?;
            run_schedule(&job, Duration::from_secs(interval_seconds)).await;
        }
        Commands::Show {
            database_path,
            field,
        } => {
            show_snapshot(&database_path, &field).await?;
        }
        Commands::Export {
            database_path,
            field,
            output,
        } => {
            export_snapshot(&database_path, &field, Path::new(&output)).await?;
        }
    }

    Ok(())
}

fn parse_address(label: &str, value: &str) -> anyhow::Result<Address> {
    value
        .parse()
        .with_context(|| format!("Invalid {} address: {}", label, value))
}

async fn build_job(args: &JobArgs, metrics: Metrics) -> anyhow::Result<SnapshotJob> {
    let contracts = GovernanceContracts {
        token: parse_address("token", &args.token_address)?,
        governor: parse_address("governance", &args.governance_address)?,
    };
    let ens = match &args.ens_registry {
        Some(registry) => EnsResolver::new(parse_address("ENS registry", registry)?),
        None => EnsResolver::default(),
    };

    let mut rpc_config = RpcConfig::new(&args.rpc_url);
    rpc_config.max_retries = args.max_retries;
    rpc_config.base_delay = Duration::from_millis(args.retry_base_delay_ms);
    let rpc = RpcClient::new(rpc_config, metrics.clone())?;

    let db = DbPool::new(&args.database_path).await?;
    db.migrate().await?;

    let config = JobConfig {
        field: args.field.clone(),
        token_decimals: args.token_decimals,
        name_lookup_concurrency: args.name_lookup_concurrency,
        sample_output_path: args.sample_output_path.clone(),
    };

    Ok(SnapshotJob::new(
        Arc::new(RpcLogSource::new(rpc, contracts, ens)),
        Arc::new(SnapshotStore::new(db)),
        config,
        metrics,
    ))
}

/// Build and run one job. Setup failures are reported as a status too.
async fn run_once(args: &JobArgs) -> JobStatus {
    let job = match Metrics::new() {
        Ok(metrics) => build_job(args, metrics).await,
        Err(e) => Err(e),
    };

    match job {
        Ok(job) => run_isolated(&job).await,
        Err(e) => {
            error!("Snapshot job setup failed: {:#}", e);
            JobStatus::failed(JobStage::Setup, format!("{:#}", e))
        }
    }
}

fn print_status(status: &JobStatus) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(status)?);
    Ok(())
}

async fn run_schedule(job: &SnapshotJob, interval: Duration) {
    info!("Starting snapshot schedule every {:?}", interval);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let status = run_isolated(job).await;
        if let Err(e) = print_status(&status) {
            warn!("Failed to print job status: {}", e);
        }
    }
}

async fn open_store(db_path: &str) -> anyhow::Result<SnapshotStore> {
    let db = DbPool::new(db_path).await?;
    db.migrate().await?;
    Ok(SnapshotStore::new(db))
}

async fn show_snapshot(db_path: &str, field: &str) -> anyhow::Result<()> {
    let store = open_store(db_path).await?;
    match store.get_snapshot(field).await? {
        Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        None => anyhow::bail!("No snapshot stored for {}", field),
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct DelegateRow<'a> {
    address: &'a str,
    ens_name: Option<&'a str>,
    voting_power: String,
    delegators: usize,
    votes: usize,
}

async fn export_snapshot(db_path: &str, field: &str, output: &Path) -> anyhow::Result<()> {
    let store = open_store(db_path).await?;
    let snapshot = store
        .get_snapshot(field)
        .await?
        .with_context(|| format!("No snapshot stored for {}", field))?;

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {:?}", output))?;
    for record in snapshot.data.values() {
        writer.serialize(DelegateRow {
            address: &record.address,
            ens_name: record.ens_name.as_deref(),
            voting_power: record.voting_power.to_string(),
            delegators: record.delegators.len(),
            votes: record.votes.len(),
        })?;
    }
    writer.flush()?;

    info!(
        "Exported {} delegates from block {} to {:?}",
        snapshot.delegate_count(),
        snapshot.block_number,
        output
    );
    Ok(())
}

async fn start_metrics_server(addr: &str, metrics: Metrics) -> anyhow::Result<()> {
    use axum::{
        extract::State,
        http::StatusCode,
        response::IntoResponse,
        routing::get,
        Router,
    };

    let metrics = Arc::new(metrics);

    async fn metrics_handler(
        State(metrics): State<Arc<Metrics>>,
    ) -> Result<impl IntoResponse, StatusCode> {
        match metrics.gather() {
            Ok(body) => Ok((StatusCode::OK, body)),
            Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Metrics server listening on http://{}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_args(token_address: &str, database_path: &str) -> JobArgs {
        JobArgs {
            rpc_url: "http://127.0.0.1:1".to_string(),
            token_address: token_address.to_string(),
            governance_address: "0x408ED6354d4973f66138C91495F2f2FCbd8724C3".to_string(),
            token_decimals: 18,
            max_retries: 0,
            retry_base_delay_ms: 1,
            ens_registry: None,
            name_lookup_concurrency: 1,
            database_path: database_path.to_string(),
            field: DELEGATES_FIELD.to_string(),
            sample_output_path: None,
        }
    }

    #[tokio::test]
    async fn test_bad_address_reports_setup_status() {
        let status = run_once(&job_args("not-an-address", ":memory:")).await;

        match status {
            JobStatus::Error { stage, message } => {
                assert_eq!(stage, JobStage::Setup);
                assert!(message.contains("Invalid token address"));
            }
            JobStatus::Ok => panic!("setup failure reported as ok"),
        }
    }

    #[tokio::test]
    async fn test_unopenable_database_reports_setup_status() {
        let args = job_args(
            "0xc00e94Cb662C3520282E6f5717214004A7f26888",
            "/nonexistent-dir/govsnap.db",
        );

        let status = run_once(&args).await;

        assert!(matches!(
            status,
            JobStatus::Error {
                stage: JobStage::Setup,
                ..
            }
        ));
    }
}
