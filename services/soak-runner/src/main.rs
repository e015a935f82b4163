//! Perpetual soak harness for a Redis-compatible store.
//!
//! Seeds a fixed key space, then keeps the store under continuous load with:
//! - Random single-key reads and writes, replicated per thread group
//! - Set-membership add/find loops, flat or bucketed
//! - Distributed-lock contention over a fixed set of lock names
//! - Per-operation latency logging and an HTTP status API

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use soak_runner::config::SoakConfig;
use soak_runner::keyspace::KeySpace;
use soak_runner::metrics::{self, MetricsHandle};
use soak_runner::report::SummaryReport;
use soak_runner::server::{self, ServerState};
use soak_runner::workload::{self, WorkloadSuite};
use store_client::RedisStore;

#[derive(Parser, Debug)]
#[command(name = "soak-runner")]
#[command(about = "Perpetual load harness for a Redis-compatible store")]
struct Args {
    /// Scenario YAML file (defaults apply when omitted)
    #[arg(short, long)]
    scenario: Option<PathBuf>,

    /// Store endpoint
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Size of the generated key space
    #[arg(long)]
    key_count: Option<usize>,

    /// Replication multiplier for the workload loops
    #[arg(long)]
    thread_groups: Option<usize>,

    /// Use the bucketed set-membership strategy
    #[arg(long)]
    use_buckets: bool,

    /// In-flight cap for the warm-up write pass
    #[arg(long)]
    warmup_fanout: Option<usize>,

    /// In-flight cap for the per-bucket fan-out
    #[arg(long)]
    bucket_fanout: Option<usize>,

    /// Port for status HTTP server
    #[arg(long, env = "STATUS_PORT", default_value = "8080")]
    status_port: u16,

    /// Disable status HTTP server
    #[arg(long)]
    no_status_server: bool,

    /// Final report format: table (default), json
    #[arg(short, long, default_value = "table")]
    output: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Scenario file first, then CLI overrides on top
    let mut config = match &args.scenario {
        Some(path) => SoakConfig::from_file(path)
            .with_context(|| format!("failed to load scenario {}", path.display()))?,
        None => SoakConfig::default(),
    };
    if let Some(url) = args.redis_url {
        config.redis_url = url;
    }
    if let Some(count) = args.key_count {
        config.key_count = count;
    }
    if let Some(groups) = args.thread_groups {
        config.thread_groups = groups;
    }
    if args.use_buckets {
        config.use_buckets = true;
    }
    if let Some(fanout) = args.warmup_fanout {
        config.warmup_fanout = fanout;
    }
    if let Some(fanout) = args.bucket_fanout {
        config.bucket_fanout = fanout;
    }
    config.validate()?;

    info!(
        name = %config.name,
        redis_url = %config.redis_url,
        keys = config.key_count,
        thread_groups = config.thread_groups,
        use_buckets = config.use_buckets,
        "Starting soak harness"
    );

    let store = Arc::new(
        RedisStore::connect(&config.redis_url)
            .await
            .context("store connection failed at startup")?,
    );

    let keyspace = KeySpace::generate(config.key_count);
    info!(
        keys = keyspace.len(),
        buckets = keyspace.bucket_count(),
        "Key space built"
    );

    let metrics = MetricsHandle::new();
    let report_interval = Duration::from_secs(config.report_interval_secs);

    // Shutdown signal
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Start status server (unless disabled). Bind before spawning so a port
    // conflict aborts startup; only post-bind serve errors stay log-only.
    if !args.no_status_server {
        let listener = server::bind_listener(args.status_port)
            .await
            .context("status server failed at startup")?;
        let server_state = Arc::new(ServerState {
            metrics: metrics.clone(),
        });
        tokio::spawn(async move {
            if let Err(e) = server::run_server(server_state, listener).await {
                error!(error = %e, "Status server failed");
            }
        });
    }

    let suite = Arc::new(WorkloadSuite::new(
        store,
        keyspace,
        config,
        metrics.clone(),
    ));
    suite.warm_up().await?;

    let mut handles = suite.spawn_loops(&shutdown_tx);
    handles.push(tokio::spawn(metrics::report_loop(
        metrics.clone(),
        report_interval,
        shutdown_tx.subscribe(),
    )));

    // Subscribe before arming the signal handler so the send cannot be missed
    let mut shutdown_rx = shutdown_tx.subscribe();

    // Handle Ctrl+C
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx_clone.send(()).ok();
    });

    // The harness never finishes on its own; block until the signal fires,
    // then drain every loop at its next iteration boundary.
    shutdown_rx.recv().await.ok();
    info!(tasks = handles.len(), "Draining workload loops");
    workload::drain_loops(handles).await;

    let snapshot = metrics.snapshot().await;
    info!(
        elapsed_secs = format!("{:.0}", snapshot.elapsed_secs),
        "Soak session complete"
    );
    match args.output.as_str() {
        "json" => println!("{}", SummaryReport::format_json(&snapshot)?),
        _ => println!("{}", SummaryReport::format_table(&snapshot)),
    }

    Ok(())
}
