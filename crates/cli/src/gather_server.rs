//! gather-server - collects document fragments over HTTP and writes markdown
//!
//! Producers post one fragment per request. Once every fragment of a
//! document has arrived, or the document has been idle past the staleness
//! window, it is rendered and written to `{output-dir}/{doc_id}.md`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser};
use gather_cli::args::ParamArgs;
use gather_cli::logging::init_tracing;
use gather_cli::{AppState, serve};
use gather_core::aggregate::Aggregator;
use gather_core::params::AggregatorConfig;
use gather_core::sink::FsSink;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "gather-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "GATHER_BIND", default_value = "0.0.0.0:8000")]
    bind: String,

    /// Directory where finished documents are written
    #[arg(short = 'O', long = "output-dir", env = "MOUNT_PATH")]
    output_dir: PathBuf,

    /// Seconds without a new fragment before a document is force-flushed
    #[arg(long = "stale-after-secs", default_value = "300")]
    stale_after_secs: u64,

    /// Seconds between scans for stale documents
    #[arg(long = "sweep-interval-secs", default_value = "10")]
    sweep_interval_secs: u64,

    #[command(flatten)]
    params: ParamArgs,

    /// Use debug logging level
    #[arg(short = 'd', long, action = ArgAction::SetTrue)]
    debug: bool,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create output dir {}", args.output_dir.display()))?;

    let config = AggregatorConfig {
        stale_after: Duration::from_secs(args.stale_after_secs),
        sweep_interval: Duration::from_secs(args.sweep_interval_secs.max(1)),
    };
    tracing::info!(
        output_dir = %args.output_dir.display(),
        stale_after_secs = config.stale_after.as_secs(),
        sweep_interval_secs = config.sweep_interval.as_secs(),
        "starting gather server"
    );

    let sink = FsSink::new(&args.output_dir);
    let aggregator = Aggregator::new(sink, args.params.to_params(), config);
    let listener = TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;

    serve(listener, AppState::new(aggregator), shutdown_signal()).await?;
    Ok(())
}
