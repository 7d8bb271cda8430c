#![doc = include_str!("../README.md")]

mod config;
mod output;
mod telemetry;

use clap::Parser;
use config::{CliArgs, CliConfig};
use eratos::PrimeStream;
use std::io::{self, BufWriter};
use tokio::signal;

// Every multiples stream is its own task and channel, which is a lot of small
// allocations. mimalloc handles that better, especially on musl.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = CliConfig::try_from(args)?;

    telemetry::init_telemetry()?;
    log_startup_info(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()?;

    match runtime.block_on(run(config)) {
        Err(e) if output::is_broken_pipe(&e) => {
            tracing::debug!("stdout closed early");
            Ok(())
        }
        result => result,
    }
}

async fn run(config: CliConfig) -> anyhow::Result<()> {
    let mut stream = PrimeStream::<u64>::open(config.sieve)?;
    let mut out = BufWriter::new(io::stdout().lock());

    let result = tokio::select! {
        printed = output::print_primes(&mut stream, config.query, &mut out) => {
            printed.map(|lines| tracing::debug!(lines, "query answered"))
        }
        () = shutdown_signal() => Ok(()),
    };

    stream.shutdown().await;
    tracing::debug!("sieve shut down");
    result
}

fn log_startup_info(config: &CliConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting sieve with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting sieve for {:?} with {} workers",
            config.query,
            config.workers
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, stopping the sieve...");
}
