#![doc = include_str!("../README.md")]

mod config;
mod runner;
mod telemetry;

use anyhow::bail;
use clap::Parser;
use config::{CliArgs, RunConfig};
use std::sync::Arc;
use stepstream::{EchoFactory, GenerateRequest, StreamingEngine};
use telemetry::init_telemetry;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = RunConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let engine = Arc::new(StreamingEngine::with_config(EchoFactory, config.engine));
    engine.start_driver()?;

    let result = run(&engine, config.jobs).await;

    engine.shutdown().await;
    providers.shutdown();
    result
}

/// Runs the jobs until they all complete, a shutdown signal arrives or the
/// engine dies.
async fn run(engine: &Arc<StreamingEngine>, jobs: Vec<GenerateRequest>) -> anyhow::Result<()> {
    tokio::select! {
        biased;
        fatal = engine.wait_fatal() => {
            tracing::error!("Engine died: {fatal}");
            Err(fatal.into())
        }
        res = shutdown_signal() => {
            res?;
            tracing::info!("Shutdown signal received, terminating gracefully...");
            Ok(())
        }
        reports = runner::run_jobs(Arc::clone(engine), jobs) => {
            let reports = reports?;
            if let Some(fatal) = reports
                .iter()
                .find_map(|report| report.outcome.as_ref().err().filter(|err| err.is_fatal()))
            {
                bail!("Engine died while jobs were streaming: {fatal}");
            }
            let failed = reports.iter().filter(|report| report.outcome.is_err()).count();
            tracing::info!(jobs = reports.len(), failed, "All finished");
            Ok(())
        }
    }
}

fn log_startup_info(config: &RunConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting stepstream with full config: {:#?}", config);
    } else {
        tracing::info!("Starting stepstream with {} jobs", config.jobs.len());
    }
}

async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())?
            .recv()
            .await;
        Ok::<_, std::io::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<()>>();

    tokio::select! {
        res = signal::ctrl_c() => {
            res?;
            tracing::info!("Received Ctrl+C signal");
        },
        res = terminate => {
            res?;
            tracing::info!("Received SIGTERM signal");
        },
    }
    Ok(())
}
