//! Gather Binary Entry Point
//!
//! Loads targets from configuration and scrapes them until interrupted.
//! Core functionality is provided by the `gather` library crate.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gather::{
    HttpPointsWriter, Scheduler, StaticTargetStore,
    config::{AppConfig, parse_duration},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Gather - scrape scheduler
#[derive(Parser, Debug)]
#[command(name = "gather", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/gather.yaml",
        env = "GATHER_CONFIG"
    )]
    config: String,

    /// Writer base URL (overrides config file)
    #[arg(long, env = "GATHER_WRITER_URL")]
    writer_url: Option<String>,

    /// Writer API token (overrides config file)
    #[arg(long, env = "GATHER_WRITER_TOKEN", hide_env_values = true)]
    writer_token: Option<String>,

    /// Number of scrape workers (overrides config file)
    #[arg(long, env = "GATHER_WORKERS")]
    workers: Option<usize>,

    /// Scheduler tick, e.g. `1s` or `500ms` (overrides config file)
    #[arg(long, env = "GATHER_TICK_INTERVAL", value_parser = parse_duration)]
    tick_interval: Option<Duration>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gather=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Gather - scrape scheduler");

    let cli = Cli::parse();

    tracing::info!(path = %cli.config, "Loading configuration");
    let mut config = AppConfig::load_with_target_path(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(url) = cli.writer_url.clone() {
        config.writer.url = url;
    }
    if let Some(token) = cli.writer_token.clone() {
        config.writer.token = Some(token);
    }
    if let Some(workers) = cli.workers {
        config.scheduler.worker_count = workers;
    }
    if let Some(tick) = cli.tick_interval {
        config.scheduler.tick_interval = tick;
    }
    config.validate()?;

    tracing::info!(
        writer = %config.writer.url,
        targets = config.targets.len(),
        workers = config.scheduler.worker_count,
        "Configuration loaded"
    );

    let mut writer = HttpPointsWriter::new(&config.writer.url, config.writer.timeout)?;
    if let Some(token) = &config.writer.token {
        writer = writer.with_token(token.clone());
    }

    let store = StaticTargetStore::new(config.targets.clone());
    let scheduler = Scheduler::new(config.scheduler.clone(), Arc::new(store.clone()), Arc::new(writer))?;
    scheduler.start()?;

    tracing::info!("Press Ctrl+C to shutdown");
    run_until_shutdown(&cli.config, &store).await;

    tracing::info!("Shutting down scheduler...");
    scheduler.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Reload the target list from the configuration file into `store`.
async fn reload_targets(path: &str, store: &StaticTargetStore) {
    match AppConfig::load_with_target_path(path) {
        Ok(config) => {
            tracing::info!(targets = config.targets.len(), "Targets reloaded");
            store.replace(config.targets).await;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to reload targets, keeping current set");
        }
    }
}

/// Wait for Ctrl+C or SIGTERM. On unix, SIGHUP reloads the targets.
async fn run_until_shutdown(config_path: &str, store: &StaticTargetStore) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };
    tokio::pin!(ctrl_c);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate()).expect("failed to install signal handler");
        let mut hangup = signal(SignalKind::hangup()).expect("failed to install signal handler");

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C signal");
                    return;
                }
                _ = terminate.recv() => {
                    tracing::info!("Received terminate signal");
                    return;
                }
                _ = hangup.recv() => {
                    tracing::info!("Received hangup signal");
                    reload_targets(config_path, store).await;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (config_path, store);
        ctrl_c.await;
        tracing::info!("Received Ctrl+C signal");
    }
}
