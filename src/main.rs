//! # Daily Trends
//!
//! Host process for the news ingestion scheduler.
//!
//! ## Usage
//!
//! ```sh
//! daily_trends                      # run until Ctrl-C / SIGTERM
//! daily_trends --once               # one cycle, then exit
//! daily_trends --source "El País"   # one source, then exit
//! ```
//!
//! ## Startup
//!
//! 1. **Configuration**: YAML file (optional), then command-line overrides
//! 2. **Wiring**: reqwest transport, document fetcher, in-memory store,
//!    orchestrator and scheduler
//! 3. **Run**: start the scheduler and wait for a shutdown signal, then let
//!    the in-flight cycle finish and log the final statistics

use clap::Parser;
use daily_trends::cli::{Cli, HOST_MAX_RETRIES, RunMode};
use daily_trends::{
    AppConfig, CycleOutcome, DocumentFetcher, FeedRepository, InMemoryFeedRepository,
    IngestionOrchestrator, ReqwestTransport, Scheduler,
};
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("daily_trends starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // --- Configuration ---
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path).await.map_err(|e| {
            error!(path = %path, error = %e, "Failed to load configuration");
            e
        })?,
        None => {
            let mut config = AppConfig::default();
            config.schedule.max_retries = HOST_MAX_RETRIES;
            config
        }
    };
    config.schedule = config.schedule.merge(&args.schedule_overrides());
    config.validate()?;
    info!(
        interval_minutes = config.schedule.interval_minutes,
        max_retries = config.schedule.max_retries,
        retry_delay_minutes = config.schedule.retry_delay_minutes,
        sources = config.sources.len(),
        "Configuration ready"
    );

    // --- Wiring ---
    let transport = Arc::new(ReqwestTransport::new(&config.fetch)?);
    let fetcher = DocumentFetcher::new(transport);
    let repository: Arc<dyn FeedRepository> = Arc::new(InMemoryFeedRepository::new());
    let orchestrator = Arc::new(IngestionOrchestrator::new(
        fetcher,
        Arc::clone(&repository),
        &config.fetch,
    ));
    let scheduler = Scheduler::new(orchestrator, config.sources, config.schedule);
    let source_names: Vec<&str> = scheduler.sources().iter().map(|s| s.name.as_str()).collect();
    info!(sources = ?source_names, "Ingestion pipeline wired");

    // --- Run ---
    match args.run_mode(scheduler.config().enabled) {
        RunMode::SingleSource(name) => {
            let result = scheduler.run_single_source(&name).await?;
            info!(
                source = %name,
                success = result.success,
                duplicates = result.duplicates,
                failed = result.failed,
                stored = repository.count().await?,
                "Single source run finished"
            );
            return Ok(());
        }
        RunMode::Once => {
            let outcome = scheduler.run_scraping_cycle().await;
            let stats = scheduler.stats();
            info!(
                ?outcome,
                items = stats.total_items_scraped,
                duplicates = stats.total_duplicates,
                stored = repository.count().await?,
                elapsed_ms = start_time.elapsed().as_millis() as u64,
                "Single cycle finished"
            );
            if let CycleOutcome::Failed { attempts } = outcome {
                return Err(format!("ingestion cycle failed after {attempts} attempts").into());
            }
            return Ok(());
        }
        RunMode::Idle => {
            warn!("Schedule is disabled and neither --once nor --source was given; nothing to do");
            return Ok(());
        }
        RunMode::Scheduled => {}
    }

    scheduler.start();
    info!("Scheduler started; waiting for shutdown signal");
    shutdown_signal().await?;

    info!("Shutdown signal received");
    scheduler.shutdown().await;

    let stats = serde_json::to_string(&scheduler.stats())?;
    info!(
        %stats,
        stored = repository.count().await?,
        uptime_secs = start_time.elapsed().as_secs(),
        "daily_trends stopped"
    );
    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM where available.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
