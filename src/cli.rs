//! Command-line interface definitions for Daily Trends.
//!
//! Every scheduling flag can also come from an environment variable. Flags
//! override values from the YAML config file.

use crate::config::ScheduleConfigUpdate;
use clap::Parser;

/// `max_retries` used by the host when neither the config file nor the
/// command line sets one.
pub const HOST_MAX_RETRIES: u32 = 2;

/// Command-line arguments for the Daily Trends ingestion host.
///
/// # Examples
///
/// ```sh
/// # Run the scheduler with defaults until Ctrl-C
/// daily_trends
///
/// # One cycle against a custom config, then exit
/// daily_trends -c ./config.yaml --once
///
/// # Ingest a single configured source
/// daily_trends --source "El País"
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long, env = "DAILY_TRENDS_CONFIG")]
    pub config: Option<String>,

    /// Minutes between scheduled ingestion cycles
    #[arg(short, long, env = "SCRAPE_INTERVAL_MINUTES")]
    pub interval_minutes: Option<u64>,

    /// Extra attempts for a failed cycle
    #[arg(long, env = "SCRAPE_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Minutes to wait between failed cycle attempts
    #[arg(long, env = "SCRAPE_RETRY_DELAY_MINUTES")]
    pub retry_delay_minutes: Option<u64>,

    /// Run a single ingestion cycle and exit
    #[arg(long, conflicts_with = "source")]
    pub once: bool,

    /// Ingest only the configured source with this name and exit
    #[arg(short, long)]
    pub source: Option<String>,
}

/// What the host does once the pipeline is wired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Ingest the named source once and exit.
    SingleSource(String),
    /// Run one full cycle and exit.
    Once,
    /// Run the scheduler until a shutdown signal.
    Scheduled,
    /// The schedule is disabled and no one-shot run was requested.
    Idle,
}

impl Cli {
    /// Pick the run mode; one-shot flags win over the schedule.
    pub fn run_mode(&self, schedule_enabled: bool) -> RunMode {
        match (&self.source, self.once, schedule_enabled) {
            (Some(name), _, _) => RunMode::SingleSource(name.clone()),
            (None, true, _) => RunMode::Once,
            (None, false, true) => RunMode::Scheduled,
            (None, false, false) => RunMode::Idle,
        }
    }

    /// Scheduling overrides taken from the command line.
    pub fn schedule_overrides(&self) -> ScheduleConfigUpdate {
        ScheduleConfigUpdate {
            interval_minutes: self.interval_minutes,
            max_retries: self.max_retries,
            retry_delay_minutes: self.retry_delay_minutes,
            enabled: None,
        }
    }
}
