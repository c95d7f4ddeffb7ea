//! Runtime configuration: fetch settings, schedule settings and the source set.
//!
//! Configuration is an explicit value built once at startup (from an optional
//! YAML file plus CLI overrides) and handed to the orchestrator and scheduler
//! constructors. Every field has a default, so an empty file is valid.
//!
//! ```yaml
//! fetch:
//!   timeout_seconds: 20
//!   max_concurrent_fetches: 8
//! schedule:
//!   interval_minutes: 30
//!   max_retries: 2
//! sources:
//!   - name: El País
//!     source: El País
//!     urls: ["https://elpais.com/espana/2025-05-06/slug.html"]
//! ```

use crate::error::{IngestError, Result};
use crate::models::NewsSource;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; DailyTrends/1.0)";
pub const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Upper bound for `interval_minutes` and `retry_delay_minutes` (one week).
pub const MAX_SCHEDULE_MINUTES: u64 = 7 * 24 * 60;

/// HTTP and fan-out settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub accept: String,
    pub timeout_seconds: u64,
    /// Upper bound on concurrent article fetches within one batch.
    pub max_concurrent_fetches: usize,
    /// Upper bound on sources processed concurrently within one cycle.
    pub max_concurrent_sources: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept: DEFAULT_ACCEPT.to_string(),
            timeout_seconds: 30,
            max_concurrent_fetches: 8,
            max_concurrent_sources: 4,
        }
    }
}

/// Scheduling settings. Replaced as a whole through [`ScheduleConfig::merge`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_minutes: u64,
    pub max_retries: u32,
    pub retry_delay_minutes: u64,
    pub enabled: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
            max_retries: 3,
            retry_delay_minutes: 5,
            enabled: true,
        }
    }
}

impl ScheduleConfig {
    /// Timer period, clamped to `1..=MAX_SCHEDULE_MINUTES` minutes.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.clamp(1, MAX_SCHEDULE_MINUTES) * 60)
    }

    /// Wait between failed cycle attempts, capped at `MAX_SCHEDULE_MINUTES`.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_minutes.min(MAX_SCHEDULE_MINUTES) * 60)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_SCHEDULE_MINUTES).contains(&self.interval_minutes) {
            return Err(IngestError::InvalidConfig(format!(
                "schedule.interval_minutes must be between 1 and {MAX_SCHEDULE_MINUTES}, got {}",
                self.interval_minutes
            )));
        }
        if self.retry_delay_minutes > MAX_SCHEDULE_MINUTES {
            return Err(IngestError::InvalidConfig(format!(
                "schedule.retry_delay_minutes must be at most {MAX_SCHEDULE_MINUTES}, got {}",
                self.retry_delay_minutes
            )));
        }
        Ok(())
    }

    /// Apply the fields present in `update`, returning the merged config.
    pub fn merge(&self, update: &ScheduleConfigUpdate) -> Self {
        Self {
            interval_minutes: update.interval_minutes.unwrap_or(self.interval_minutes),
            max_retries: update.max_retries.unwrap_or(self.max_retries),
            retry_delay_minutes: update.retry_delay_minutes.unwrap_or(self.retry_delay_minutes),
            enabled: update.enabled.unwrap_or(self.enabled),
        }
    }
}

/// Partial [`ScheduleConfig`]; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfigUpdate {
    pub interval_minutes: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_minutes: Option<u64>,
    pub enabled: Option<bool>,
}

/// One configured news source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Display key; unique across the active configuration.
    pub name: String,
    pub source: NewsSource,
    /// Explicit article URLs. When absent the source's front page is crawled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl SourceConfig {
    pub fn new(source: NewsSource) -> Self {
        Self {
            name: source.display_name().to_string(),
            source,
            urls: None,
            enabled: true,
        }
    }

    pub fn with_urls(mut self, urls: Vec<String>) -> Self {
        self.urls = Some(urls);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// The known, always-enabled source set.
pub fn default_source_configs() -> Vec<SourceConfig> {
    vec![
        SourceConfig::new(NewsSource::ElPais),
        SourceConfig::new(NewsSource::ElMundo),
    ]
}

fn default_sources() -> Vec<SourceConfig> {
    default_source_configs()
}

/// Everything the host process needs to build the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            schedule: ScheduleConfig::default(),
            sources: default_source_configs(),
        }
    }
}

impl AppConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let config = Self::from_yaml_str(&raw)?;
        info!(
            sources = config.sources.len(),
            interval_minutes = config.schedule.interval_minutes,
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.schedule.validate()?;
        if self.fetch.max_concurrent_fetches == 0 || self.fetch.max_concurrent_sources == 0 {
            return Err(IngestError::InvalidConfig(
                "fetch concurrency limits must be at least 1".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(IngestError::InvalidConfig("source name is empty".to_string()));
            }
            if !names.insert(source.name.as_str()) {
                return Err(IngestError::InvalidConfig(format!(
                    "duplicate source name: {}",
                    source.name
                )));
            }
            for raw in source.urls.iter().flatten() {
                let parsed = Url::parse(raw)?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(IngestError::InvalidConfig(format!(
                        "seed URL must be http(s): {raw}"
                    )));
                }
            }
        }
        Ok(())
    }
}
