//! # Daily Trends
//!
//! Periodic ingestion of front-page news from Spanish newspapers.
//!
//! ## Pipeline
//!
//! 1. **Scheduling**: [`scheduler::Scheduler`] fires a cycle on start and then
//!    every `interval_minutes`, retrying failed cycles with a fixed delay.
//! 2. **Discovery**: each [`scrapers::SourceExtractor`] lists article URLs
//!    from its newspaper's front page (or a config supplies seed URLs).
//! 3. **Fetching**: [`fetcher::DocumentFetcher`] downloads each page and pulls
//!    title, description, date, image and section out of its meta tags.
//! 4. **Dedupe and persist**: [`orchestrator::IngestionOrchestrator`] checks
//!    each URL against the [`repository::FeedRepository`] and stores new items,
//!    rolling outcomes up into [`models::ScrapingResult`]s.

pub mod cli;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod orchestrator;
pub mod repository;
pub mod retry;
pub mod scheduler;
pub mod scrapers;
pub mod utils;

#[cfg(test)]
mod testing;

pub use config::{AppConfig, FetchConfig, ScheduleConfig, ScheduleConfigUpdate, SourceConfig};
pub use error::{IngestError, Result};
pub use fetcher::{DocumentFetcher, HttpTransport, ReqwestTransport};
pub use models::{FeedItem, NewsSource, SchedulerStats, ScrapingResult};
pub use orchestrator::{IngestionOrchestrator, SourceIngestor};
pub use repository::{FeedRepository, InMemoryFeedRepository};
pub use scheduler::{CycleOutcome, Scheduler};
