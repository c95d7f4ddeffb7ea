//! Data models for ingested news items and ingestion statistics.
//!
//! - [`FeedItem`]: a stored news item, unique by `url`
//! - [`NewFeedItem`] / [`FeedItemUpdate`]: create and partial-update payloads
//! - [`ScrapedDocument`]: transient metadata produced by the document fetcher
//! - [`ScrapingResult`] and [`ItemOutcome`]: per-batch accounting
//! - [`SchedulerStats`]: counters owned by the scheduler
//!
//! Field names serialise in camelCase, matching what the API layer exposes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A known news origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NewsSource {
    #[serde(rename = "El País")]
    ElPais,
    #[serde(rename = "El Mundo")]
    ElMundo,
    /// Sentinel for items entered by hand through the API layer.
    #[serde(rename = "Manual")]
    Manual,
}

impl NewsSource {
    pub const ALL: [NewsSource; 3] = [NewsSource::ElPais, NewsSource::ElMundo, NewsSource::Manual];

    pub fn display_name(&self) -> &'static str {
        match self {
            NewsSource::ElPais => "El País",
            NewsSource::ElMundo => "El Mundo",
            NewsSource::Manual => "Manual",
        }
    }
}

impl fmt::Display for NewsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A persisted news item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub url: String,
    pub source: NewsSource,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub is_manual: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a [`FeedItem`]; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFeedItem {
    pub title: String,
    pub description: String,
    pub url: String,
    pub source: NewsSource,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_manual: bool,
}

impl NewFeedItem {
    /// Build a scraped (non-manual) item from fetched document metadata.
    pub fn from_document(document: ScrapedDocument, source: NewsSource) -> Self {
        Self {
            title: document.title,
            description: document.description,
            url: document.url,
            source,
            published_at: document.published_at,
            image_url: document.image_url,
            category: document.category,
            is_manual: false,
        }
    }
}

/// Partial update applied by the API layer. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItemUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub source: Option<NewsSource>,
    pub published_at: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub is_manual: Option<bool>,
}

/// Metadata extracted from one article page. Never persisted directly.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedDocument {
    pub title: String,
    pub description: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub image_url: Option<String>,
    pub category: Option<String>,
}

/// What happened to one item on its way through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Created(FeedItem),
    Duplicate,
    Failed(String),
}

/// Aggregate accounting for one batch, source or cycle.
///
/// `success + duplicates` are the items that reached the dedupe gate;
/// `failed` counts items that never got there. `items` holds one slot per
/// gated item: `Some` when created, `None` when it was a duplicate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapingResult {
    pub success: usize,
    pub failed: usize,
    pub duplicates: usize,
    pub items: Vec<Option<FeedItem>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ScrapingResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Result recorded for a source whose processing raised an error.
    pub fn source_failure(message: impl Into<String>) -> Self {
        Self {
            failed: 1,
            errors: vec![message.into()],
            ..Self::default()
        }
    }

    pub fn from_outcomes(outcomes: impl IntoIterator<Item = ItemOutcome>) -> Self {
        let mut result = Self::default();
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Created(item) => {
                    result.success += 1;
                    result.items.push(Some(item));
                }
                ItemOutcome::Duplicate => {
                    result.duplicates += 1;
                    result.items.push(None);
                }
                ItemOutcome::Failed(reason) => {
                    result.failed += 1;
                    result.errors.push(reason);
                }
            }
        }
        result
    }

    pub fn merge(&mut self, other: ScrapingResult) {
        self.success += other.success;
        self.failed += other.failed;
        self.duplicates += other.duplicates;
        self.items.extend(other.items);
        self.errors.extend(other.errors);
    }

    /// Sum several results into one.
    pub fn total<'a>(results: impl IntoIterator<Item = &'a ScrapingResult>) -> Self {
        let mut total = Self::default();
        for result in results {
            total.merge(result.clone());
        }
        total
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (self.success, self.failed, self.duplicates)
    }
}

/// Run statistics owned by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub total_items_scraped: u64,
    pub total_duplicates: u64,
}
