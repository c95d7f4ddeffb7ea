//! Persistence collaborator for feed items.
//!
//! The ingestion core needs only [`FeedRepository::find_by_url`],
//! [`FeedRepository::create`] and [`FeedRepository::count`]; the remaining
//! operations serve the API layer. [`InMemoryFeedRepository`] is the store the
//! bundled binary runs against. Like a database with a unique index on `url`,
//! it rejects a second item with the same URL.

use crate::error::{IngestError, Result};
use crate::models::{FeedItem, FeedItemUpdate, ItemOutcome, NewFeedItem, NewsSource};
use async_trait::async_trait;
use chrono::{Local, Utc};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Maximum number of items returned for a source's front page of the day.
pub const FRONT_PAGE_LIMIT: usize = 10;

#[async_trait]
pub trait FeedRepository: Send + Sync {
    async fn find_by_url(&self, url: &str) -> Result<Option<FeedItem>>;
    /// Store a new item, assigning id and timestamps.
    async fn create(&self, item: NewFeedItem) -> Result<FeedItem>;
    async fn count(&self) -> Result<usize>;
    /// All items of `source`, newest first.
    async fn find_by_source(&self, source: NewsSource) -> Result<Vec<FeedItem>>;
    /// Scraped items of `source` published today (local time), newest first.
    async fn find_todays_front_page(&self, source: NewsSource) -> Result<Vec<FeedItem>>;
    async fn update(&self, id: u64, update: FeedItemUpdate) -> Result<Option<FeedItem>>;
    async fn delete(&self, id: u64) -> Result<bool>;
    async fn exists(&self, url: &str) -> Result<bool>;
}

/// Dedupe gate: create `item` unless its URL is already stored.
///
/// The lookup and the write are not atomic. Two writers racing on the same
/// URL surface the store's duplicate-key error instead of `Duplicate`.
#[instrument(level = "debug", skip_all, fields(url = %item.url))]
pub async fn persist_if_new(repository: &dyn FeedRepository, item: NewFeedItem) -> Result<ItemOutcome> {
    if repository.find_by_url(&item.url).await?.is_some() {
        debug!("Skipping duplicate");
        return Ok(ItemOutcome::Duplicate);
    }
    let created = repository.create(item).await?;
    Ok(ItemOutcome::Created(created))
}

/// Run every item of a batch through the dedupe gate, in order.
///
/// Items are gated one at a time so repeated URLs inside the same batch
/// classify as duplicates. The first persistence error aborts the batch.
pub async fn process_feed_batch(
    repository: &dyn FeedRepository,
    items: Vec<NewFeedItem>,
) -> Result<Vec<ItemOutcome>> {
    let mut outcomes = Vec::with_capacity(items.len());
    for item in items {
        outcomes.push(persist_if_new(repository, item).await?);
    }
    Ok(outcomes)
}

#[derive(Debug, Default)]
struct Store {
    items: Vec<FeedItem>,
    next_id: u64,
}

/// Process-local store with a uniqueness constraint on `url`.
#[derive(Debug, Default)]
pub struct InMemoryFeedRepository {
    store: RwLock<Store>,
}

impl InMemoryFeedRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn validate(item: &NewFeedItem) -> Result<()> {
    if item.title.trim().is_empty() {
        return Err(IngestError::Validation("title is required".to_string()));
    }
    if item.description.trim().is_empty() {
        return Err(IngestError::Validation("description is required".to_string()));
    }
    if item.url.trim().is_empty() {
        return Err(IngestError::Validation("url is required".to_string()));
    }
    Ok(())
}

fn newest_first(items: &mut [FeedItem]) {
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}

#[async_trait]
impl FeedRepository for InMemoryFeedRepository {
    async fn find_by_url(&self, url: &str) -> Result<Option<FeedItem>> {
        let store = self.store.read().await;
        Ok(store.items.iter().find(|item| item.url == url).cloned())
    }

    async fn create(&self, item: NewFeedItem) -> Result<FeedItem> {
        validate(&item)?;
        let mut store = self.store.write().await;
        if store.items.iter().any(|existing| existing.url == item.url) {
            return Err(IngestError::DuplicateUrl { url: item.url });
        }
        store.next_id += 1;
        let now = Utc::now();
        let created = FeedItem {
            id: store.next_id,
            title: item.title,
            description: item.description,
            url: item.url,
            source: item.source,
            published_at: item.published_at,
            image_url: item.image_url,
            category: item.category,
            is_manual: item.is_manual,
            created_at: now,
            updated_at: now,
        };
        store.items.push(created.clone());
        Ok(created)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.store.read().await.items.len())
    }

    async fn find_by_source(&self, source: NewsSource) -> Result<Vec<FeedItem>> {
        let store = self.store.read().await;
        let mut items: Vec<FeedItem> = store
            .items
            .iter()
            .filter(|item| item.source == source)
            .cloned()
            .collect();
        newest_first(&mut items);
        Ok(items)
    }

    async fn find_todays_front_page(&self, source: NewsSource) -> Result<Vec<FeedItem>> {
        let today = Local::now().date_naive();
        let store = self.store.read().await;
        let mut items: Vec<FeedItem> = store
            .items
            .iter()
            .filter(|item| {
                item.source == source
                    && !item.is_manual
                    && item.published_at.with_timezone(&Local).date_naive() == today
            })
            .cloned()
            .collect();
        newest_first(&mut items);
        items.truncate(FRONT_PAGE_LIMIT);
        Ok(items)
    }

    async fn update(&self, id: u64, update: FeedItemUpdate) -> Result<Option<FeedItem>> {
        let mut store = self.store.write().await;
        if let Some(url) = &update.url {
            if store.items.iter().any(|item| item.id != id && &item.url == url) {
                return Err(IngestError::DuplicateUrl { url: url.clone() });
            }
        }
        let Some(item) = store.items.iter_mut().find(|item| item.id == id) else {
            return Ok(None);
        };
        if let Some(title) = update.title {
            item.title = title;
        }
        if let Some(description) = update.description {
            item.description = description;
        }
        if let Some(url) = update.url {
            item.url = url;
        }
        if let Some(source) = update.source {
            item.source = source;
        }
        if let Some(published_at) = update.published_at {
            item.published_at = published_at;
        }
        if let Some(image_url) = update.image_url {
            item.image_url = Some(image_url);
        }
        if let Some(category) = update.category {
            item.category = Some(category);
        }
        if let Some(is_manual) = update.is_manual {
            item.is_manual = is_manual;
        }
        item.updated_at = Utc::now();
        Ok(Some(item.clone()))
    }

    async fn delete(&self, id: u64) -> Result<bool> {
        let mut store = self.store.write().await;
        let before = store.items.len();
        store.items.retain(|item| item.id != id);
        Ok(store.items.len() != before)
    }

    async fn exists(&self, url: &str) -> Result<bool> {
        Ok(self.find_by_url(url).await?.is_some())
    }
}
