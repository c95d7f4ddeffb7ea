//! Scripted collaborators shared by unit tests.

use crate::error::{IngestError, Result};
use crate::fetcher::{HttpResponse, HttpTransport};
use crate::models::{FeedItem, FeedItemUpdate, NewFeedItem, NewsSource};
use crate::repository::{FeedRepository, InMemoryFeedRepository};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

/// Minimal article page carrying an `og:title` and a meta description.
pub fn article_html(title: &str, description: &str) -> String {
    format!(
        r#"<html><head>
<meta property="og:title" content="{title}">
<meta name="description" content="{description}">
<meta property="article:published_time" content="2025-05-06T08:30:00+02:00">
</head><body><p>{description}</p></body></html>"#
    )
}

/// Transport answering from a fixed URL table. Unknown URLs fail at the
/// transport level, like a refused connection.
#[derive(Debug, Default)]
pub struct StubTransport {
    pages: HashMap<String, HttpResponse>,
    requests: Mutex<Vec<String>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, html: impl Into<String>) -> Self {
        self.page_with_status(url, 200, html)
    }

    pub fn page_with_status(mut self, url: &str, status: u16, html: impl Into<String>) -> Self {
        self.pages.insert(
            url.to_string(),
            HttpResponse {
                status,
                body: html.into(),
            },
        );
        self
    }

    pub fn article(self, url: &str, title: &str, description: &str) -> Self {
        self.page(url, article_html(title, description))
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(url.to_string());
        self.pages.get(url).cloned().ok_or_else(|| {
            IngestError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("no route to {url}"),
            ))
        })
    }
}

/// In-memory store whose lookups fail for URLs containing `poison`,
/// standing in for a database that errors mid-batch.
#[derive(Debug)]
pub struct FlakyRepository {
    inner: InMemoryFeedRepository,
    poison: String,
}

impl FlakyRepository {
    pub fn failing_on(poison: &str) -> Self {
        Self {
            inner: InMemoryFeedRepository::new(),
            poison: poison.to_string(),
        }
    }
}

#[async_trait]
impl FeedRepository for FlakyRepository {
    async fn find_by_url(&self, url: &str) -> Result<Option<FeedItem>> {
        if url.contains(&self.poison) {
            return Err(IngestError::Storage("connection reset".to_string()));
        }
        self.inner.find_by_url(url).await
    }
    async fn create(&self, item: NewFeedItem) -> Result<FeedItem> {
        self.inner.create(item).await
    }
    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
    async fn find_by_source(&self, source: NewsSource) -> Result<Vec<FeedItem>> {
        self.inner.find_by_source(source).await
    }
    async fn find_todays_front_page(&self, source: NewsSource) -> Result<Vec<FeedItem>> {
        self.inner.find_todays_front_page(source).await
    }
    async fn update(&self, id: u64, update: FeedItemUpdate) -> Result<Option<FeedItem>> {
        self.inner.update(id, update).await
    }
    async fn delete(&self, id: u64) -> Result<bool> {
        self.inner.delete(id).await
    }
    async fn exists(&self, url: &str) -> Result<bool> {
        self.inner.exists(url).await
    }
}
