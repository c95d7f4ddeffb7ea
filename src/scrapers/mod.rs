//! Per-newspaper URL discovery and extraction.
//!
//! Every newspaper is an independent struct implementing [`SourceExtractor`],
//! and [`ExtractorRegistry`] maps a [`NewsSource`] to its extractor. Each
//! extractor follows the same two-phase pattern:
//!
//! 1. **Discovery**: fetch the front page, collect anchor targets under the
//!    newspaper's relevant sections, resolve them against the base URL,
//!    de-duplicate and keep at most [`MAX_DISCOVERED_URLS`].
//! 2. **Extraction**: run each discovered URL through the [`DocumentFetcher`],
//!    dropping pages that fail to fetch or parse.
//!
//! # Supported Sources
//!
//! | Source | Module | Sections |
//! |--------|--------|----------|
//! | El País | [`elpais`] | politica, economia, sociedad, internacional, espana |
//! | El Mundo | [`elmundo`] | espana, internacional, economia, sociedad, politica |

pub mod elmundo;
pub mod elpais;

use crate::fetcher::DocumentFetcher;
use crate::models::{NewFeedItem, NewsSource};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Upper bound on article URLs taken from one front page.
pub const MAX_DISCOVERED_URLS: usize = 20;

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// Static description of one newspaper.
#[derive(Debug, Clone, PartialEq)]
pub struct NewspaperProfile {
    pub name: &'static str,
    pub source: NewsSource,
    pub base_url: &'static str,
    pub front_page_url: &'static str,
    /// Path prefixes of the sections worth ingesting, e.g. `/politica/`.
    pub sections: &'static [&'static str],
    pub enabled: bool,
}

/// Discovery and extraction for one news source.
#[async_trait]
pub trait SourceExtractor: Send + Sync {
    fn name(&self) -> &str;

    fn source(&self) -> NewsSource;

    fn is_enabled(&self) -> bool;

    /// Article URLs currently linked from the front page.
    /// A failed front-page fetch yields an empty list.
    async fn discover_urls(&self) -> Vec<String>;

    /// Discover and fetch front-page articles, returning only the pages
    /// whose metadata could be extracted.
    async fn extract_news(&self) -> Vec<NewFeedItem>;
}

/// Resolves sources to their extractors.
#[derive(Debug, Clone)]
pub struct ExtractorRegistry {
    fetcher: DocumentFetcher,
}

impl ExtractorRegistry {
    pub fn new(fetcher: DocumentFetcher) -> Self {
        Self { fetcher }
    }

    /// The extractor for `source`, or `None` (logged) when the source has none.
    pub fn create(&self, source: NewsSource) -> Option<Box<dyn SourceExtractor>> {
        match source {
            NewsSource::ElPais => Some(Box::new(elpais::ElPaisExtractor::new(self.fetcher.clone()))),
            NewsSource::ElMundo => Some(Box::new(elmundo::ElMundoExtractor::new(self.fetcher.clone()))),
            NewsSource::Manual => {
                warn!(%source, "No extractor available for source");
                None
            }
        }
    }

    /// One extractor per known newspaper.
    pub fn all(&self) -> Vec<Box<dyn SourceExtractor>> {
        NewsSource::ALL
            .into_iter()
            .filter(|source| *source != NewsSource::Manual)
            .filter_map(|source| self.create(source))
            .collect()
    }
}

/// Fetch `profile`'s front page and collect its relevant article URLs.
#[instrument(level = "info", skip_all, fields(source = %profile.source))]
pub async fn discover_front_page_urls(
    fetcher: &DocumentFetcher,
    profile: &NewspaperProfile,
) -> Vec<String> {
    let html = match fetcher.fetch_html(profile.front_page_url).await {
        Ok(html) => html,
        Err(e) => {
            error!(url = profile.front_page_url, error = %e, "Front page fetch failed");
            return Vec::new();
        }
    };
    let urls = front_page_links(&html, profile);
    info!(count = urls.len(), url = profile.front_page_url, "Indexed front page article URLs");
    debug!(urls = ?urls, "Front page URLs");
    urls
}

/// Extract relevant, absolute, de-duplicated article URLs from front-page markup.
pub fn front_page_links(html: &str, profile: &NewspaperProfile) -> Vec<String> {
    let base = match Url::parse(profile.base_url) {
        Ok(base) => base,
        Err(e) => {
            error!(base_url = profile.base_url, error = %e, "Invalid base URL");
            return Vec::new();
        }
    };
    let document = Html::parse_document(html);

    document
        .select(&ANCHOR)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .filter(|url| {
            profile
                .sections
                .iter()
                .any(|section| url.path().starts_with(section))
        })
        .map(|mut url| {
            url.set_fragment(None);
            url.to_string()
        })
        .unique()
        .take(MAX_DISCOVERED_URLS)
        .collect()
}

/// Fetch every URL in turn, keeping the pages with usable metadata.
#[instrument(level = "info", skip_all, fields(%source, count = urls.len()))]
pub async fn fetch_articles(
    fetcher: &DocumentFetcher,
    source: NewsSource,
    urls: Vec<String>,
) -> Vec<NewFeedItem> {
    let items: Vec<NewFeedItem> = stream::iter(urls)
        .then(|url: String| async move {
            match fetcher.fetch(&url).await {
                Some(document) => {
                    debug!(%url, "Fetched article");
                    Some(NewFeedItem::from_document(document, source))
                }
                None => {
                    warn!(%url, "Article produced no metadata");
                    None
                }
            }
        })
        .filter_map(std::future::ready)
        .collect()
        .await;

    info!(count = items.len(), "Fetched article metadata");
    items
}
