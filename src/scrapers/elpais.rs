//! El País front-page extractor.
//!
//! Articles are linked from [elpais.com](https://elpais.com) with relative
//! URLs such as `/espana/2025-05-06/slug.html`; only the news sections listed
//! in [`PROFILE`] are kept.

use super::{NewspaperProfile, SourceExtractor, discover_front_page_urls, fetch_articles};
use crate::fetcher::DocumentFetcher;
use crate::models::{NewFeedItem, NewsSource};
use async_trait::async_trait;
use tracing::{info, instrument, warn};

pub const PROFILE: NewspaperProfile = NewspaperProfile {
    name: "El País",
    source: NewsSource::ElPais,
    base_url: "https://elpais.com",
    front_page_url: "https://elpais.com",
    sections: &["/politica/", "/economia/", "/sociedad/", "/internacional/", "/espana/"],
    enabled: true,
};

#[derive(Debug, Clone)]
pub struct ElPaisExtractor {
    fetcher: DocumentFetcher,
}

impl ElPaisExtractor {
    pub fn new(fetcher: DocumentFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl SourceExtractor for ElPaisExtractor {
    fn name(&self) -> &str {
        PROFILE.name
    }

    fn source(&self) -> NewsSource {
        PROFILE.source
    }

    fn is_enabled(&self) -> bool {
        PROFILE.enabled
    }

    async fn discover_urls(&self) -> Vec<String> {
        discover_front_page_urls(&self.fetcher, &PROFILE).await
    }

    #[instrument(level = "info", skip_all)]
    async fn extract_news(&self) -> Vec<NewFeedItem> {
        let urls = self.discover_urls().await;
        if urls.is_empty() {
            warn!(source = PROFILE.name, "No URLs found");
            return Vec::new();
        }
        info!(source = PROFILE.name, count = urls.len(), "Found front page articles");
        fetch_articles(&self.fetcher, PROFILE.source, urls).await
    }
}
