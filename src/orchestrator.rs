//! Concurrent ingestion across URLs and sources.
//!
//! [`IngestionOrchestrator`] fans fetch work out over a bounded number of
//! concurrent requests, turns the extracted metadata into items, pushes them
//! through the dedupe gate and rolls the outcomes up into [`ScrapingResult`]s.
//!
//! Failure isolation:
//! - one URL failing to fetch or parse never affects the other URLs of a batch
//! - one source raising an error never aborts the other sources of a cycle;
//!   its entry becomes `{failed: 1}` with the error message recorded

use crate::config::{FetchConfig, SourceConfig, default_source_configs};
use crate::error::Result;
use crate::fetcher::DocumentFetcher;
use crate::models::{ItemOutcome, NewFeedItem, NewsSource, ScrapingResult};
use crate::repository::{FeedRepository, process_feed_batch};
use crate::scrapers::ExtractorRegistry;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// The ingestion operations the scheduler drives.
#[async_trait]
pub trait SourceIngestor: Send + Sync {
    async fn scrape_from_source(&self, config: &SourceConfig) -> Result<ScrapingResult>;

    /// Scrape every config, keyed by config name. An `Err` means the whole
    /// batch could not run; per-source failures are reported inside the map.
    async fn scrape_from_multiple_sources(
        &self,
        configs: &[SourceConfig],
    ) -> Result<BTreeMap<String, ScrapingResult>>;
}

pub struct IngestionOrchestrator {
    fetcher: DocumentFetcher,
    registry: ExtractorRegistry,
    repository: Arc<dyn FeedRepository>,
    max_concurrent_fetches: usize,
    max_concurrent_sources: usize,
}

impl IngestionOrchestrator {
    pub fn new(
        fetcher: DocumentFetcher,
        repository: Arc<dyn FeedRepository>,
        config: &FetchConfig,
    ) -> Self {
        Self {
            registry: ExtractorRegistry::new(fetcher.clone()),
            fetcher,
            repository,
            max_concurrent_fetches: config.max_concurrent_fetches.max(1),
            max_concurrent_sources: config.max_concurrent_sources.max(1),
        }
    }

    /// The known, always-enabled source set.
    pub fn default_source_configs() -> Vec<SourceConfig> {
        default_source_configs()
    }

    /// Number of items currently stored.
    pub async fn feed_count(&self) -> Result<usize> {
        self.repository.count().await
    }

    /// Fetch every URL concurrently and persist what could be extracted.
    ///
    /// URLs that never reach the dedupe gate become [`ItemOutcome::Failed`]
    /// with the URL in the reason; outcomes keep input order. When nothing
    /// could be extracted the store is not touched at all. Persistence errors
    /// propagate.
    #[instrument(level = "info", skip_all, fields(%source, count = urls.len()))]
    pub async fn scrape_from_urls(&self, urls: &[String], source: NewsSource) -> Result<ScrapingResult> {
        info!("Starting web scraping from URLs");

        let fetched: Vec<(String, Option<NewFeedItem>)> = stream::iter(urls.iter().cloned())
            .map(|url| {
                let fetcher = &self.fetcher;
                async move {
                    let item = fetcher
                        .fetch(&url)
                        .await
                        .map(|document| NewFeedItem::from_document(document, source));
                    (url, item)
                }
            })
            .buffered(self.max_concurrent_fetches)
            .collect()
            .await;

        // `None` slots are filled from the persisted outcomes, in order.
        let mut slots: Vec<Option<ItemOutcome>> = Vec::with_capacity(fetched.len());
        let mut items = Vec::new();
        for (url, item) in fetched {
            match item {
                Some(item) => {
                    items.push(item);
                    slots.push(None);
                }
                None => slots.push(Some(ItemOutcome::Failed(format!(
                    "Failed to extract metadata from {url}"
                )))),
            }
        }

        if items.is_empty() {
            warn!("No items scraped from URLs");
            return Ok(ScrapingResult::from_outcomes(slots.into_iter().flatten()));
        }

        let mut persisted = process_feed_batch(self.repository.as_ref(), items)
            .await?
            .into_iter();
        let outcomes = slots
            .into_iter()
            .filter_map(|slot| slot.or_else(|| persisted.next()));
        Ok(ScrapingResult::from_outcomes(outcomes))
    }

    /// Scrape one configured source.
    ///
    /// Disabled sources return an empty result without any fetch. Seed URLs
    /// are used when present; otherwise the source's front page is crawled.
    #[instrument(level = "info", skip_all, fields(source = %config.name))]
    pub async fn scrape_from_source(&self, config: &SourceConfig) -> Result<ScrapingResult> {
        if !config.enabled {
            info!("Skipping disabled source");
            return Ok(ScrapingResult::empty());
        }

        info!("Starting content scraping for source");
        let mut total = ScrapingResult::empty();

        let urls = match &config.urls {
            Some(urls) if !urls.is_empty() => urls.clone(),
            _ => self.discover(config.source).await,
        };
        if !urls.is_empty() {
            total.merge(self.scrape_from_urls(&urls, config.source).await?);
        }

        info!(
            success = total.success,
            failed = total.failed,
            duplicates = total.duplicates,
            "Completed scraping for source"
        );
        Ok(total)
    }

    /// Scrape all configs concurrently; one source's error never aborts the rest.
    #[instrument(level = "info", skip_all, fields(count = configs.len()))]
    pub async fn scrape_from_multiple_sources(
        &self,
        configs: &[SourceConfig],
    ) -> BTreeMap<String, ScrapingResult> {
        info!("Starting batch scraping");

        let entries: Vec<(String, ScrapingResult)> = stream::iter(configs.iter().cloned())
            .map(|config| async move {
                let result = match self.scrape_from_source(&config).await {
                    Ok(result) => result,
                    Err(e) => {
                        error!(source = %config.name, error = %e, "Error scraping source");
                        ScrapingResult::source_failure(format!(
                            "Error scraping source {}: {e}",
                            config.name
                        ))
                    }
                };
                (config.name, result)
            })
            .buffer_unordered(self.max_concurrent_sources)
            .collect()
            .await;

        let results: BTreeMap<String, ScrapingResult> = entries.into_iter().collect();
        let total = ScrapingResult::total(results.values());
        info!(
            success = total.success,
            failed = total.failed,
            duplicates = total.duplicates,
            "Batch scraping completed"
        );
        results
    }

    /// Ingest a newspaper through its extractor's own `extract_news`.
    #[instrument(level = "info", skip(self))]
    pub async fn extract_from_newspaper(&self, source: NewsSource) -> ScrapingResult {
        let Some(extractor) = self.registry.create(source) else {
            let message = format!("No extractor found for source: {source}");
            error!("{message}");
            return ScrapingResult::source_failure(message);
        };
        if !extractor.is_enabled() {
            info!(name = extractor.name(), "Skipping disabled extractor");
            return ScrapingResult::empty();
        }

        let items = extractor.extract_news().await;
        if items.is_empty() {
            warn!(name = extractor.name(), "No news items extracted");
            return ScrapingResult::empty();
        }

        match process_feed_batch(self.repository.as_ref(), items).await {
            Ok(outcomes) => {
                let result = ScrapingResult::from_outcomes(outcomes);
                info!(
                    name = extractor.name(),
                    success = result.success,
                    duplicates = result.duplicates,
                    "Completed extraction"
                );
                result
            }
            Err(e) => {
                let message = format!("Error extracting from {}: {e}", extractor.name());
                error!("{message}");
                ScrapingResult::source_failure(message)
            }
        }
    }

    /// Run [`Self::extract_from_newspaper`] for every enabled newspaper in turn.
    pub async fn extract_from_all_newspapers(&self) -> BTreeMap<NewsSource, ScrapingResult> {
        let mut results = BTreeMap::new();
        for extractor in self.registry.all() {
            if !extractor.is_enabled() {
                info!(name = extractor.name(), "Skipping disabled newspaper");
                continue;
            }
            let source = extractor.source();
            results.insert(source, self.extract_from_newspaper(source).await);
        }
        let total = ScrapingResult::total(results.values());
        info!(
            success = total.success,
            failed = total.failed,
            duplicates = total.duplicates,
            "Batch extraction completed"
        );
        results
    }

    async fn discover(&self, source: NewsSource) -> Vec<String> {
        match self.registry.create(source) {
            Some(extractor) => extractor.discover_urls().await,
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl SourceIngestor for IngestionOrchestrator {
    async fn scrape_from_source(&self, config: &SourceConfig) -> Result<ScrapingResult> {
        IngestionOrchestrator::scrape_from_source(self, config).await
    }

    async fn scrape_from_multiple_sources(
        &self,
        configs: &[SourceConfig],
    ) -> Result<BTreeMap<String, ScrapingResult>> {
        Ok(IngestionOrchestrator::scrape_from_multiple_sources(self, configs).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryFeedRepository;
    use crate::testing::{FlakyRepository, StubTransport};

    const UNO: &str = "https://elpais.com/espana/2025-05-06/uno.html";
    const DOS: &str = "https://elpais.com/espana/2025-05-06/dos.html";
    const MUNDO: &str = "https://elmundo.es/espana/2025/05/06/tres.html";

    fn orchestrator(
        transport: StubTransport,
        repository: Arc<dyn FeedRepository>,
    ) -> (IngestionOrchestrator, Arc<StubTransport>) {
        let transport = Arc::new(transport);
        let fetcher = DocumentFetcher::new(transport.clone());
        let orchestrator = IngestionOrchestrator::new(fetcher, repository, &FetchConfig::default());
        (orchestrator, transport)
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|u| u.to_string()).collect()
    }

    #[tokio::test]
    async fn test_batch_partial_failure_isolation() {
        let repo = Arc::new(InMemoryFeedRepository::new());
        let (orch, _) = orchestrator(StubTransport::new().article(UNO, "Uno", "Primera"), repo.clone());

        let result = orch.scrape_from_urls(&urls(&[UNO, DOS]), NewsSource::ElPais).await.unwrap();
        assert_eq!(result.counts(), (1, 1, 0));
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].as_ref().unwrap().url, UNO);
        assert_eq!(result.errors, vec![format!("Failed to extract metadata from {DOS}")]);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_all_failed_batch_skips_persistence() {
        // Every lookup would error, so reaching the store would surface as Err.
        let repo = Arc::new(FlakyRepository::failing_on("elpais.com"));
        let (orch, _) = orchestrator(StubTransport::new(), repo);

        let result = orch.scrape_from_urls(&urls(&[UNO, DOS]), NewsSource::ElPais).await.unwrap();
        assert_eq!(result.counts(), (0, 2, 0));
        assert!(result.items.is_empty());
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].ends_with(UNO));
        assert!(result.errors[1].ends_with(DOS));
    }

    #[tokio::test]
    async fn test_existing_url_counts_as_duplicate() {
        let repo = Arc::new(InMemoryFeedRepository::new());
        let (orch, _) = orchestrator(
            StubTransport::new().article(UNO, "Uno", "Primera").article(DOS, "Dos", "Segunda"),
            repo.clone(),
        );

        orch.scrape_from_urls(&urls(&[UNO]), NewsSource::ElPais).await.unwrap();
        let result = orch.scrape_from_urls(&urls(&[UNO, DOS]), NewsSource::ElPais).await.unwrap();
        assert_eq!(result.counts(), (1, 0, 1));
        assert_eq!(result.items.len(), 2);
        assert!(result.items[0].is_none());
        assert_eq!(result.items[1].as_ref().unwrap().url, DOS);
    }

    #[tokio::test]
    async fn test_disabled_source_never_fetches() {
        let repo = Arc::new(InMemoryFeedRepository::new());
        let (orch, transport) = orchestrator(StubTransport::new().article(UNO, "Uno", "Primera"), repo);

        let config = SourceConfig::new(NewsSource::ElPais)
            .with_urls(urls(&[UNO]))
            .disabled();
        let result = orch.scrape_from_source(&config).await.unwrap();
        assert_eq!(result, ScrapingResult::empty());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_source_with_seed_urls() {
        let repo = Arc::new(InMemoryFeedRepository::new());
        let (orch, transport) = orchestrator(StubTransport::new().article(UNO, "Uno", "Primera"), repo);

        let config = SourceConfig::new(NewsSource::ElPais).with_urls(urls(&[UNO]));
        let result = orch.scrape_from_source(&config).await.unwrap();
        assert_eq!(result.counts(), (1, 0, 0));
        let stored = result.items[0].as_ref().unwrap();
        assert_eq!(stored.source, NewsSource::ElPais);
        assert!(!stored.is_manual);
        assert_eq!(transport.requests(), vec![UNO.to_string()]);
    }

    #[tokio::test]
    async fn test_source_without_seeds_crawls_front_page() {
        let front = r#"<a href="/espana/2025-05-06/uno.html">Uno</a><a href="/gente/x.html">x</a>"#;
        let repo = Arc::new(InMemoryFeedRepository::new());
        let (orch, _) = orchestrator(
            StubTransport::new()
                .page("https://elpais.com", front)
                .article(UNO, "Uno", "Primera"),
            repo,
        );

        let result = orch
            .scrape_from_source(&SourceConfig::new(NewsSource::ElPais))
            .await
            .unwrap();
        assert_eq!(result.counts(), (1, 0, 0));
    }

    #[tokio::test]
    async fn test_persistence_error_propagates_from_source() {
        let repo = Arc::new(FlakyRepository::failing_on("elpais.com"));
        let (orch, _) = orchestrator(StubTransport::new().article(UNO, "Uno", "Primera"), repo);

        let config = SourceConfig::new(NewsSource::ElPais).with_urls(urls(&[UNO]));
        assert!(orch.scrape_from_source(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_multiple_sources_isolate_failures() {
        let repo = Arc::new(FlakyRepository::failing_on("elpais.com"));
        let (orch, _) = orchestrator(
            StubTransport::new()
                .article(UNO, "Uno", "Primera")
                .article(MUNDO, "Tres", "Tercera"),
            repo,
        );

        let mut archive = SourceConfig::new(NewsSource::ElMundo).disabled();
        archive.name = "El Mundo (archivo)".to_string();
        let configs = vec![
            SourceConfig::new(NewsSource::ElPais).with_urls(urls(&[UNO])),
            SourceConfig::new(NewsSource::ElMundo).with_urls(urls(&[MUNDO])),
            archive,
        ];

        let results = orch.scrape_from_multiple_sources(&configs).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results["El País"].counts(), (0, 1, 0));
        assert_eq!(results["El País"].errors.len(), 1);
        assert_eq!(results["El Mundo"].counts(), (1, 0, 0));
        assert_eq!(results["El Mundo (archivo)"], ScrapingResult::empty());
    }

    #[tokio::test]
    async fn test_extract_from_newspaper() {
        let front = r#"<a href="/internacional/2025/05/06/tres.html">Tres</a>"#;
        let repo = Arc::new(InMemoryFeedRepository::new());
        let (orch, _) = orchestrator(
            StubTransport::new()
                .page("https://elmundo.es", front)
                .article("https://elmundo.es/internacional/2025/05/06/tres.html", "Tres", "Tercera"),
            repo.clone(),
        );

        let result = orch.extract_from_newspaper(NewsSource::ElMundo).await;
        assert_eq!(result.counts(), (1, 0, 0));

        let again = orch.extract_from_newspaper(NewsSource::ElMundo).await;
        assert_eq!(again.counts(), (0, 0, 1));
        assert_eq!(orch.feed_count().await.unwrap(), 1);

        let manual = orch.extract_from_newspaper(NewsSource::Manual).await;
        assert_eq!(manual.counts(), (0, 1, 0));
        assert!(manual.errors[0].contains("No extractor found"));
    }

    #[tokio::test]
    async fn test_extract_from_all_newspapers_keys_by_source() {
        let repo = Arc::new(InMemoryFeedRepository::new());
        let (orch, _) = orchestrator(StubTransport::new(), repo);

        let results = orch.extract_from_all_newspapers().await;
        let sources: Vec<NewsSource> = results.keys().copied().collect();
        assert_eq!(sources, vec![NewsSource::ElPais, NewsSource::ElMundo]);
        assert!(results.values().all(|r| r.counts() == (0, 0, 0)));
    }

    #[test]
    fn test_default_source_configs() {
        let configs = IngestionOrchestrator::default_source_configs();
        let names: Vec<&str> = configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["El País", "El Mundo"]);
        assert!(configs.iter().all(|c| c.enabled));
    }
}
