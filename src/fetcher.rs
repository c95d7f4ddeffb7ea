//! Document fetching and metadata extraction.
//!
//! [`DocumentFetcher`] issues one GET per article and pulls canonical metadata
//! out of the returned HTML through ordered fallback chains:
//!
//! | Field | Tried in order |
//! |-------|----------------|
//! | title | `og:title`, `twitter:title`, `<title>` |
//! | description | `og:description`, `twitter:description`, `description` |
//! | published | `article:published_time`, `pubdate`, `<time datetime>` |
//! | image | `og:image`, `twitter:image` |
//! | category | `article:section` |
//!
//! A page without a title or without a description is discarded. A page
//! without a parseable date is kept and stamped with the fetch time.
//!
//! HTTP goes through the [`HttpTransport`] trait so the pipeline can run
//! against [`ReqwestTransport`] in production and a scripted transport in tests.

use crate::config::FetchConfig;
use crate::error::{IngestError, Result};
use crate::models::ScrapedDocument;
use crate::utils::{collapse_whitespace, truncate_for_log};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Status and body of one GET.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// GET-only HTTP transport.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Fetch `url`. Non-2xx statuses are returned, not raised; only
    /// transport-level failures are errors.
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let accept = HeaderValue::from_str(&config.accept)
            .map_err(|e| IngestError::InvalidConfig(format!("accept header: {e}")))?;
        headers.insert(ACCEPT, accept);

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

/// Fetches pages and turns article pages into [`ScrapedDocument`]s.
#[derive(Clone)]
pub struct DocumentFetcher {
    transport: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for DocumentFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentFetcher").finish_non_exhaustive()
    }
}

impl DocumentFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Fetch raw HTML, treating any non-2xx status as an error.
    pub async fn fetch_html(&self, url: &str) -> Result<String> {
        let response = self.transport.get(url).await?;
        if !response.is_success() {
            return Err(IngestError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }
        Ok(response.body)
    }

    /// Fetch one article and extract its metadata.
    ///
    /// Returns `None` on transport errors, non-2xx responses and pages
    /// lacking a title or description. Failures are logged, never raised.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch(&self, url: &str) -> Option<ScrapedDocument> {
        let html = match self.fetch_html(url).await {
            Ok(html) => html,
            Err(e) => {
                error!(%url, error = %e, "Failed to fetch document");
                return None;
            }
        };
        let document = parse_document(&html, url);
        if document.is_none() {
            debug!(%url, preview = %truncate_for_log(&html, 200), "Document discarded");
        }
        document
    }
}

static OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());
static TWITTER_TITLE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[name="twitter:title"], meta[property="twitter:title"]"#).unwrap()
});
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());

static OG_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:description"]"#).unwrap());
static TWITTER_DESCRIPTION: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[name="twitter:description"], meta[property="twitter:description"]"#)
        .unwrap()
});
static META_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="description"]"#).unwrap());

static PUBLISHED_TIME: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="article:published_time"]"#).unwrap());
static PUBDATE: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"meta[name="pubdate"]"#).unwrap());
static TIME_DATETIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time[datetime]").unwrap());

static OG_IMAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:image"]"#).unwrap());
static TWITTER_IMAGE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[name="twitter:image"], meta[property="twitter:image"]"#).unwrap()
});
static ARTICLE_SECTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="article:section"]"#).unwrap());

/// Extract article metadata from `html`. Pure apart from reading the clock
/// for the published-time fallback.
pub fn parse_document(html: &str, url: &str) -> Option<ScrapedDocument> {
    let document = Html::parse_document(html);

    let Some(title) = extract_title(&document) else {
        warn!(%url, "No title found");
        return None;
    };
    let Some(description) = extract_description(&document) else {
        warn!(%url, "No description found");
        return None;
    };
    let published_at = extract_published_at(&document).unwrap_or_else(Utc::now);

    Some(ScrapedDocument {
        title,
        description,
        url: url.to_string(),
        published_at,
        image_url: first_attr(&document, &[&*OG_IMAGE, &*TWITTER_IMAGE], "content"),
        category: first_attr(&document, &[&*ARTICLE_SECTION], "content"),
    })
}

fn extract_title(document: &Html) -> Option<String> {
    first_attr(document, &[&*OG_TITLE, &*TWITTER_TITLE], "content").or_else(|| {
        document
            .select(&TITLE)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|text| !text.is_empty())
    })
}

fn extract_description(document: &Html) -> Option<String> {
    first_attr(
        document,
        &[&*OG_DESCRIPTION, &*TWITTER_DESCRIPTION, &*META_DESCRIPTION],
        "content",
    )
}

fn extract_published_at(document: &Html) -> Option<DateTime<Utc>> {
    let candidates = [
        (&*PUBLISHED_TIME, "content"),
        (&*PUBDATE, "content"),
        (&*TIME_DATETIME, "datetime"),
    ];
    candidates.iter().find_map(|(selector, attr)| {
        document
            .select(selector)
            .next()
            .and_then(|el| el.value().attr(attr))
            .and_then(parse_timestamp)
    })
}

/// First non-blank, trimmed value of `attr` across `selectors`, in order.
fn first_attr(document: &Html, selectors: &[&Selector], attr: &str) -> Option<String> {
    selectors.iter().find_map(|selector| {
        document
            .select(selector)
            .next()
            .and_then(|el| el.value().attr(attr))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}

/// Parse the timestamp formats news sites put in their markup.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // `%.f` also matches when the fraction is absent.
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubTransport;
    use chrono::TimeZone;

    const URL: &str = "https://elpais.com/espana/2025-05-06/articulo.html";

    #[test]
    fn test_og_title_wins_over_title_element() {
        let html = r#"<html><head>
            <title>Titulo del documento</title>
            <meta property="og:title" content="Titular OG">
            <meta name="twitter:title" content="Titular Twitter">
            <meta name="description" content="Entradilla">
        </head></html>"#;
        let doc = parse_document(html, URL).unwrap();
        assert_eq!(doc.title, "Titular OG");
        assert_eq!(doc.description, "Entradilla");
        assert_eq!(doc.url, URL);
    }

    #[test]
    fn test_twitter_then_title_fallback() {
        let html = r#"<head><meta name="twitter:title" content="Twitter"><meta name="description" content="d"></head>"#;
        assert_eq!(parse_document(html, URL).unwrap().title, "Twitter");

        let html = "<head><title>\n   Solo titulo \n</title><meta name=\"description\" content=\"d\"></head>";
        assert_eq!(parse_document(html, URL).unwrap().title, "Solo titulo");
    }

    #[test]
    fn test_description_precedence_and_trim() {
        let html = r#"<head><title>t</title>
            <meta name="description" content="generic">
            <meta name="twitter:description" content="  twitter  ">
        </head>"#;
        assert_eq!(parse_document(html, URL).unwrap().description, "twitter");
    }

    #[test]
    fn test_missing_description_discards_document() {
        let html = r#"<head><meta property="og:title" content="Titular"></head><body>texto</body>"#;
        assert!(parse_document(html, URL).is_none());
    }

    #[test]
    fn test_missing_title_discards_document() {
        let html = r#"<head><meta name="description" content="Entradilla"></head>"#;
        assert!(parse_document(html, URL).is_none());
    }

    #[test]
    fn test_published_time_chain() {
        let html = r#"<head><title>t</title><meta name="description" content="d">
            <meta property="article:published_time" content="no es una fecha">
            <meta name="pubdate" content="2025-05-06T08:30:00+02:00">
        </head><body><time datetime="2020-01-01">x</time></body>"#;
        let doc = parse_document(html, URL).unwrap();
        assert_eq!(
            doc.published_at,
            Utc.with_ymd_and_hms(2025, 5, 6, 6, 30, 0).unwrap()
        );

        let html = r#"<head><title>t</title><meta name="description" content="d"></head>
            <body><time datetime="2024-12-31">x</time></body>"#;
        let doc = parse_document(html, URL).unwrap();
        assert_eq!(
            doc.published_at,
            Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_missing_date_falls_back_to_now() {
        let before = Utc::now();
        let html = r#"<head><title>t</title><meta name="description" content="d"></head>"#;
        let doc = parse_document(html, URL).unwrap();
        let after = Utc::now();
        assert!(doc.published_at >= before && doc.published_at <= after);
    }

    #[test]
    fn test_optional_image_and_category() {
        let html = r#"<head><title>t</title><meta name="description" content="d">
            <meta property="og:image" content="https://img.elpais.com/a.jpg">
            <meta property="article:section" content="Política">
        </head>"#;
        let doc = parse_document(html, URL).unwrap();
        assert_eq!(doc.image_url.as_deref(), Some("https://img.elpais.com/a.jpg"));
        assert_eq!(doc.category.as_deref(), Some("Política"));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2025-05-06T08:30:00Z").is_some());
        assert!(parse_timestamp("Tue, 06 May 2025 08:30:00 +0200").is_some());
        assert!(parse_timestamp("2025-05-06T08:30:00+0200").is_some());
        assert!(parse_timestamp("2025-05-06 08:30:00").is_some());

        let expected = Utc.with_ymd_and_hms(2025, 5, 6, 6, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2025-05-06T08:30:00.000+0200"), Some(expected));
        assert_eq!(
            parse_timestamp("2025-05-06T08:30"),
            Some(Utc.with_ymd_and_hms(2025, 5, 6, 8, 30, 0).unwrap())
        );
        assert!(parse_timestamp("ayer").is_none());
        assert!(parse_timestamp("   ").is_none());
    }

    #[tokio::test]
    async fn test_fetch_returns_none_on_error_status() {
        let transport = StubTransport::new().page_with_status(URL, 503, "<title>t</title>");
        let fetcher = DocumentFetcher::new(Arc::new(transport));
        assert!(fetcher.fetch(URL).await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_returns_none_on_transport_error() {
        let fetcher = DocumentFetcher::new(Arc::new(StubTransport::new()));
        assert!(fetcher.fetch(URL).await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_parses_successful_page() {
        let transport = StubTransport::new().article(URL, "Titular", "Entradilla");
        let fetcher = DocumentFetcher::new(Arc::new(transport));
        let doc = fetcher.fetch(URL).await.unwrap();
        assert_eq!(doc.title, "Titular");
        assert_eq!(doc.description, "Entradilla");
    }
}
