//! Page fetching and loading
//!
//! [`Fetch`] is the seam between the scraper and the network. [`HttpFetcher`] is the
//! production implementation; tests use `MockFetcher` (behind the `test-util` feature).
//! A [`Loader`] pairs a fetcher with an [`Extractor`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use tracing::debug;

use crate::aggregator::PageModel;
use crate::availability::{self, ClassifiedPage};
use crate::config::ScraperConfig;
use crate::engine::Extractor;
use crate::error::{Error, Result};
use crate::schema::SchemaRegistry;
use crate::value::Record;

/// Raw upstream response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Retrieves a page. Transport failures are errors; HTTP statuses are not.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchResponse>;
}

/// `reqwest`-backed fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpFetcher {
    /// Desktop fetcher using the configured user agent and timeout
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        Self::with_user_agent(config, &config.user_agent)
    }

    /// Fetcher presenting the mobile user agent
    pub fn mobile(config: &ScraperConfig) -> Result<Self> {
        Self::with_user_agent(config, &config.mobile_user_agent)
    }

    fn with_user_agent(config: &ScraperConfig, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|source| Error::Fetch {
                url: config.base_url.clone(),
                source,
            })?;

        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        debug!(url, "Fetching URL");

        let to_error = |source| Error::Fetch {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(to_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(to_error)?;

        Ok(FetchResponse {
            url: url.to_string(),
            status,
            body,
        })
    }
}

/// Fetches pages and extracts records from them
#[derive(Clone)]
pub struct Loader {
    fetcher: Arc<dyn Fetch>,
    extractor: Extractor,
}

impl Loader {
    pub fn new(fetcher: Arc<dyn Fetch>, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            fetcher,
            extractor: Extractor::new(registry),
        }
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    pub fn registry(&self) -> &SchemaRegistry {
        self.extractor.registry()
    }

    /// Fetch a page, failing on any non-2xx status
    pub async fn fetch_page(&self, url: &str) -> Result<FetchResponse> {
        let response = self.fetcher.fetch(url).await?;
        if !response.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status: response.status,
            });
        }
        Ok(response)
    }

    /// Fetch a page and extract a record of `type_name` from it
    pub async fn load_record(&self, url: &str, type_name: &str) -> Result<Record> {
        let response = self.fetch_page(url).await?;
        self.extractor.load_from_str(&response.body, type_name)
    }

    /// Fetch a page and wrap it in a typed page model
    pub async fn load<P: PageModel>(&self, url: &str) -> Result<P> {
        let record = self.load_record(url, P::SCHEMA).await?;
        P::from_record(record)
    }

    /// Fetch a page, classify its availability and extract it regardless of status
    pub async fn load_with_availability(
        &self,
        url: &str,
        type_name: &str,
    ) -> Result<ClassifiedPage> {
        let response = self.fetcher.fetch(url).await?;
        availability::classify_response(&self.extractor, &response, type_name)
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("extractor", &self.extractor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ExtractionRule, TypeDef};
    use crate::testing::MockFetcher;

    fn loader(fetcher: MockFetcher) -> Loader {
        let mut registry = SchemaRegistry::new();
        registry.register(
            TypeDef::new("Title").rule(ExtractionRule::new("title", "//h1/text()")),
        );
        Loader::new(Arc::new(fetcher), Arc::new(registry))
    }

    #[tokio::test]
    async fn test_load_record() {
        let fetcher = MockFetcher::new().with_page("https://x.test/a", "<h1> Hello </h1>");
        let record = loader(fetcher)
            .load_record("https://x.test/a", "Title")
            .await
            .unwrap();
        assert_eq!(record.str("title"), Some("Hello"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let fetcher = MockFetcher::new().with_status("https://x.test/gone", 410, "gone");
        let err = loader(fetcher)
            .load_record("https://x.test/gone", "Title")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Status { status: 410, .. }));
        assert_eq!(err.to_string(), "Failed to fetch https://x.test/gone: 410");
    }

    #[test]
    fn test_http_fetcher_builds_from_config() {
        let config = ScraperConfig::default();
        assert!(HttpFetcher::new(&config).is_ok());
        assert_eq!(
            HttpFetcher::mobile(&config).unwrap().user_agent,
            config.mobile_user_agent
        );
    }
}
