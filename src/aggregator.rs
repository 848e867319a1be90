//! Pagination aggregation
//!
//! Follows "next page" links from a starting URL, collecting items from each page until
//! the listing runs out or a page/item cap is reached.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tracing::info;
use url::Url;

use crate::error::Result;
use crate::fetch::Loader;
use crate::value::Record;

/// A page that knows where it sits in a paginated listing
pub trait Paginated {
    fn current_page(&self) -> u32;

    fn total_pages(&self) -> u32;

    /// Next page link, `None` on the last page
    fn next_page_url(&self) -> Option<String>;
}

/// Typed view over a record extracted with a page schema
pub trait PageModel: Paginated + Sized {
    /// Schema type the page is extracted as
    const SCHEMA: &'static str;

    fn from_record(record: Record) -> Result<Self>;

    fn record(&self) -> &Record;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationOptions {
    pub max_pages: Option<u32>,
    pub max_items: Option<usize>,
    /// Relative pagination links are joined onto this URL
    pub base_url: Option<String>,
    pub delay_ms: u64,
}

impl AggregationOptions {
    /// Read `maxPages` / `maxItems` from query-string parameters.
    /// Missing or non-numeric values leave the cap unset.
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        Self {
            max_pages: params.get("maxPages").and_then(|v| v.trim().parse().ok()),
            max_items: params.get("maxItems").and_then(|v| v.trim().parse().ok()),
            ..Default::default()
        }
    }

    /// Caps from `params` on top of `self`
    pub fn with_query(self, params: &HashMap<String, String>) -> Self {
        let caps = Self::from_query(params);
        Self {
            max_pages: caps.max_pages.or(self.max_pages),
            max_items: caps.max_items.or(self.max_items),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationMetadata {
    /// Total reported by the last fetched page
    pub total_pages: u32,
    pub pages_fetched: u32,
    /// Whether the whole listing was collected
    pub complete: bool,
}

#[derive(Debug, Clone)]
pub struct AggregationResult<P, T> {
    pub items: Vec<T>,
    pub pages: Vec<P>,
    pub metadata: AggregationMetadata,
}

/// Fetch pages starting at `initial_url`, collecting `item_extractor`'s output from each
pub async fn aggregate<P, T, F>(
    loader: &Loader,
    initial_url: &str,
    item_extractor: F,
    options: &AggregationOptions,
) -> Result<AggregationResult<P, T>>
where
    P: PageModel,
    F: Fn(&P) -> Vec<T>,
{
    let max_pages = options.max_pages.unwrap_or(u32::MAX);
    let max_items = options.max_items.unwrap_or(usize::MAX);

    let mut pages: Vec<P> = Vec::new();
    let mut items = Vec::new();
    let mut pages_fetched = 0u32;
    let mut exhausted = false;
    let mut current_url = initial_url.to_string();

    if max_pages > 0 && max_items > 0 {
        loop {
            let page: P = loader.load(&current_url).await?;
            items.extend(item_extractor(&page));
            pages_fetched += 1;
            let next = page.next_page_url();
            pages.push(page);

            if items.len() >= max_items {
                break;
            }
            let Some(next) = next else {
                exhausted = true;
                break;
            };
            if pages_fetched >= max_pages {
                break;
            }

            current_url = resolve_url(&next, options.base_url.as_deref(), &current_url)?;
            if options.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(options.delay_ms)).await;
            }
        }
    }

    let total_pages = pages.last().map(Paginated::total_pages).unwrap_or(0);
    let collected = items.len();
    items.truncate(max_items);

    let complete = exhausted
        || (pages_fetched > 0 && pages_fetched >= total_pages && items.len() >= collected);

    info!(
        url = initial_url,
        pages_fetched,
        total_pages,
        items = items.len(),
        complete,
        "Aggregation finished"
    );

    Ok(AggregationResult {
        items,
        pages,
        metadata: AggregationMetadata {
            total_pages,
            pages_fetched,
            complete,
        },
    })
}

/// [`aggregate`] without the pages and metadata
pub async fn aggregate_items<P, T, F>(
    loader: &Loader,
    initial_url: &str,
    item_extractor: F,
    options: &AggregationOptions,
) -> Result<Vec<T>>
where
    P: PageModel,
    F: Fn(&P) -> Vec<T>,
{
    Ok(aggregate(loader, initial_url, item_extractor, options)
        .await?
        .items)
}

/// Absolute links are kept; relative ones join onto `base_url`, else the current page
fn resolve_url(next: &str, base_url: Option<&str>, current: &str) -> Result<String> {
    if next.starts_with("http") {
        return Ok(next.to_string());
    }
    let base = Url::parse(base_url.unwrap_or(current))?;
    Ok(base.join(next)?.to_string())
}
