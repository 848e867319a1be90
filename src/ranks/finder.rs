use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use super::{first_rank, last_rank, same_rank, RankEntry, RankTracker, RankedPage};
use crate::aggregator::PageModel;
use crate::config::DEFAULT_BASE_URL;
use crate::error::{Error, Result};
use crate::fetch::Loader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankScanOptions {
    pub base_url: String,
    /// Pause after every page actually fetched
    pub delay_ms: u64,
    /// Upper bound on pages fetched in order before bisection starts
    pub preload_pages: u32,
}

impl Default for RankScanOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            delay_ms: 50,
            preload_pages: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanMetadata {
    pub total_pages: u32,
    /// Pages actually fetched, in fetch order
    pub pages_checked: Vec<u32>,
}

/// Discovered ranks. Member counts only cover the pages that were fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankScanResult {
    pub ranks: Vec<RankEntry>,
    pub metadata: ScanMetadata,
}

/// Finds every rank of a member listing while fetching as few pages as possible
///
/// Page 1 gives the page count. A few leading pages are preloaded while the last
/// member's rank differs from the first rank of the final page. The remaining range is
/// then bisected on first-member ranks, skipping any span whose two ends share a rank.
pub struct RankFinder<'l, P> {
    loader: &'l Loader,
    member_url: String,
    options: RankScanOptions,
    tracker: RankTracker,
    cache: HashMap<u32, P>,
    checked: Vec<u32>,
}

impl<'l, P: PageModel + RankedPage> RankFinder<'l, P> {
    pub fn new(loader: &'l Loader, collection_id: &str, options: RankScanOptions) -> Self {
        let member_url = format!(
            "{}/lodestone/freecompany/{}/member",
            options.base_url.trim_end_matches('/'),
            collection_id
        );

        Self {
            loader,
            member_url,
            options,
            tracker: RankTracker::new(),
            cache: HashMap::new(),
            checked: Vec::new(),
        }
    }

    pub fn page_url(&self, page: u32) -> String {
        if page == 1 {
            self.member_url.clone()
        } else {
            format!("{}?page={}", self.member_url, page)
        }
    }

    pub async fn scan(mut self) -> Result<RankScanResult> {
        self.fetch(1).await?;
        let total_pages = self.cached(1)?.total_pages();

        if total_pages > 1 {
            self.preload(total_pages).await?;

            let limit = self.preload_limit(total_pages);
            let mut start = 1;
            while start < limit && self.cache.contains_key(&(start + 1)) {
                start += 1;
            }
            self.search_range(start, total_pages).await?;
        }

        info!(
            url = %self.member_url,
            total_pages,
            pages_checked = self.checked.len(),
            "Rank scan finished"
        );

        Ok(RankScanResult {
            ranks: self.tracker.sorted(),
            metadata: ScanMetadata {
                total_pages,
                pages_checked: self.checked,
            },
        })
    }

    fn preload_limit(&self, total_pages: u32) -> u32 {
        self.options.preload_pages.min(total_pages.saturating_sub(1))
    }

    async fn preload(&mut self, total_pages: u32) -> Result<()> {
        let limit = self.preload_limit(total_pages);
        let mut current = 1;

        while current < limit {
            self.fetch(total_pages).await?;
            let tail = last_rank(self.cached(current)?);
            let end_head = first_rank(self.cached(total_pages)?);
            if same_rank(tail.as_ref(), end_head.as_ref()) {
                break;
            }

            current += 1;
            self.fetch(current).await?;
        }

        Ok(())
    }

    /// Bisect `[start, end]`, left half before right half
    async fn search_range(&mut self, start: u32, end: u32) -> Result<()> {
        let mut pending = vec![(start, end)];

        while let Some((start, end)) = pending.pop() {
            if start >= end {
                continue;
            }
            self.fetch(start).await?;
            self.fetch(end).await?;
            if end - start <= 1 {
                continue;
            }

            let start_head = first_rank(self.cached(start)?);
            let start_tail = last_rank(self.cached(start)?);
            let end_head = first_rank(self.cached(end)?);
            if same_rank(start_head.as_ref(), end_head.as_ref())
                || same_rank(start_tail.as_ref(), end_head.as_ref())
            {
                continue;
            }

            let mid = start + (end - start) / 2;
            self.fetch(mid).await?;
            let mid_head = first_rank(self.cached(mid)?);

            if same_rank(start_head.as_ref(), mid_head.as_ref()) {
                pending.push((mid, end));
            } else if same_rank(mid_head.as_ref(), end_head.as_ref()) {
                pending.push((start, mid));
            } else {
                pending.push((mid, end));
                pending.push((start, mid));
            }
        }

        Ok(())
    }

    /// Fetch a page unless cached, recording its ranks
    async fn fetch(&mut self, page: u32) -> Result<()> {
        if self.cache.contains_key(&page) {
            debug!(page, "Rank page cache hit");
            return Ok(());
        }

        let url = self.page_url(page);
        let listing: P = self.loader.load(&url).await?;

        let members = listing.member_ranks().len();
        if members > 0 && page < listing.total_pages() {
            self.tracker.set_page_size(members);
        }
        self.tracker.scan_page(&listing, page);

        self.cache.insert(page, listing);
        self.checked.push(page);

        if self.options.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.options.delay_ms)).await;
        }
        Ok(())
    }

    fn cached(&self, page: u32) -> Result<&P> {
        self.cache
            .get(&page)
            .ok_or_else(|| Error::PageShape(format!("page {} not in cache", page)))
    }
}

/// Scan the member listing of `collection_id` for its ranks
pub async fn find_ranks<P: PageModel + RankedPage>(
    loader: &Loader,
    collection_id: &str,
    options: RankScanOptions,
) -> Result<RankScanResult> {
    RankFinder::<P>::new(loader, collection_id, options).scan().await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::aggregator::Paginated;
    use crate::ranks::RankKey;
    use crate::schema::{ExtractionRule, SchemaRegistry, TypeDef};
    use crate::testing::MockFetcher;
    use crate::value::Record;

    const BASE: &str = "https://lodestone.test";
    const PAGE_SIZE: usize = 5;

    struct Listing {
        record: Record,
    }

    impl Paginated for Listing {
        fn current_page(&self) -> u32 {
            self.record.number("page").unwrap_or(1.0) as u32
        }

        fn total_pages(&self) -> u32 {
            self.record.number("total").unwrap_or(1.0) as u32
        }

        fn next_page_url(&self) -> Option<String> {
            None
        }
    }

    impl PageModel for Listing {
        const SCHEMA: &'static str = "Listing";

        fn from_record(record: Record) -> Result<Self> {
            Ok(Self { record })
        }

        fn record(&self) -> &Record {
            &self.record
        }
    }

    impl RankedPage for Listing {
        fn member_ranks(&self) -> Vec<Option<RankKey>> {
            self.record
                .list("ranks")
                .iter()
                .map(|v| v.as_str().map(|name| RankKey::new(name, "")))
                .collect()
        }
    }

    /// `ranks[i]` is the rank shared by every member of page `i + 1`
    fn setup(ranks: &[&str]) -> (Arc<MockFetcher>, Loader) {
        let total = ranks.len();
        let mut fetcher = MockFetcher::new();
        for (i, rank) in ranks.iter().enumerate() {
            let page = i + 1;
            let members: String = (0..PAGE_SIZE)
                .map(|_| format!(r#"<li data-rank="{}">member</li>"#, rank))
                .collect();
            let html = format!(
                r#"<ul>{}</ul><span class="page">{}</span><span class="total">{}</span>"#,
                members, page, total
            );
            let url = if page == 1 {
                format!("{}/lodestone/freecompany/123/member", BASE)
            } else {
                format!("{}/lodestone/freecompany/123/member?page={}", BASE, page)
            };
            fetcher = fetcher.with_page(&url, &html);
        }

        let mut registry = SchemaRegistry::new();
        registry.register(
            TypeDef::new("Listing")
                .rule(ExtractionRule::new("ranks", "//li/@data-rank").many())
                .rule(ExtractionRule::new("page", "//span[@class='page']").number())
                .rule(ExtractionRule::new("total", "//span[@class='total']").number()),
        );

        let fetcher = Arc::new(fetcher);
        (fetcher.clone(), Loader::new(fetcher, Arc::new(registry)))
    }

    fn options() -> RankScanOptions {
        RankScanOptions {
            base_url: BASE.to_string(),
            delay_ms: 0,
            preload_pages: 2,
        }
    }

    #[tokio::test]
    async fn test_bisection_skips_uniform_spans() {
        let layout = ["A", "A", "A", "B", "B", "B", "B", "B", "B", "B"];
        let (fetcher, loader) = setup(&layout);

        let result = find_ranks::<Listing>(&loader, "123", options()).await.unwrap();

        let names: Vec<_> = result.ranks.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(result.metadata.total_pages, 10);
        assert_eq!(result.metadata.pages_checked, vec![1, 10, 2, 6, 4, 3]);
        assert_eq!(fetcher.request_count(), 6);

        // Counts only cover fetched pages
        assert_eq!(result.ranks[0].member_count, 15);
        assert_eq!(result.ranks[1].member_count, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_follows_real_fetches_only() {
        let layout = ["A", "A", "A", "B", "B", "B", "B", "B", "B", "B"];
        let (fetcher, loader) = setup(&layout);
        let opts = RankScanOptions {
            delay_ms: 50,
            ..options()
        };

        let started = tokio::time::Instant::now();
        let result = find_ranks::<Listing>(&loader, "123", opts).await.unwrap();
        let elapsed = started.elapsed();

        let fetched = result.metadata.pages_checked.len() as u64;
        assert_eq!(fetched, 6);
        assert_eq!(fetcher.request_count(), 6);
        // Cache hits on pages 2 and 10 add no pause
        assert!(elapsed >= Duration::from_millis(50 * fetched), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(50 * (fetched + 1)), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_single_rank_stops_after_ends() {
        let layout = ["A"; 8];
        let (fetcher, loader) = setup(&layout);

        let result = find_ranks::<Listing>(&loader, "123", options()).await.unwrap();
        assert_eq!(result.ranks.len(), 1);
        assert_eq!(result.metadata.pages_checked, vec![1, 8]);
        assert_eq!(fetcher.request_count(), 2);
    }

    #[tokio::test]
    async fn test_single_page() {
        let (fetcher, loader) = setup(&["A"]);
        let result = find_ranks::<Listing>(&loader, "123", options()).await.unwrap();
        assert_eq!(result.metadata.total_pages, 1);
        assert_eq!(result.metadata.pages_checked, vec![1]);
        assert_eq!(fetcher.request_count(), 1);
    }

    #[tokio::test]
    async fn test_every_transition_found() {
        let layout = ["A", "B", "B", "C", "C", "C", "D", "D", "E"];
        let (_, loader) = setup(&layout);

        let result = find_ranks::<Listing>(&loader, "123", options()).await.unwrap();
        let names: Vec<_> = result.ranks.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C", "D", "E"]);
    }

    #[tokio::test]
    async fn test_missing_page_fails_scan() {
        let (_, loader) = setup(&["A", "B", "C"]);
        let opts = RankScanOptions {
            base_url: "https://elsewhere.test".to_string(),
            ..options()
        };
        assert!(find_ranks::<Listing>(&loader, "123", opts).await.is_err());
    }
}
