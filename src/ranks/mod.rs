//! Rank discovery over ordered member listings
//!
//! Member listings are sorted by rank, so each rank occupies one contiguous run of
//! members. [`RankFinder`] samples pages by bisection to find every rank without
//! fetching the whole listing; [`extract_ranks_from_pages`] does the same work on pages
//! that are already in hand.

mod finder;
mod tracker;

use serde::Serialize;

use crate::aggregator::Paginated;

pub use finder::{find_ranks, RankFinder, RankScanOptions, RankScanResult, ScanMetadata};
pub use tracker::{RankTracker, RankTracking};

/// Rank identity: name plus icon
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RankKey {
    pub name: String,
    pub icon_url: String,
}

impl RankKey {
    pub fn new(name: &str, icon_url: &str) -> Self {
        Self {
            name: name.to_string(),
            icon_url: icon_url.to_string(),
        }
    }
}

/// Rank with its member count, as reported to consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankEntry {
    pub name: String,
    pub icon_url: String,
    pub member_count: u32,
}

/// A listing page whose members carry ranks, in listing order
pub trait RankedPage: Paginated {
    /// One entry per member; `None` when a member shows no rank
    fn member_ranks(&self) -> Vec<Option<RankKey>>;
}

/// Rank of the first member of a page
pub(crate) fn first_rank<P: RankedPage>(page: &P) -> Option<RankKey> {
    page.member_ranks().into_iter().next().flatten()
}

/// Rank of the last member of a page
pub(crate) fn last_rank<P: RankedPage>(page: &P) -> Option<RankKey> {
    page.member_ranks().into_iter().last().flatten()
}

/// Same rank on both sides; unknown ranks never match
pub(crate) fn same_rank(a: Option<&RankKey>, b: Option<&RankKey>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a == b)
}

/// Ranks from pages already fetched in listing order, most senior first
pub fn extract_ranks_from_pages<P: RankedPage>(pages: &[P]) -> Vec<RankEntry> {
    let mut tracker = RankTracker::new();

    if let Some(first) = pages.first() {
        let members = first.member_ranks().len();
        if pages.len() > 1 && members > 0 {
            tracker.set_page_size(members);
        }
    }

    for (index, page) in pages.iter().enumerate() {
        tracker.scan_page(page, index as u32 + 1);
    }

    tracker.sorted()
}
