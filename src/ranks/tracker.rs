use std::collections::HashMap;

use super::{RankEntry, RankKey, RankedPage};

const DEFAULT_PAGE_SIZE: usize = 50;

/// What is known about one rank so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankTracking {
    pub key: RankKey,
    pub member_count: u32,
    pub first_seen_page: u32,
    pub last_seen_page: u32,
    /// Listing position of the earliest member seen with this rank
    pub first_seen_ordinal: usize,
}

/// Accumulates ranks and their listing positions across pages
#[derive(Debug, Clone, Default)]
pub struct RankTracker {
    ranks: HashMap<RankKey, RankTracking>,
    page_size: Option<usize>,
}

impl RankTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Members per full page. Only the first call has an effect.
    pub fn set_page_size(&mut self, size: usize) {
        self.page_size.get_or_insert(size);
    }

    pub fn page_size(&self) -> usize {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Position of a member in the whole listing; pages are 1-based, positions 0-based
    pub fn ordinal(&self, page: u32, position: usize) -> usize {
        100 + (page.saturating_sub(1) as usize) * self.page_size() + position
    }

    pub fn record(&mut self, key: &RankKey, page: u32, ordinal: usize) {
        match self.ranks.get_mut(key) {
            Some(existing) => {
                if ordinal < existing.first_seen_ordinal {
                    existing.first_seen_page = page;
                    existing.first_seen_ordinal = ordinal;
                }
                existing.last_seen_page = existing.last_seen_page.max(page);
                existing.member_count += 1;
            }
            None => {
                self.ranks.insert(
                    key.clone(),
                    RankTracking {
                        key: key.clone(),
                        member_count: 1,
                        first_seen_page: page,
                        last_seen_page: page,
                        first_seen_ordinal: ordinal,
                    },
                );
            }
        }
    }

    /// Count every ranked member of `page`
    pub fn scan_page<P: RankedPage>(&mut self, page: &P, page_number: u32) {
        for (position, rank) in page.member_ranks().iter().enumerate() {
            if let Some(rank) = rank {
                let ordinal = self.ordinal(page_number, position);
                self.record(rank, page_number, ordinal);
            }
        }
    }

    pub fn tracking(&self, key: &RankKey) -> Option<&RankTracking> {
        self.ranks.get(key)
    }

    /// Ranks ordered by first appearance in the listing
    pub fn sorted(&self) -> Vec<RankEntry> {
        let mut ranks: Vec<&RankTracking> = self.ranks.values().collect();
        ranks.sort_by_key(|r| r.first_seen_ordinal);
        ranks
            .into_iter()
            .map(|r| RankEntry {
                name: r.key.name.clone(),
                icon_url: r.key.icon_url.clone(),
                member_count: r.member_count,
            })
            .collect()
    }
}
