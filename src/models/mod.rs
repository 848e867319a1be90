//! Page models for the Lodestone site
//!
//! Each submodule registers its record types into a [`SchemaRegistry`]. Typed page
//! views wrap the extracted records where the aggregation and rank algorithms need
//! pagination data.

pub mod character_search;
pub mod common;
pub mod free_company;
pub mod pager;
pub mod world_status;

use crate::schema::SchemaRegistry;

pub use character_search::{CharacterQuery, SearchPage};
pub use free_company::{find_free_company_ranks, member_listing, MemberListPage};
pub use pager::PagerView;
pub use world_status::{flatten_world_status, FlatWorldStatus};

/// Registry holding every built-in page model
pub fn standard_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    pager::register(&mut registry);
    common::register(&mut registry);
    free_company::register(&mut registry);
    character_search::register(&mut registry);
    world_status::register(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_types() {
        let registry = standard_registry();
        for name in [
            pager::PAGER,
            common::WORLD_INFO,
            common::GRAND_COMPANY_INFO,
            free_company::MEMBERS_PAGE,
            character_search::SEARCH_PAGE,
            world_status::WORLD_STATUS_PAGE,
            world_status::WORLD,
        ] {
            assert!(registry.contains(name), "missing {}", name);
        }
    }
}
