//! Declarative scraping of the Lodestone community site
//!
//! Provides:
//! - An XPath-style query engine over parsed HTML
//! - Schema-driven extraction of typed records with transforms and computed fields
//! - JSON serialization honoring field visibility and placement rules
//! - Multi-page aggregation following "next page" links
//! - Rank discovery over sorted member listings with minimal page fetches
//! - Availability classification of fetched pages (maintenance, private, missing)

pub mod aggregator;
pub mod availability;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod models;
pub mod query;
pub mod ranks;
pub mod schema;
pub mod serializer;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod value;

pub use aggregator::{
    aggregate, aggregate_items, AggregationMetadata, AggregationOptions, AggregationResult,
    PageModel, Paginated,
};
pub use availability::{classify, ClassifiedPage, ResultCode, ScrapeMeta};
pub use config::ScraperConfig;
pub use document::{Document, NodeSnapshot, XNode};
pub use engine::Extractor;
pub use error::{Error, ExtractError, Result};
pub use fetch::{Fetch, FetchResponse, HttpFetcher, Loader};
pub use models::standard_registry;
pub use query::Query;
pub use ranks::{extract_ranks_from_pages, find_ranks, RankEntry, RankScanOptions, RankScanResult};
pub use schema::{ComputedField, ExtractionRule, SchemaRegistry, TransformStep, TypeDef, ValueType};
pub use serializer::Serializer;
pub use value::{Record, Value};
