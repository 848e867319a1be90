//! Free company member listing

use serde_json::{json, Value as Json};

use super::common::{CLASS_JOB_INFO, GRAND_COMPANY_INFO};
use super::pager::{pagination_field, PagerView, PAGER};
use crate::aggregator::{aggregate, AggregationOptions, PageModel, Paginated};
use crate::config::DEFAULT_BASE_URL;
use crate::error::{Error, Result};
use crate::fetch::Loader;
use crate::ranks::{
    extract_ranks_from_pages, RankFinder, RankKey, RankScanOptions, RankScanResult, RankedPage,
};
use crate::schema::{ExtractionRule, SchemaRegistry, TypeDef};
use crate::serializer::Serializer;
use crate::value::{Record, Value};

pub const MEMBERS_PAGE: &str = "FreeCompanyMembers";
pub const MEMBER_ENTRY: &str = "MemberEntry";
pub const RANK_INFO: &str = "RankInfo";

pub fn register(registry: &mut SchemaRegistry) {
    registry
        .register(
            TypeDef::new(RANK_INFO)
                .rule(ExtractionRule::new("name", "./span/text()"))
                .rule(ExtractionRule::new("iconUrl", "./img/@src")),
        )
        .register(
            TypeDef::new(MEMBER_ENTRY)
                .rule(ExtractionRule::new("name", ".//p[@class='entry__name']/text()"))
                .rule(ExtractionRule::new("_worldInfo", ".//p[@class='entry__world']/text()"))
                .rule(ExtractionRule::new("lodestoneUrl", ".//a[@class='entry__bg']/@href"))
                .rule(ExtractionRule::new(
                    "avatarUrl",
                    ".//div[@class='entry__chara__face']/img/@src",
                ))
                .rule(
                    ExtractionRule::new("rank", ".//ul[@class='entry__freecompany__info']/li[1]")
                        .schema(RANK_INFO),
                )
                .rule(
                    ExtractionRule::new(
                        "classJob",
                        ".//ul[@class='entry__freecompany__info']/li[2]",
                    )
                    .schema(CLASS_JOB_INFO),
                )
                .rule(
                    ExtractionRule::new(
                        "grandCompany",
                        ".//ul[@class='entry__freecompany__info']/li[3]",
                    )
                    .schema(GRAND_COMPANY_INFO)
                    .default_value(Value::Null),
                ),
        )
        .register(
            TypeDef::new(MEMBERS_PAGE)
                .rule(
                    ExtractionRule::new(
                        "members",
                        "//div[@class='ldst__window']/ul[not(@class)]/li[@class='entry']",
                    )
                    .schema(MEMBER_ENTRY)
                    .many(),
                )
                .rule(ExtractionRule::new("_pager", "//ul[@class='btn__pager']").schema(PAGER))
                .computed(pagination_field()),
        );
}

/// Member listing URL of a free company
pub fn member_url(base_url: &str, free_company_id: &str) -> String {
    format!(
        "{}/lodestone/freecompany/{}/member",
        base_url.trim_end_matches('/'),
        free_company_id
    )
}

/// One page of a free company's member listing
#[derive(Debug, Clone)]
pub struct MemberListPage {
    record: Record,
}

impl MemberListPage {
    pub fn members(&self) -> &[Value] {
        self.record.list("members")
    }
}

impl Paginated for MemberListPage {
    fn current_page(&self) -> u32 {
        PagerView::of(&self.record).current_page()
    }

    fn total_pages(&self) -> u32 {
        PagerView::of(&self.record).total_pages()
    }

    fn next_page_url(&self) -> Option<String> {
        PagerView::of(&self.record).next_page_url()
    }
}

impl PageModel for MemberListPage {
    const SCHEMA: &'static str = MEMBERS_PAGE;

    fn from_record(record: Record) -> Result<Self> {
        if record.type_name() != MEMBERS_PAGE {
            return Err(Error::PageShape(format!(
                "expected {}, got {}",
                MEMBERS_PAGE,
                record.type_name()
            )));
        }
        Ok(Self { record })
    }

    fn record(&self) -> &Record {
        &self.record
    }
}

impl RankedPage for MemberListPage {
    fn member_ranks(&self) -> Vec<Option<RankKey>> {
        self.members()
            .iter()
            .map(|member| {
                let rank = member.as_record()?.record("rank")?;
                Some(RankKey::new(
                    rank.str("name").unwrap_or_default(),
                    rank.str("iconUrl").unwrap_or_default(),
                ))
            })
            .collect()
    }
}

/// Discover a free company's ranks with as few page fetches as possible
pub async fn find_free_company_ranks(
    loader: &Loader,
    free_company_id: &str,
    options: RankScanOptions,
) -> Result<RankScanResult> {
    RankFinder::<MemberListPage>::new(loader, free_company_id, options)
        .scan()
        .await
}

/// Every member across all listing pages, as wire JSON
///
/// Ranks are included only when the whole listing was fetched, since a capped listing
/// would under-report them.
pub async fn member_listing(
    loader: &Loader,
    free_company_id: &str,
    options: &AggregationOptions,
) -> Result<Json> {
    let base_url = options.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
    let url = member_url(base_url, free_company_id);

    let result = aggregate(
        loader,
        &url,
        |page: &MemberListPage| page.members().to_vec(),
        options,
    )
    .await?;

    let serializer = Serializer::new(loader.registry());
    let mut body = serde_json::Map::new();
    body.insert("members".to_string(), serializer.serialize_all(&result.items));
    if result.metadata.complete {
        let ranks = extract_ranks_from_pages(&result.pages);
        body.insert("ranks".to_string(), serde_json::to_value(ranks)?);
    }
    body.insert(
        "metadata".to_string(),
        serde_json::to_value(result.metadata)?,
    );

    Ok(Json::Object(body))
}

/// Rank scan outcome as wire JSON
pub fn ranks_to_json(result: &RankScanResult) -> Result<Json> {
    Ok(json!({
        "ranks": serde_json::to_value(&result.ranks)?,
        "metadata": serde_json::to_value(&result.metadata)?,
    }))
}
