//! Character search results

use url::Url;

use super::common::{CLASS_JOB_INFO, FREE_COMPANY_INFO, GRAND_COMPANY_INFO, WORLD_INFO};
use super::pager::{pagination_field, PagerView, PAGER};
use crate::aggregator::{PageModel, Paginated};
use crate::error::{Error, Result};
use crate::schema::{ComputedField, ExtractionRule, SchemaRegistry, TransformStep, TypeDef};
use crate::value::{Record, Value};

pub const SEARCH_PAGE: &str = "CharacterSearchPage";
pub const SEARCH_RESULT: &str = "SearchResult";

fn world_info_part(field: &'static str) -> impl Fn(&Record) -> Value + Send + Sync {
    move |result| {
        result
            .record("_worldInfo")
            .map(|info| info.get(field).clone())
            .unwrap_or(Value::Absent)
    }
}

pub fn register(registry: &mut SchemaRegistry) {
    registry
        .register(
            TypeDef::new(SEARCH_RESULT)
                .rule(ExtractionRule::new("name", ".//p[@class='entry__name']/text()"))
                .rule(
                    ExtractionRule::new("_worldInfo", ".//p[@class='entry__world']")
                        .schema(WORLD_INFO),
                )
                .rule(ExtractionRule::new("id", "./a[@class='entry__link']/@href"))
                .rule(ExtractionRule::new("lodestoneUrl", "./a[@class='entry__link']/@href"))
                .rule(
                    ExtractionRule::new(
                        "classJob",
                        ".//ul[@class='entry__chara_info']/li[./i[@class='list__ic__class']]",
                    )
                    .schema(CLASS_JOB_INFO),
                )
                .rule(
                    ExtractionRule::new(
                        "grandCompany",
                        ".//ul[@class='entry__chara_info']/li[@class='js__tooltip']",
                    )
                    .schema(GRAND_COMPANY_INFO)
                    .default_value(Value::Null),
                )
                .rule(
                    ExtractionRule::new("freeCompany", "./a[@class='entry__freecompany__link']")
                        .schema(FREE_COMPANY_INFO)
                        .default_value(Value::Null),
                )
                .rule(ExtractionRule::new(
                    "avatarUrl",
                    ".//div[@class='entry__chara__face']/img/@src",
                ))
                .rule(ExtractionRule::new(
                    "languages",
                    ".//div[@class='entry__chara__lang']/text()",
                ))
                .transform("id", TransformStep::new().extract_regex(r"/character/(\d+)/"))
                .transform(
                    "languages",
                    TransformStep::new().function(|value, _| {
                        let text = value.as_str().ok_or("languages is not text")?;
                        Ok(Value::List(text.split('/').map(Value::from).collect()))
                    }),
                )
                .computed(ComputedField::new("world", world_info_part("world")).after("name"))
                .computed(
                    ComputedField::new("datacenter", world_info_part("datacenter")).after("world"),
                ),
        )
        .register(
            TypeDef::new(SEARCH_PAGE)
                .rule(
                    ExtractionRule::new("results", "//div[@class='entry']")
                        .schema(SEARCH_RESULT)
                        .many(),
                )
                .rule(ExtractionRule::new("_pager", "//ul[@class='btn__pager']").schema(PAGER))
                .computed(pagination_field()),
        );
}

/// Search criteria for the character search page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterQuery {
    pub name: String,
    /// Quote the name and keep only exact (case-insensitive) matches
    pub exact: bool,
    pub world: Option<String>,
    /// Used only when no world is given
    pub datacenter: Option<String>,
}

impl CharacterQuery {
    pub fn url(&self, base_url: &str) -> Result<String> {
        let name = if self.exact {
            format!("\"{}\"", self.name)
        } else {
            self.name.clone()
        };
        let world = match (&self.world, &self.datacenter) {
            (Some(world), _) => world.clone(),
            (None, Some(dc)) => format!("_dc_{}", dc),
            (None, None) => String::new(),
        };

        let mut url = Url::parse(base_url)?.join("/lodestone/character/")?;
        url.query_pairs_mut()
            .append_pair("q", &name)
            .append_pair("worldname", &world);
        Ok(url.to_string())
    }
}

/// One page of character search results
#[derive(Debug, Clone)]
pub struct SearchPage {
    record: Record,
}

impl SearchPage {
    pub fn results(&self) -> &[Value] {
        self.record.list("results")
    }

    /// Drop results whose name differs from `name`, ignoring case
    pub fn retain_exact(&mut self, name: &str) {
        let wanted = name.to_lowercase();
        let kept: Vec<Value> = self
            .results()
            .iter()
            .filter(|result| {
                result
                    .as_record()
                    .and_then(|r| r.str("name"))
                    .map(|n| n.to_lowercase() == wanted)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        self.record.insert("results", kept);
    }

    pub fn into_record(self) -> Record {
        self.record
    }
}

impl Paginated for SearchPage {
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

impl PageModel for SearchPage {
    const SCHEMA: &'static str = SEARCH_PAGE;

    fn from_record(record: Record) -> Result<Self> {
        if record.type_name() != SEARCH_PAGE {
            return Err(Error::PageShape(format!(
                "expected {}, got {}",
                SEARCH_PAGE,
                record.type_name()
            )));
        }
        Ok(Self { record })
    }

    fn record(&self) -> &Record {
        &self.record
    }
}
