//! World status page

use serde::Serialize;

use crate::schema::{ComputedField, ExtractionRule, SchemaRegistry, TransformStep, TypeDef};
use crate::value::{Record, Value};

pub const WORLD_STATUS_PAGE: &str = "WorldStatusPage";
pub const PHYSICAL_DATA_CENTER: &str = "PhysicalDataCenter";
pub const LOGICAL_DATA_CENTER: &str = "LogicalDataCenter";
pub const WORLD: &str = "World";

pub fn register(registry: &mut SchemaRegistry) {
    registry
        .register(
            TypeDef::new(WORLD_STATUS_PAGE).rule(
                ExtractionRule::new(
                    "regions",
                    "//div[contains(@class, 'js--tab-content') and @data-region]",
                )
                .schema(PHYSICAL_DATA_CENTER)
                .many(),
            ),
        )
        .register(
            TypeDef::new(PHYSICAL_DATA_CENTER)
                .rule(
                    ExtractionRule::new(
                        "_regionTabs",
                        "//ul[contains(@class, 'js--tab-buttons')]/li[@data-region]",
                    )
                    .node()
                    .many(),
                )
                .rule(ExtractionRule::new("id", "./@data-region").number())
                .rule(
                    ExtractionRule::new("dataCenters", ".//li[@class='world-dcgroup__item']")
                        .schema(LOGICAL_DATA_CENTER)
                        .many(),
                )
                .computed(
                    ComputedField::new("name", |region| Value::from(region_name(region)))
                        .after("id"),
                ),
        )
        .register(
            TypeDef::new(LOGICAL_DATA_CENTER)
                .rule(ExtractionRule::new(
                    "name",
                    ".//h2[@class='world-dcgroup__header']/text()",
                ))
                .rule(
                    ExtractionRule::new(
                        "worlds",
                        ".//li[contains(@class, 'item-list')]/div[@class='world-list__item']",
                    )
                    .schema(WORLD)
                    .many(),
                ),
        )
        .register(
            TypeDef::new(WORLD)
                .rule(ExtractionRule::new(
                    "name",
                    "./div[@class='world-list__world_name']/p/text()",
                ))
                .rule(ExtractionRule::new(
                    "status",
                    "./div[@class='world-list__status_icon']/i/@data-tooltip",
                ))
                .rule(ExtractionRule::new(
                    "category",
                    "./div[@class='world-list__world_category']/p/text()",
                ))
                .rule(ExtractionRule::new(
                    "_creationOpen",
                    "./div[@class='world-list__create_character']/i/@class",
                ))
                .transform("name", TransformStep::new().trim())
                .transform("status", TransformStep::new().trim())
                .transform("category", TransformStep::new().trim())
                .transform("category", TransformStep::new().null_if("--"))
                .transform(
                    "_creationOpen",
                    TransformStep::new()
                        .extract_regex(r"world-ic__(available|unavailable)")
                        .null_if("--"),
                )
                .computed(ComputedField::new("creationOpen", |world| {
                    creation_open(world).map_or(Value::Null, Value::Bool)
                })),
        );
}

/// Display name of a region, looked up in the page's region tabs
pub fn region_name(region: &Record) -> String {
    let Some(id) = region.number("id") else {
        return "Unknown".to_string();
    };

    region
        .list("_regionTabs")
        .iter()
        .filter_map(Value::as_node)
        .find(|tab| {
            tab.attr("data-region")
                .and_then(|v| v.trim().parse::<f64>().ok())
                == Some(id)
        })
        .map(|tab| tab.text_content().trim().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Whether new characters may be created; `None` when the page does not say
pub fn creation_open(world: &Record) -> Option<bool> {
    match world.get("_creationOpen") {
        Value::Null => None,
        other => Some(other.as_str() == Some("available")),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionRef {
    pub id: u32,
    pub name: String,
}

/// One row of the flattened world list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatWorldStatus {
    pub name: Option<String>,
    pub data_center: Option<String>,
    pub region: RegionRef,
    pub status: Option<String>,
    pub category: Option<String>,
    pub creation_open: Option<bool>,
}

/// Flatten the region → data center → world hierarchy, in document order
pub fn flatten_world_status(page: &Record) -> Vec<FlatWorldStatus> {
    let owned = |r: &Record, field: &str| r.str(field).map(String::from);
    let mut rows = Vec::new();

    for region in page.list("regions").iter().filter_map(Value::as_record) {
        let region_ref = RegionRef {
            id: region.number("id").unwrap_or(0.0) as u32,
            name: region_name(region),
        };

        for dc in region.list("dataCenters").iter().filter_map(Value::as_record) {
            for world in dc.list("worlds").iter().filter_map(Value::as_record) {
                rows.push(FlatWorldStatus {
                    name: owned(world, "name"),
                    data_center: owned(dc, "name"),
                    region: region_ref.clone(),
                    status: owned(world, "status"),
                    category: owned(world, "category"),
                    creation_open: creation_open(world),
                });
            }
        }
    }

    rows
}
