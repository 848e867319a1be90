//! Components shared by several pages

use crate::schema::{ExtractionRule, SchemaRegistry, TransformStep, TypeDef};
use crate::value::Value;

pub const WORLD_INFO: &str = "WorldInfo";
pub const GRAND_COMPANY_INFO: &str = "MiniGrandCompanyInfo";
pub const CLASS_JOB_INFO: &str = "MiniClassJobInfo";
pub const FREE_COMPANY_INFO: &str = "MiniFreeCompanyInfo";

/// Part `index` of a `/`-separated tooltip such as `"Maelstrom/Second Storm Lieutenant"`
fn tooltip_part(index: usize) -> TransformStep {
    TransformStep::new().function(move |value, _| {
        let text = value.as_str().ok_or("tooltip is not text")?;
        text.split('/')
            .nth(index)
            .map(|part| Value::from(part.trim()))
            .ok_or_else(|| format!("tooltip '{}' has no part {}", text, index))
    })
}

pub fn register(registry: &mut SchemaRegistry) {
    registry
        .register(
            TypeDef::new(WORLD_INFO)
                .rule(ExtractionRule::new("world", "./text()[last()]"))
                .rule(ExtractionRule::new("datacenter", "./text()[last()]"))
                .transform(
                    "world",
                    TransformStep::new().extract_regex(r"([A-Za-z]+) \[[A-Za-z]+\]"),
                )
                .transform(
                    "datacenter",
                    TransformStep::new().extract_regex(r"[A-Za-z]+ \[([A-Za-z]+)\]"),
                ),
        )
        .register(
            TypeDef::new(GRAND_COMPANY_INFO)
                .rule(ExtractionRule::new("_gcParse", "./@data-tooltip"))
                .rule(ExtractionRule::new("name", "./@data-tooltip"))
                .rule(ExtractionRule::new("rank", "./@data-tooltip"))
                .rule(ExtractionRule::new("iconUrl", "./img/@src"))
                .transform("name", tooltip_part(0))
                .transform("rank", tooltip_part(1)),
        )
        .register(
            TypeDef::new(CLASS_JOB_INFO)
                .rule(ExtractionRule::new("level", "./span/text()").number())
                .rule(ExtractionRule::new(
                    "iconUrl",
                    "./i[@class='list__ic__class']/img/@src",
                )),
        )
        .register(
            TypeDef::new(FREE_COMPANY_INFO)
                .rule(ExtractionRule::new("lodestoneUrl", "./@href"))
                .rule(ExtractionRule::new("name", "./span/text()")),
        );
}
