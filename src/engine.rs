//! Declarative extraction engine
//!
//! Runs a schema type's rules against a context node and builds a [`Record`]. A failing
//! rule or transform never aborts the record: the field falls back to its default and a
//! warning is logged.

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::document::{Document, XNode};
use crate::error::{ExtractError, Result};
use crate::query::{format_number, QueryValue};
use crate::schema::transform::{apply_pipeline, parse_number};
use crate::schema::{ExtractionRule, SchemaRegistry, ValueType};
use crate::value::{Record, Value};

/// One item matched by a rule's query
#[derive(Debug, Clone)]
enum Matched<'a> {
    Node(XNode<'a>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl<'a> Matched<'a> {
    fn all(result: QueryValue<'a>) -> Vec<Self> {
        match result {
            QueryValue::Nodes(nodes) => nodes.into_iter().map(Matched::Node).collect(),
            other => Self::first(other).into_iter().collect(),
        }
    }

    fn first(result: QueryValue<'a>) -> Option<Self> {
        match result {
            QueryValue::Nodes(nodes) => nodes.into_iter().next().map(Matched::Node),
            QueryValue::String(s) => Some(Matched::String(s)),
            QueryValue::Number(n) => Some(Matched::Number(n)),
            QueryValue::Boolean(b) => Some(Matched::Boolean(b)),
        }
    }
}

/// Builds records from parsed documents
#[derive(Debug, Clone)]
pub struct Extractor {
    registry: Arc<SchemaRegistry>,
}

impl Extractor {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn shared_registry(&self) -> Arc<SchemaRegistry> {
        Arc::clone(&self.registry)
    }

    /// Extract a record of `type_name` from a context node
    pub fn extract(&self, context: XNode<'_>, type_name: &str) -> Result<Record> {
        Ok(self.extract_record(context, type_name)?)
    }

    /// Parse HTML text and extract a record from the document root
    pub fn load_from_str(&self, html: &str, type_name: &str) -> Result<Record> {
        let document = Document::parse(html);
        self.extract(document.root(), type_name)
    }

    /// Read an HTML file and extract a record from it
    pub fn load_from_file(&self, path: impl AsRef<Path>, type_name: &str) -> Result<Record> {
        let html = std::fs::read_to_string(path)?;
        self.load_from_str(&html, type_name)
    }

    /// Alias of [`Extractor::load_from_str`]
    pub fn deserialize(&self, type_name: &str, html: &str) -> Result<Record> {
        self.load_from_str(html, type_name)
    }

    fn extract_record(
        &self,
        context: XNode<'_>,
        type_name: &str,
    ) -> std::result::Result<Record, ExtractError> {
        let rules = self.registry.rules(type_name)?;
        let mut record = Record::new(type_name);

        for rule in &rules {
            let value = match self.apply_rule(context, rule) {
                Ok(value) => value,
                Err(err) => {
                    warn!(
                        schema = type_name,
                        field = rule.field(),
                        query = rule.query_source(),
                        error = %err,
                        "Error processing query for field"
                    );
                    match &rule.options().default {
                        Some(default) => default.clone(),
                        None if rule.options().many => Value::List(Vec::new()),
                        None => Value::Absent,
                    }
                }
            };
            record.insert(rule.field(), value);
        }

        for rule in &rules {
            let steps = self.registry.transforms(type_name, rule.field());
            if steps.is_empty() {
                continue;
            }

            let current = record.get(rule.field()).clone();
            match apply_pipeline(current, steps, &record) {
                Ok(value) => record.insert(rule.field(), value),
                Err(err) => warn!(
                    schema = type_name,
                    field = rule.field(),
                    error = %err,
                    "Transform failed, keeping extracted value"
                ),
            }
        }

        Ok(record)
    }

    fn apply_rule(
        &self,
        context: XNode<'_>,
        rule: &ExtractionRule,
    ) -> std::result::Result<Value, ExtractError> {
        let result = rule.query()?.evaluate(context)?;
        let ty = rule.resolved_type();

        if rule.options().many {
            let values = Matched::all(result)
                .into_iter()
                .map(|item| self.extract_value(Some(item), ty, rule))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            return Ok(Value::List(values));
        }

        let value = self.extract_value(Matched::first(result), ty, rule)?;
        if rule.options().default_if_empty && value.is_empty() {
            return Ok(rule.default_or_absent());
        }
        Ok(value)
    }

    fn extract_value(
        &self,
        matched: Option<Matched<'_>>,
        ty: &ValueType,
        rule: &ExtractionRule,
    ) -> std::result::Result<Value, ExtractError> {
        let Some(matched) = matched else {
            return Ok(rule.default_or_absent());
        };

        let node = match matched {
            Matched::Node(node) => node,
            Matched::String(s) => return Ok(coerce_text(&s, ty)),
            Matched::Number(n) => return Ok(coerce_number(n, ty)),
            Matched::Boolean(b) => return Ok(coerce_boolean(b, ty)),
        };

        match node {
            XNode::Text(_) => Ok(coerce_text(node.string_value().trim(), ty)),
            XNode::Attribute { value, .. } => Ok(coerce_text(value, ty)),
            XNode::Element(_) => match ty {
                ValueType::Schema(name) => self.nested(node, name, rule),
                ValueType::Node => Ok(Value::Node(node.snapshot())),
                ValueType::String => Ok(Value::String(node.inner_markup())),
                other => Ok(coerce_text(&node.text_content(), other)),
            },
            XNode::Document(_) => match ty {
                ValueType::Schema(name) => Ok(Value::from(self.extract_record(node, name)?)),
                _ => Ok(Value::Node(node.snapshot())),
            },
        }
    }

    fn nested(
        &self,
        element: XNode<'_>,
        type_name: &str,
        rule: &ExtractionRule,
    ) -> std::result::Result<Value, ExtractError> {
        let default_if_empty = rule.options().default_if_empty;
        if default_if_empty && !element.has_children() {
            return Ok(rule.default_or_null());
        }

        let record = self.extract_record(element, type_name)?;
        if default_if_empty && record.is_empty() {
            return Ok(rule.default_or_null());
        }
        Ok(Value::from(record))
    }
}

/// Coerce extracted text to a target type
///
/// Numbers that fail to parse become 0; any non-empty text is `true`.
fn coerce_text(text: &str, ty: &ValueType) -> Value {
    match ty {
        ValueType::Number => {
            let n = parse_number(text);
            Value::Number(if n.is_nan() { 0.0 } else { n })
        }
        ValueType::Boolean => Value::Bool(!text.is_empty()),
        _ => Value::String(text.to_string()),
    }
}

fn coerce_number(n: f64, ty: &ValueType) -> Value {
    match ty {
        ValueType::Number => Value::Number(if n.is_nan() { 0.0 } else { n }),
        ValueType::Boolean => Value::Bool(n != 0.0 && !n.is_nan()),
        ValueType::String => Value::String(format_number(n)),
        _ => Value::Number(n),
    }
}

fn coerce_boolean(b: bool, ty: &ValueType) -> Value {
    match ty {
        ValueType::Number => Value::Number(if b { 1.0 } else { 0.0 }),
        ValueType::String => Value::String(b.to_string()),
        _ => Value::Bool(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{TransformStep, TypeDef};

    const PROFILE: &str = r#"
        <html><body>
            <div class="profile">
                <h1 class="name"> Alpha Beta </h1>
                <p class="bio">Hello <b>world</b><br>again</p>
                <span class="level">Lv. 90</span>
                <span class="points">12,345</span>
                <span class="flag">yes</span>
                <a class="link" href=" /character/42/ ">Profile</a>
                <ul class="tags"><li>red</li><li>green</li><li>blue</li></ul>
                <div class="rank"><span>Officer</span><img src="/rank.png"></div>
                <div class="empty-rank"></div>
                <div class="blank-rank"><em></em></div>
            </div>
        </body></html>
    "#;

    fn extractor(defs: Vec<TypeDef>) -> Extractor {
        let mut registry = SchemaRegistry::new();
        for def in defs {
            registry.register(def);
        }
        Extractor::new(Arc::new(registry))
    }

    fn rank_type() -> TypeDef {
        TypeDef::new("Rank")
            .rule(ExtractionRule::new("name", "./span/text()"))
            .rule(ExtractionRule::new("iconUrl", "./img/@src"))
    }

    #[test]
    fn test_text_attribute_and_markup() {
        let extractor = extractor(vec![TypeDef::new("Profile")
            .rule(ExtractionRule::new("name", "//h1[@class='name']/text()"))
            .rule(ExtractionRule::new("bio", "//p[@class='bio']"))
            .rule(ExtractionRule::new("link", "//a[@class='link']/@href"))]);

        let record = extractor.load_from_str(PROFILE, "Profile").unwrap();
        assert_eq!(record.str("name"), Some("Alpha Beta"));
        assert_eq!(record.str("bio"), Some("Hello <b>world</b><br>again"));
        assert_eq!(record.str("link"), Some(" /character/42/ "));
    }

    #[test]
    fn test_coercion_of_element_text() {
        let extractor = extractor(vec![TypeDef::new("Profile")
            .rule(ExtractionRule::new("level", "//span[@class='level']").number())
            .rule(ExtractionRule::new("flag", "//span[@class='flag']").boolean())
            .rule(ExtractionRule::new("tagCount", "count(//ul[@class='tags']/li)").number())]);

        let record = extractor.load_from_str(PROFILE, "Profile").unwrap();
        // "Lv. 90" is not numeric
        assert_eq!(record.number("level"), Some(0.0));
        assert_eq!(record.get("flag"), &Value::Bool(true));
        assert_eq!(record.number("tagCount"), Some(3.0));
    }

    #[test]
    fn test_override_type_beats_declared() {
        let extractor = extractor(vec![TypeDef::new("Profile").rule(
            ExtractionRule::new("points", "//span[@class='points']")
                .number()
                .resolve_as(ValueType::Node),
        )]);

        let record = extractor.load_from_str(PROFILE, "Profile").unwrap();
        let node = record.get("points").as_node().unwrap();
        assert_eq!(node.attr("class"), Some("points"));
        assert_eq!(node.text_content(), "12,345");
    }

    #[test]
    fn test_many_yields_list() {
        let extractor = extractor(vec![TypeDef::new("Profile")
            .rule(ExtractionRule::new("tags", "//ul[@class='tags']/li/text()").many())
            .rule(ExtractionRule::new("none", "//ol/li").many())]);

        let record = extractor.load_from_str(PROFILE, "Profile").unwrap();
        let tags: Vec<_> = record.list("tags").iter().filter_map(Value::as_str).collect();
        assert_eq!(tags, vec!["red", "green", "blue"]);
        assert_eq!(record.get("none"), &Value::List(vec![]));
    }

    #[test]
    fn test_nested_records_and_default_if_empty() {
        let extractor = extractor(vec![
            rank_type(),
            TypeDef::new("Profile")
                .rule(ExtractionRule::new("rank", "//div[@class='rank']").schema("Rank"))
                .rule(
                    ExtractionRule::new("emptyRank", "//div[@class='empty-rank']")
                        .schema("Rank")
                        .default_if_empty(),
                )
                .rule(
                    ExtractionRule::new("blankRank", "//div[@class='blank-rank']")
                        .schema("Rank")
                        .default_if_empty()
                        .default_value(Value::from("none")),
                )
                .rule(
                    ExtractionRule::new("missing", "//div[@class='absent']")
                        .default_value(Value::Null),
                ),
        ]);

        let record = extractor.load_from_str(PROFILE, "Profile").unwrap();
        let rank = record.record("rank").unwrap();
        assert_eq!(rank.type_name(), "Rank");
        assert_eq!(rank.str("name"), Some("Officer"));
        assert_eq!(rank.str("iconUrl"), Some("/rank.png"));

        // Empty nested record without a declared default stays unset
        assert!(record.get("emptyRank").is_absent());
        assert_eq!(record.get("blankRank"), &Value::from("none"));
        assert_eq!(record.get("missing"), &Value::Null);
    }

    #[test]
    fn test_failing_rule_is_isolated() {
        let extractor = extractor(vec![TypeDef::new("Profile")
            .rule(ExtractionRule::new("name", "//h1[@class='name']/text()"))
            .rule(ExtractionRule::new("broken", "//h1[").default_value("fallback"))
            .rule(ExtractionRule::new("brokenMany", "nope(").many())
            .rule(ExtractionRule::new("nested", "//h1").schema("Missing"))]);

        let record = extractor.load_from_str(PROFILE, "Profile").unwrap();
        assert_eq!(record.str("name"), Some("Alpha Beta"));
        assert_eq!(record.str("broken"), Some("fallback"));
        assert_eq!(record.get("brokenMany"), &Value::List(vec![]));
        assert!(record.get("nested").is_absent());
    }

    #[test]
    fn test_unknown_top_level_type_errors() {
        let extractor = extractor(vec![]);
        assert!(extractor.load_from_str(PROFILE, "Profile").is_err());
    }

    #[test]
    fn test_transforms_run_after_all_fields() {
        let extractor = extractor(vec![TypeDef::new("Profile")
            .rule(ExtractionRule::new("label", "//span[@class='level']/text()"))
            .rule(ExtractionRule::new("points", "//span[@class='points']/text()"))
            .transform(
                "label",
                TransformStep::new().function(|value, record| {
                    let points = record.str("points").unwrap_or("?");
                    Ok(Value::from(format!("{} / {}", value.as_str().unwrap_or(""), points)))
                }),
            )
            .transform("points", TransformStep::new().parse_number())]);

        let record = extractor.load_from_str(PROFILE, "Profile").unwrap();
        assert_eq!(record.str("label"), Some("Lv. 90 / 12,345"));
        assert_eq!(record.number("points"), Some(12345.0));
    }

    #[test]
    fn test_failed_transform_keeps_extracted_value() {
        let extractor = extractor(vec![TypeDef::new("Profile")
            .rule(ExtractionRule::new("points", "//span[@class='points']/text()"))
            .transform("points", TransformStep::new().function(|_, _| Err("bad".into())))]);

        let record = extractor.load_from_str(PROFILE, "Profile").unwrap();
        assert_eq!(record.str("points"), Some("12,345"));
    }

    #[test]
    fn test_inherited_rules() {
        let extractor = extractor(vec![
            TypeDef::new("Base").rule(ExtractionRule::new("name", "//h1/text()")),
            TypeDef::new("Child")
                .extends("Base")
                .rule(ExtractionRule::new("level", "//span[@class='level']/text()")),
        ]);

        let record = extractor.load_from_str(PROFILE, "Child").unwrap();
        let fields: Vec<_> = record.fields().map(|(k, _)| k).collect();
        assert_eq!(fields, vec!["level", "name"]);
        assert_eq!(record.str("name"), Some("Alpha Beta"));
    }
}
