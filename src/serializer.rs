//! Wire serialization of extracted records
//!
//! Produces `serde_json` values. Stored fields keep declaration order, computed fields are
//! placed according to their metadata, `_`-prefixed and internal fields are dropped and
//! absent values are omitted.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::{Map, Number, Value as Json};

use crate::schema::SchemaRegistry;
use crate::value::{Record, Value};

struct Getter {
    value: Option<Json>,
    after: Option<String>,
}

/// Records already written during one serialization call
///
/// Computed values are retained until the call ends so that no address in `seen` can be
/// reused by a later allocation.
#[derive(Default)]
struct Visited {
    seen: HashSet<*const Record>,
    retained: Vec<Value>,
}

impl Visited {
    fn first_visit(&mut self, record: &Record) -> bool {
        self.seen.insert(record as *const Record)
    }
}

/// Serializes values against the metadata in a registry
#[derive(Debug, Clone, Copy)]
pub struct Serializer<'r> {
    registry: &'r SchemaRegistry,
}

impl<'r> Serializer<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Serialize any value; an absent top-level value becomes `null`
    pub fn serialize(&self, value: &Value) -> Json {
        let mut visited = Visited::default();
        self.walk(value, &mut visited).unwrap_or(Json::Null)
    }

    pub fn serialize_record(&self, record: &Record) -> Json {
        let mut visited = Visited::default();
        self.walk_record(record, &mut visited).unwrap_or(Json::Null)
    }

    /// Serialize a list of values as a JSON array
    pub fn serialize_all(&self, values: &[Value]) -> Json {
        let mut visited = Visited::default();
        Json::Array(
            values
                .iter()
                .map(|v| self.walk(v, &mut visited).unwrap_or(Json::Null))
                .collect(),
        )
    }

    /// `None` means the value is omitted from its parent
    fn walk(&self, value: &Value, visited: &mut Visited) -> Option<Json> {
        match value {
            Value::Absent => None,
            Value::Null => Some(Json::Null),
            Value::Bool(b) => Some(Json::Bool(*b)),
            Value::Number(n) => Some(number(*n)),
            Value::String(s) => Some(Json::String(s.clone())),
            Value::Node(node) => Some(Json::String(node.to_wire_string())),
            Value::List(items) => Some(Json::Array(
                items
                    .iter()
                    .map(|item| self.walk(item, visited).unwrap_or(Json::Null))
                    .collect(),
            )),
            Value::Record(record) => self.walk_record(record, visited),
        }
    }

    fn walk_record(&self, record: &Record, visited: &mut Visited) -> Option<Json> {
        if let Some(hook) = self.registry.hook(record.type_name()) {
            return Some(hook(record));
        }
        if !visited.first_visit(record) {
            return None;
        }

        let type_name = record.type_name();
        let mut getters: IndexMap<String, Getter> = IndexMap::new();
        for field in self.registry.computed(type_name) {
            if field.is_internal() || field.name().starts_with('_') {
                continue;
            }
            let computed = field.compute(record);
            let value = self.walk(&computed, visited);
            visited.retained.push(computed);
            getters.insert(
                field.output_key().to_string(),
                Getter {
                    value,
                    after: field.emplace_after().map(String::from),
                },
            );
        }

        let mut out: IndexMap<String, Option<Json>> = IndexMap::new();
        for (field, value) in record.fields() {
            let visibility = self.registry.visibility(type_name, field);
            if visibility.internal {
                continue;
            }
            let key = visibility.key.as_deref().unwrap_or(field);

            if !field.starts_with('_') {
                if let Some(getter) = getters.shift_remove(key) {
                    out.insert(key.to_string(), getter.value);
                    emplace_followers(key, &mut getters, &mut out);
                    continue;
                }
            }

            out.insert(key.to_string(), self.walk(value, visited));

            if let Some(public) = field.strip_prefix('_') {
                if let Some(getter) = getters.shift_remove(public) {
                    out.insert(public.to_string(), getter.value);
                    emplace_followers(public, &mut getters, &mut out);
                }
            }
            emplace_followers(key, &mut getters, &mut out);
        }

        for (key, getter) in getters {
            out.entry(key).or_insert(getter.value);
        }

        let map: Map<String, Json> = out
            .into_iter()
            .filter(|(key, _)| !key.starts_with('_'))
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect();
        Some(Json::Object(map))
    }
}

/// Insert getters anchored after `anchor`, then anything anchored after those
fn emplace_followers(
    anchor: &str,
    getters: &mut IndexMap<String, Getter>,
    out: &mut IndexMap<String, Option<Json>>,
) {
    let followers: Vec<String> = getters
        .iter()
        .filter(|(_, g)| g.after.as_deref() == Some(anchor))
        .map(|(key, _)| key.clone())
        .collect();

    for key in followers {
        if let Some(getter) = getters.shift_remove(&key) {
            out.insert(key.clone(), getter.value);
            emplace_followers(&key, getters, out);
        }
    }
}

/// Integral values print without a fraction; NaN and infinities become null
fn number(n: f64) -> Json {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Json::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
}

/// Normalize free text into an `UPPER_SNAKE` key
///
/// `" Lv. 90 Tank "` becomes `"LV_90_TANK"`.
pub fn to_key_string(input: &str) -> String {
    let mut key = String::with_capacity(input.len());
    for c in input.trim().chars().flat_map(char::to_uppercase) {
        if c.is_ascii_alphanumeric() {
            key.push(c);
        } else if !key.is_empty() && !key.ends_with('_') {
            key.push('_');
        }
    }
    while key.ends_with('_') {
        key.pop();
    }
    key
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::models::pager::pagination_field;
    use crate::schema::{ComputedField, TypeDef};

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                TypeDef::new("Entry").computed(
                    ComputedField::new("c", |r| {
                        Value::from(format!("{}!", r.str("a").unwrap_or_default()))
                    })
                    .after("a"),
                ),
            )
            .register(
                TypeDef::new("World")
                    .computed(ComputedField::new("creationOpen", |r| {
                        match r.str("_creationOpen") {
                            Some(s) => Value::Bool(s == "available"),
                            None => Value::Null,
                        }
                    }))
                    .computed(ComputedField::new("secret", |_| Value::from("x")).internal())
                    .computed(ComputedField::new("summary", |_| Value::from("tail")))
                    .internal_field("debug"),
            )
            .register(
                TypeDef::new("Search")
                    .computed(ComputedField::new("world", |_| Value::from("Ultros")).after("name"))
                    .computed(ComputedField::new("dc", |_| Value::from("Primal")).after("world"))
                    .computed(ComputedField::new("id", |_| Value::from(7_i64)).key("lodestoneId")),
            )
            .register(
                TypeDef::new("Hooked")
                    .serialize_with(|r| json!({ "custom": r.str("name") })),
            );
        registry
    }

    #[test]
    fn test_computed_emplaced_after_anchor() {
        let registry = registry();
        let record = Record::new("Entry").with("a", "x").with("b", 2.0);
        let out = Serializer::new(&registry).serialize_record(&record);

        let keys: Vec<_> = out.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["a", "c", "b"]);
        assert_eq!(out, json!({ "a": "x", "c": "x!", "b": 2 }));
    }

    #[test]
    fn test_serialization_is_idempotent() {
        let registry = registry();
        let record = Record::new("Entry").with("a", "x").with("b", 2.5);
        let serializer = Serializer::new(&registry);
        assert_eq!(serializer.serialize_record(&record), serializer.serialize_record(&record));
    }

    #[test]
    fn test_private_fields_and_internal_metadata() {
        let registry = registry();
        let record = Record::new("World")
            .with("name", "Ultros")
            .with("_creationOpen", "available")
            .with("debug", "hidden")
            .with("category", Value::Null)
            .with("unset", Value::Absent);
        let out = Serializer::new(&registry).serialize_record(&record);

        let keys: Vec<_> = out.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["name", "creationOpen", "category", "summary"]);
        assert_eq!(out["creationOpen"], json!(true));
        assert_eq!(out["category"], Json::Null);
    }

    #[test]
    fn test_chained_emplacement_and_renamed_getter() {
        let registry = registry();
        let record = Record::new("Search").with("name", "Alpha").with("avatar", "a.png");
        let out = Serializer::new(&registry).serialize_record(&record);

        let keys: Vec<_> = out.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["name", "world", "dc", "avatar", "lodestoneId"]);
        assert_eq!(out["lodestoneId"], json!(7));
    }

    #[test]
    fn test_hook_and_nested_values() {
        let registry = registry();
        let child = Record::new("Hooked").with("name", "inner");
        let record = Record::new("Plain")
            .with("child", child)
            .with("items", vec![Value::Absent, Value::from(1.5), Value::Number(f64::NAN)]);
        let out = Serializer::new(&registry).serialize_record(&record);

        assert_eq!(
            out,
            json!({ "child": { "custom": "inner" }, "items": [null, 1.5, null] })
        );
    }

    #[test]
    fn test_revisited_record_is_omitted() {
        let registry = registry();
        let shared = Arc::new(Record::new("Plain").with("v", 1.0));
        let record = Record::new("Pair")
            .with("first", Value::Record(Arc::clone(&shared)))
            .with("second", Value::Record(shared));
        let out = Serializer::new(&registry).serialize_record(&record);

        assert_eq!(out, json!({ "first": { "v": 1 } }));
    }

    #[test]
    fn test_fresh_computed_records_all_written() {
        let mut registry = SchemaRegistry::new();
        registry.register(
            TypeDef::new("Twin")
                .computed(ComputedField::new("first", |_| {
                    Value::from(Record::new("X").with("v", 1.0))
                }))
                .computed(ComputedField::new("second", |_| {
                    Value::from(Record::new("X").with("v", 2.0))
                })),
        );
        let out = Serializer::new(&registry).serialize_record(&Record::new("Twin"));

        assert_eq!(out, json!({ "first": { "v": 1 }, "second": { "v": 2 } }));
    }

    #[test]
    fn test_every_page_keeps_its_pagination() {
        let mut registry = SchemaRegistry::new();
        registry.register(TypeDef::new("Page").computed(pagination_field()));
        let pages: Vec<Value> = (0..3)
            .map(|i| Value::from(Record::new("Page").with("index", i as i64)))
            .collect();
        let out = Serializer::new(&registry).serialize_all(&pages);

        let expected = json!({ "currentPage": 1, "totalPages": 1, "nextPageUrl": null });
        for (i, page) in out.as_array().unwrap().iter().enumerate() {
            assert_eq!(page["index"], json!(i));
            assert_eq!(page["pagination"], expected);
        }
    }

    #[test]
    fn test_to_key_string() {
        assert_eq!(to_key_string(" Lv. 90 Tank "), "LV_90_TANK");
        assert_eq!(to_key_string("--Crafter/Gatherer--"), "CRAFTER_GATHERER");
        assert_eq!(to_key_string("already_KEY"), "ALREADY_KEY");
        assert_eq!(to_key_string("   "), "");
    }
}
