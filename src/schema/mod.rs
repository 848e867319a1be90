//! Schema declarations
//!
//! A [`SchemaRegistry`] maps type names to [`TypeDef`]s: extraction rules, transform
//! pipelines, computed fields and serialization metadata. Types may extend a parent
//! type; lookups walk from the derived type towards its bases. The registry is built
//! once and shared read-only.

pub mod transform;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;

use crate::error::ExtractError;
use crate::query::{Query, QueryError};
use crate::value::{Record, Value};

pub use transform::{CaptureGroup, Condition, TransformStep, EMPTY};

/// Target type a matched value is coerced to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    String,
    Number,
    Boolean,
    /// Keep the matched node as a [`crate::document::NodeSnapshot`]
    Node,
    /// Nested record of the named schema type
    Schema(String),
}

impl ValueType {
    pub fn schema(name: &str) -> Self {
        ValueType::Schema(name.to_string())
    }
}

/// Per-rule options
#[derive(Debug, Clone, Default)]
pub struct RuleOptions {
    /// Explicit type, overrides the declared one
    pub resolve_as: Option<ValueType>,
    pub default: Option<Value>,
    pub default_if_empty: bool,
    pub many: bool,
}

/// Binds one record field to a query
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    field: String,
    query: String,
    declared: ValueType,
    options: RuleOptions,
    compiled: OnceLock<Result<Query, QueryError>>,
}

impl ExtractionRule {
    /// String-typed rule
    pub fn new(field: &str, query: &str) -> Self {
        Self {
            field: field.to_string(),
            query: query.to_string(),
            declared: ValueType::String,
            options: RuleOptions::default(),
            compiled: OnceLock::new(),
        }
    }

    pub fn number(self) -> Self {
        self.typed(ValueType::Number)
    }

    pub fn boolean(self) -> Self {
        self.typed(ValueType::Boolean)
    }

    pub fn node(self) -> Self {
        self.typed(ValueType::Node)
    }

    pub fn schema(self, type_name: &str) -> Self {
        self.typed(ValueType::schema(type_name))
    }

    /// Set the declared type
    pub fn typed(mut self, ty: ValueType) -> Self {
        self.declared = ty;
        self
    }

    /// Explicit type override
    pub fn resolve_as(mut self, ty: ValueType) -> Self {
        self.options.resolve_as = Some(ty);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.options.default = Some(value.into());
        self
    }

    pub fn default_if_empty(mut self) -> Self {
        self.options.default_if_empty = true;
        self
    }

    pub fn many(mut self) -> Self {
        self.options.many = true;
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn query_source(&self) -> &str {
        &self.query
    }

    pub fn options(&self) -> &RuleOptions {
        &self.options
    }

    /// Explicit override if given, else the declared type
    pub fn resolved_type(&self) -> &ValueType {
        self.options.resolve_as.as_ref().unwrap_or(&self.declared)
    }

    /// Declared default, or `Absent`
    pub fn default_or_absent(&self) -> Value {
        self.options.default.clone().unwrap_or(Value::Absent)
    }

    /// Declared default, or `Null`
    pub fn default_or_null(&self) -> Value {
        self.options.default.clone().unwrap_or(Value::Null)
    }

    /// Compiled query, compiled on first use
    pub fn query(&self) -> Result<&Query, ExtractError> {
        self.compiled
            .get_or_init(|| Query::compile(&self.query))
            .as_ref()
            .map_err(|e| ExtractError::Query(e.clone()))
    }
}

/// Derived value function of a computed field
pub type ComputeFn = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

/// Derived field evaluated at serialization time
#[derive(Clone)]
pub struct ComputedField {
    name: String,
    compute: ComputeFn,
    internal: bool,
    key: Option<String>,
    after: Option<String>,
}

impl ComputedField {
    pub fn new(name: &str, compute: impl Fn(&Record) -> Value + Send + Sync + 'static) -> Self {
        Self {
            name: name.to_string(),
            compute: Arc::new(compute),
            internal: false,
            key: None,
            after: None,
        }
    }

    /// Never serialized
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// Output under a different key
    pub fn key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    /// Emplace right after the named output key
    pub fn after(mut self, key: &str) -> Self {
        self.after = Some(key.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.name)
    }

    pub fn emplace_after(&self) -> Option<&str> {
        self.after.as_deref()
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub fn compute(&self, record: &Record) -> Value {
        (self.compute)(record)
    }
}

impl fmt::Debug for ComputedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedField")
            .field("name", &self.name)
            .field("internal", &self.internal)
            .field("key", &self.key)
            .field("after", &self.after)
            .finish()
    }
}

/// Serialization metadata for a stored field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldVisibility {
    pub internal: bool,
    pub key: Option<String>,
}

/// Custom serialization replacing the default record walk
pub type SerializeHook = Arc<dyn Fn(&Record) -> serde_json::Value + Send + Sync>;

/// Declaration of one schema type
#[derive(Clone, Default)]
pub struct TypeDef {
    name: String,
    parent: Option<String>,
    rules: Vec<ExtractionRule>,
    transforms: IndexMap<String, Vec<TransformStep>>,
    computed: Vec<ComputedField>,
    visibility: HashMap<String, FieldVisibility>,
    hook: Option<SerializeHook>,
}

impl TypeDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn extends(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    /// Add a rule; redeclaring a field replaces the earlier rule in place
    pub fn rule(mut self, rule: ExtractionRule) -> Self {
        match self.rules.iter().position(|r| r.field == rule.field) {
            Some(index) => self.rules[index] = rule,
            None => self.rules.push(rule),
        }
        self
    }

    /// Append a transform step to a field's pipeline
    pub fn transform(mut self, field: &str, step: TransformStep) -> Self {
        self.transforms
            .entry(field.to_string())
            .or_default()
            .push(step);
        self
    }

    pub fn computed(mut self, field: ComputedField) -> Self {
        self.computed.push(field);
        self
    }

    /// Keep a stored field out of serialized output
    pub fn internal_field(mut self, field: &str) -> Self {
        self.visibility.entry(field.to_string()).or_default().internal = true;
        self
    }

    /// Serialize a stored field under another key
    pub fn field_key(mut self, field: &str, key: &str) -> Self {
        self.visibility.entry(field.to_string()).or_default().key = Some(key.to_string());
        self
    }

    pub fn serialize_with(
        mut self,
        hook: impl Fn(&Record) -> serde_json::Value + Send + Sync + 'static,
    ) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDef")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("rules", &self.rules)
            .field("transforms", &self.transforms.keys().collect::<Vec<_>>())
            .field("computed", &self.computed)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

/// All schema types known to an extractor
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    types: HashMap<String, TypeDef>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type, replacing any earlier definition with the same name
    pub fn register(&mut self, def: TypeDef) -> &mut Self {
        self.types.insert(def.name.clone(), def);
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn get(&self, type_name: &str) -> Option<&TypeDef> {
        self.types.get(type_name)
    }

    /// Type followed by its ancestors, derived first
    fn chain(&self, type_name: &str) -> Result<Vec<&TypeDef>, ExtractError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(type_name);

        while let Some(name) = current {
            if !seen.insert(name) {
                break;
            }
            let def = self
                .types
                .get(name)
                .ok_or_else(|| ExtractError::UnknownSchema(name.to_string()))?;
            chain.push(def);
            current = def.parent.as_deref();
        }

        Ok(chain)
    }

    /// Effective rules of a type: derived rules first, then inherited rules for fields
    /// the derived types did not redeclare
    pub fn rules(&self, type_name: &str) -> Result<Vec<&ExtractionRule>, ExtractError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::new();

        for def in self.chain(type_name)? {
            for rule in &def.rules {
                if seen.insert(rule.field.as_str()) {
                    rules.push(rule);
                }
            }
        }

        Ok(rules)
    }

    /// Transform pipeline for a field: the first type in the chain that declares one wins
    pub fn transforms(&self, type_name: &str, field: &str) -> &[TransformStep] {
        self.chain(type_name)
            .unwrap_or_default()
            .into_iter()
            .find_map(|def| def.transforms.get(field))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Computed fields, base declarations first; a derived type redeclaring a name
    /// replaces it in place
    pub fn computed(&self, type_name: &str) -> Vec<&ComputedField> {
        let mut fields: IndexMap<&str, &ComputedField> = IndexMap::new();

        for def in self.chain(type_name).unwrap_or_default().into_iter().rev() {
            for field in &def.computed {
                fields.insert(field.name.as_str(), field);
            }
        }

        fields.into_values().collect()
    }

    /// Evaluate a computed field by name
    pub fn compute(&self, record: &Record, name: &str) -> Value {
        self.computed(record.type_name())
            .into_iter()
            .find(|f| f.name == name)
            .map(|f| f.compute(record))
            .unwrap_or(Value::Absent)
    }

    pub fn visibility(&self, type_name: &str, field: &str) -> FieldVisibility {
        self.chain(type_name)
            .unwrap_or_default()
            .into_iter()
            .find_map(|def| def.visibility.get(field))
            .cloned()
            .unwrap_or_default()
    }

    pub fn hook(&self, type_name: &str) -> Option<&SerializeHook> {
        self.chain(type_name)
            .unwrap_or_default()
            .into_iter()
            .find_map(|def| def.hook.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                TypeDef::new("Base")
                    .rule(ExtractionRule::new("name", "./h1/text()"))
                    .rule(ExtractionRule::new("count", "./span/text()").number())
                    .transform("name", TransformStep::new().trim())
                    .computed(ComputedField::new("label", |_| Value::from("base")))
                    .computed(ComputedField::new("kind", |_| Value::from("base"))),
            )
            .register(
                TypeDef::new("Derived")
                    .extends("Base")
                    .rule(ExtractionRule::new("count", "./b/text()").boolean())
                    .rule(ExtractionRule::new("extra", "./i/text()"))
                    .transform("count", TransformStep::new().null_if("--"))
                    .computed(ComputedField::new("label", |_| Value::from("derived"))),
            );
        registry
    }

    #[test]
    fn test_rules_walk_derived_first() {
        let registry = registry();
        let rules = registry.rules("Derived").unwrap();
        let fields: Vec<_> = rules.iter().map(|r| r.field()).collect();
        assert_eq!(fields, vec!["count", "extra", "name"]);

        let count = rules[0];
        assert_eq!(count.query_source(), "./b/text()");
        assert_eq!(count.resolved_type(), &ValueType::Boolean);
    }

    #[test]
    fn test_unknown_type() {
        let registry = registry();
        assert!(matches!(
            registry.rules("Nope"),
            Err(ExtractError::UnknownSchema(name)) if name == "Nope"
        ));
    }

    #[test]
    fn test_transform_lookup_inherits() {
        let registry = registry();
        assert_eq!(registry.transforms("Derived", "name").len(), 1);
        assert_eq!(registry.transforms("Derived", "count").len(), 1);
        assert!(registry.transforms("Base", "count").is_empty());
        assert!(registry.transforms("Derived", "extra").is_empty());
    }

    #[test]
    fn test_computed_override_keeps_position() {
        let registry = registry();
        let record = Record::new("Derived");
        let computed = registry.computed("Derived");
        let names: Vec<_> = computed.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["label", "kind"]);
        assert_eq!(registry.compute(&record, "label"), Value::from("derived"));
        assert!(registry.compute(&record, "missing").is_absent());
    }

    #[test]
    fn test_resolve_override_and_lazy_compile() {
        let rule = ExtractionRule::new("items", "./li")
            .schema("Item")
            .resolve_as(ValueType::Node)
            .many();
        assert_eq!(rule.resolved_type(), &ValueType::Node);
        assert!(rule.query().is_ok());

        let broken = ExtractionRule::new("bad", "./li[");
        assert!(matches!(broken.query(), Err(ExtractError::Query(_))));
    }

    #[test]
    fn test_parent_cycle_terminates() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                TypeDef::new("A")
                    .extends("B")
                    .rule(ExtractionRule::new("a", ".")),
            )
            .register(
                TypeDef::new("B")
                    .extends("A")
                    .rule(ExtractionRule::new("b", ".")),
            );
        assert_eq!(registry.rules("A").unwrap().len(), 2);
    }
}
