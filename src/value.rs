//! Extracted values and records

use std::sync::Arc;

use indexmap::IndexMap;

use crate::document::NodeSnapshot;

static ABSENT: Value = Value::Absent;

/// A field value produced by the extraction engine
///
/// `Absent` is "never set" and is omitted on the wire; `Null` is an explicit null.
/// `Number(NaN)` marks input that could not be parsed as a number.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Absent,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Node(NodeSnapshot),
    Record(Arc<Record>),
    List(Vec<Value>),
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Absent or null
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Absent | Value::Null)
    }

    /// Emptiness rule shared by `default_if_empty` and the `EMPTY` transform condition
    ///
    /// Empty means absent or null, an all-whitespace string, a zero-length list, a node
    /// without text, or a record whose every public field is absent or null.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Absent | Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Record(record) => record.is_empty(),
            Value::Node(node) => node.text_content().is_empty(),
            Value::Bool(_) | Value::Number(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&NodeSnapshot> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    /// Text of a node-like value: node text or the string itself
    pub fn text(&self) -> Option<String> {
        match self {
            Value::Node(n) => Some(n.text.clone()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(Arc::new(r))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

/// An instance of a schema type
///
/// Stored fields keep the declaration order of the schema's rules. The engine builds a
/// fresh record per extraction call.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    type_name: String,
    fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Builder-style field insertion
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Set a stored field, keeping its original position if already present
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Field value, `Absent` when the field was never set
    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&ABSENT)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Stored fields in declaration order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn str(&self, field: &str) -> Option<&str> {
        self.get(field).as_str()
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.get(field).as_f64()
    }

    pub fn record(&self, field: &str) -> Option<&Record> {
        self.get(field).as_record()
    }

    /// List field, empty when absent
    pub fn list(&self, field: &str) -> &[Value] {
        self.get(field).as_list().unwrap_or(&[])
    }

    /// Every public (non `_`-prefixed) field is absent or null
    pub fn is_empty(&self) -> bool {
        self.fields
            .iter()
            .filter(|(k, _)| !k.starts_with('_'))
            .all(|(_, v)| v.is_missing())
    }
}
