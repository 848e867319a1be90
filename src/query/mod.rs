//! Structural query language
//!
//! An XPath 1.0 subset evaluated against [`crate::document`] trees. Supported:
//! - absolute and relative location paths, `//`, `.`, `..`, `@name`
//! - axes: child, descendant, descendant-or-self, self, parent, ancestor,
//!   ancestor-or-self, following-sibling, preceding-sibling, attribute
//! - node tests: names, `*`, `text()`, `node()`
//! - predicates, comparisons, boolean/arithmetic operators and union (`|`)
//! - core functions such as `contains`, `starts-with`, `normalize-space`, `last`,
//!   `position`, `count`, `not`, `string`, `concat`

mod eval;
mod parser;

pub(crate) use eval::format_number;

use std::fmt;

use crate::document::XNode;

/// Compile or evaluation failure
#[derive(Debug, Clone, PartialEq)]
pub struct QueryError {
    pub query: String,
    pub message: String,
    pub offset: Option<usize>,
}

impl QueryError {
    pub(crate) fn new(query: &str, message: &str, offset: Option<usize>) -> Self {
        Self {
            query: query.to_string(),
            message: message.to_string(),
            offset,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(at) => write!(
                f,
                "Invalid query '{}': {} at offset {}",
                self.query, self.message, at
            ),
            None => write!(f, "Invalid query '{}': {}", self.query, self.message),
        }
    }
}

impl std::error::Error for QueryError {}

/// Result of evaluating a query
#[derive(Debug, Clone)]
pub enum QueryValue<'a> {
    Nodes(Vec<XNode<'a>>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl<'a> QueryValue<'a> {
    /// First node of a node-set result
    pub fn first_node(&self) -> Option<XNode<'a>> {
        match self {
            QueryValue::Nodes(nodes) => nodes.first().copied(),
            _ => None,
        }
    }

    /// XPath `string()` conversion
    pub fn to_string_value(&self) -> String {
        match self {
            QueryValue::Nodes(nodes) => nodes
                .first()
                .map(|n| n.string_value())
                .unwrap_or_default(),
            QueryValue::String(s) => s.clone(),
            QueryValue::Number(n) => eval::format_number(*n),
            QueryValue::Boolean(b) => b.to_string(),
        }
    }
}

/// A compiled query expression
#[derive(Debug, Clone)]
pub struct Query {
    source: String,
    expr: parser::Expr,
}

impl Query {
    /// Compile a query expression
    pub fn compile(source: &str) -> Result<Self, QueryError> {
        Ok(Self {
            source: source.to_string(),
            expr: parser::parse(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against a context node
    pub fn evaluate<'a>(&self, context: XNode<'a>) -> Result<QueryValue<'a>, QueryError> {
        eval::evaluate(&self.expr, context)
            .map_err(|message| QueryError::new(&self.source, &message, None))
    }
}

/// Compile and evaluate in one call
pub fn evaluate<'a>(source: &str, context: XNode<'a>) -> Result<QueryValue<'a>, QueryError> {
    Query::compile(source)?.evaluate(context)
}
