//! Post-extraction value transforms
//!
//! A field may carry several [`TransformStep`]s; they run in declaration order once the
//! whole record (nested records included) has been extracted.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::value::{Record, Value};

/// Custom mapping given the current value and the record being built
pub type TransformFn = Arc<dyn Fn(Value, &Record) -> Result<Value, String> + Send + Sync>;

/// Predicate used by `undefined_if` / `null_if`
pub type PredicateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Condition for `undefined_if` / `null_if`
#[derive(Clone)]
pub enum Condition {
    /// Literal equality
    Equals(Value),
    /// The `EMPTY` sentinel, per [`Value::is_empty`]
    Empty,
    Predicate(PredicateFn),
}

/// The `EMPTY` sentinel
pub const EMPTY: Condition = Condition::Empty;

impl Condition {
    pub fn predicate(f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Condition::Predicate(Arc::new(f))
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Condition::Equals(expected) => expected == value,
            Condition::Empty => value.is_empty(),
            Condition::Predicate(f) => f(value),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Equals(v) => f.debug_tuple("Equals").field(v).finish(),
            Condition::Empty => f.write_str("EMPTY"),
            Condition::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for Condition {
    fn from(s: &str) -> Self {
        Condition::Equals(Value::from(s))
    }
}

impl From<Value> for Condition {
    fn from(v: Value) -> Self {
        Condition::Equals(v)
    }
}

/// Which regex group `extract_regex` keeps
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureGroup {
    Index(usize),
    Named(String),
}

impl Default for CaptureGroup {
    fn default() -> Self {
        CaptureGroup::Index(1)
    }
}

/// One step of a field's transform pipeline
///
/// Within a step the sub-operations run in a fixed order: `extract_text`, `function`,
/// `extract_regex`, `undefined_if`, `null_if`, `trim`, `parse_number`. A matching
/// `undefined_if`/`null_if` condition ends the step early; later steps still run.
#[derive(Clone, Default)]
pub struct TransformStep {
    extract_text: bool,
    function: Option<TransformFn>,
    extract_regex: Option<Result<Regex, String>>,
    capture_group: CaptureGroup,
    trim: bool,
    parse_number: bool,
    undefined_if: Vec<Condition>,
    null_if: Vec<Condition>,
}

impl TransformStep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a node value with its text content
    pub fn extract_text(mut self) -> Self {
        self.extract_text = true;
        self
    }

    pub fn function(
        mut self,
        f: impl Fn(Value, &Record) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.function = Some(Arc::new(f));
        self
    }

    /// Keep a capture group of the first match; no match yields null.
    /// An invalid pattern fails the field's pipeline when it runs.
    pub fn extract_regex(mut self, pattern: &str) -> Self {
        self.extract_regex = Some(Regex::new(pattern).map_err(|e| e.to_string()));
        self
    }

    pub fn capture_group(mut self, index: usize) -> Self {
        self.capture_group = CaptureGroup::Index(index);
        self
    }

    pub fn capture_named(mut self, name: &str) -> Self {
        self.capture_group = CaptureGroup::Named(name.to_string());
        self
    }

    pub fn trim(mut self) -> Self {
        self.trim = true;
        self
    }

    pub fn parse_number(mut self) -> Self {
        self.parse_number = true;
        self
    }

    pub fn undefined_if(mut self, condition: impl Into<Condition>) -> Self {
        self.undefined_if.push(condition.into());
        self
    }

    pub fn null_if(mut self, condition: impl Into<Condition>) -> Self {
        self.null_if.push(condition.into());
        self
    }

    /// Run this step. Absent and null inputs pass through untouched.
    pub fn apply(&self, value: Value, record: &Record) -> Result<Value, String> {
        if value.is_missing() {
            return Ok(value);
        }

        let mut result = value;

        if self.extract_text {
            if let Value::Node(node) = &result {
                result = Value::String(node.text.clone());
            }
        }

        if let Some(f) = &self.function {
            result = f(result, record)?;
        }

        if let Some(regex) = &self.extract_regex {
            let regex = regex.as_ref().map_err(|e| format!("invalid regex: {}", e))?;
            if let Value::String(s) = &result {
                result = match regex.captures(s) {
                    Some(caps) => {
                        let group = match &self.capture_group {
                            CaptureGroup::Index(i) => caps.get(*i),
                            CaptureGroup::Named(name) => caps.name(name),
                        };
                        group
                            .map(|m| Value::String(m.as_str().to_string()))
                            .unwrap_or(Value::Null)
                    }
                    None => Value::Null,
                };
            }
        }

        if self.undefined_if.iter().any(|c| c.matches(&result)) {
            return Ok(Value::Absent);
        }
        if self.null_if.iter().any(|c| c.matches(&result)) {
            return Ok(Value::Null);
        }

        if self.trim {
            if let Value::String(s) = &result {
                result = Value::String(s.trim().to_string());
            }
        }

        if self.parse_number {
            if let Value::String(s) = &result {
                result = Value::Number(parse_number(&s.replace(',', "")));
            }
        }

        Ok(result)
    }
}

impl fmt::Debug for TransformStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformStep")
            .field("extract_text", &self.extract_text)
            .field("function", &self.function.is_some())
            .field(
                "extract_regex",
                &self
                    .extract_regex
                    .as_ref()
                    .map(|r| r.as_ref().map(Regex::as_str).unwrap_or("<invalid>")),
            )
            .field("capture_group", &self.capture_group)
            .field("trim", &self.trim)
            .field("parse_number", &self.parse_number)
            .field("undefined_if", &self.undefined_if)
            .field("null_if", &self.null_if)
            .finish()
    }
}

/// Run a whole pipeline, stopping at the first failing step
pub fn apply_pipeline(value: Value, steps: &[TransformStep], record: &Record) -> Result<Value, String> {
    steps
        .iter()
        .try_fold(value, |current, step| step.apply(current, record))
}

/// Lenient numeric parse: blank is 0, anything unparseable is NaN
pub fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if trimmed
        .chars()
        .any(|c| c.is_alphabetic() && c != 'e' && c != 'E')
    {
        return match trimmed {
            "Infinity" | "+Infinity" => f64::INFINITY,
            "-Infinity" => f64::NEG_INFINITY,
            _ => f64::NAN,
        };
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(steps: &[TransformStep], value: Value) -> Value {
        apply_pipeline(value, steps, &Record::new("Test")).unwrap()
    }

    #[test]
    fn test_parse_number_strips_thousands_separators() {
        let steps = [TransformStep::new().parse_number()];
        assert_eq!(run(&steps, Value::from("12,345")), Value::Number(12345.0));
    }

    #[test]
    fn test_parse_number_unparseable_is_nan() {
        let steps = [TransformStep::new().parse_number()];
        let result = run(&steps, Value::from("n/a"));
        assert!(result.as_f64().unwrap().is_nan());
    }

    #[test]
    fn test_null_if_short_circuits_before_parse() {
        let steps = [
            TransformStep::new().null_if("--"),
            TransformStep::new().parse_number(),
        ];
        assert_eq!(run(&steps, Value::from("--")), Value::Null);
        assert_eq!(run(&steps, Value::from("1,024")), Value::Number(1024.0));
    }

    #[test]
    fn test_null_if_skips_rest_of_same_step() {
        let step = TransformStep::new().null_if("--").trim().parse_number();
        assert_eq!(run(&[step], Value::from("--")), Value::Null);
    }

    #[test]
    fn test_empty_sentinel() {
        let undefined = [TransformStep::new().undefined_if(EMPTY)];
        let null = [TransformStep::new().null_if(EMPTY)];

        let hollow = Value::from(Record::new("Info").with("name", Value::Absent));
        assert_eq!(run(&undefined, Value::List(vec![])), Value::Absent);
        assert_eq!(run(&undefined, hollow.clone()), Value::Absent);
        assert_eq!(run(&null, Value::List(vec![])), Value::Null);
        assert_eq!(run(&null, hollow), Value::Null);

        let filled = Value::List(vec![Value::from("x")]);
        assert_eq!(run(&null, filled.clone()), filled);
    }

    #[test]
    fn test_regex_named_and_numbered_groups() {
        let pager = TransformStep::new()
            .extract_regex(r"Page (?<current>\d+) of (?<total>\d+)")
            .capture_named("total");
        assert_eq!(run(&[pager], Value::from("Page 2 of 7")), Value::from("7"));

        let world = TransformStep::new().extract_regex(r"([A-Za-z]+) \[([A-Za-z]+)\]");
        assert_eq!(run(&[world.clone()], Value::from("Ultros [Primal]")), Value::from("Ultros"));
        assert_eq!(
            run(&[world.capture_group(2)], Value::from("Ultros [Primal]")),
            Value::from("Primal")
        );

        let miss = TransformStep::new().extract_regex(r"\d+");
        assert_eq!(run(&[miss], Value::from("none")), Value::Null);
    }

    #[test]
    fn test_function_receives_record_and_errors_propagate() {
        let record = Record::new("Gc").with("_raw", "Maelstrom/Second Storm Lieutenant");
        let step = TransformStep::new().function(|value, target| {
            let raw = target.str("_raw").ok_or("missing raw")?;
            Ok(Value::from(format!("{}:{}", value.as_str().unwrap_or(""), raw.len())))
        });
        let out = apply_pipeline(Value::from("x"), &[step], &record).unwrap();
        assert_eq!(out, Value::from("x:33"));

        let failing = TransformStep::new().function(|_, _| Err("boom".to_string()));
        assert!(apply_pipeline(Value::from("x"), &[failing], &record).is_err());
    }

    #[test]
    fn test_missing_values_pass_through() {
        let steps = [TransformStep::new().null_if(EMPTY).parse_number()];
        assert_eq!(run(&steps, Value::Absent), Value::Absent);
        assert_eq!(run(&steps, Value::Null), Value::Null);
    }

    #[test]
    fn test_predicate_condition() {
        let steps = [TransformStep::new()
            .undefined_if(Condition::predicate(|v| v.as_str() == Some("-")))
            .trim()];
        assert_eq!(run(&steps, Value::from("-")), Value::Absent);
        assert_eq!(run(&steps, Value::from("  ok ")), Value::from("ok"));
    }
}
