//! Path comparison expressions for stored event filters
//!
//! [`PathEvaluator`] understands a small expression language over the
//! event's JSON form:
//!
//! ```text
//! event.check.status == 2
//! event.entity.metadata.namespace != 'staging'
//! event.check.occurrences >= 3
//! event.check.is_silenced
//! !event.check.is_silenced
//! ```
//!
//! Paths start at `event`, segments are object keys or array indexes. A
//! path that does not exist evaluates to `null`.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::Value;

use super::FilterEvaluator;
use crate::error::{PipelineError, Result};
use crate::resources::Event;

/// Evaluates `path`, `!path` and `path <op> literal` expressions
#[derive(Debug, Clone)]
pub struct PathEvaluator {
    pattern: Regex,
}

impl PathEvaluator {
    /// Create an evaluator
    ///
    /// # Errors
    ///
    /// Returns an error if the expression grammar fails to compile.
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(
            r"^\s*(!)?\s*(event(?:\.[\w-]+)*)\s*(?:(==|!=|>=|<=|>|<)\s*(.+?))?\s*$",
        )?;
        Ok(Self { pattern })
    }

    fn evaluate_value(&self, expression: &str, event: &Value) -> Result<bool> {
        let captures = self
            .pattern
            .captures(expression)
            .ok_or_else(|| unsupported(expression, "not a path comparison"))?;

        let negated = captures.get(1).is_some();
        let path = captures.get(2).map_or("", |m| m.as_str());
        let actual = lookup(event, path);

        let result = match (captures.get(3), captures.get(4)) {
            (Some(op), Some(literal)) => {
                let expected = parse_literal(literal.as_str())
                    .ok_or_else(|| unsupported(expression, "invalid literal"))?;
                compare(&actual, op.as_str(), &expected)
                    .ok_or_else(|| unsupported(expression, "values cannot be ordered"))?
            }
            _ => truthy(&actual),
        };
        Ok(result != negated)
    }
}

impl FilterEvaluator for PathEvaluator {
    fn evaluate(&self, expression: &str, event: &Event) -> Result<bool> {
        let value = serde_json::to_value(event)?;
        self.evaluate_value(expression, &value)
    }
}

fn unsupported(expression: &str, reason: &str) -> anyhow::Error {
    PipelineError::InvalidResource(format!(
        "unsupported filter expression {:?}: {}",
        expression, reason
    ))
    .into()
}

fn lookup(root: &Value, path: &str) -> Value {
    let mut current = root;
    for segment in path.split('.').skip(1) {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn parse_literal(literal: &str) -> Option<Value> {
    let quoted = |q: char| literal.len() >= 2 && literal.starts_with(q) && literal.ends_with(q);
    if quoted('\'') || quoted('"') {
        return Some(Value::String(literal[1..literal.len() - 1].to_string()));
    }
    match literal {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        "null" => Some(Value::Null),
        _ => literal
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
    }
}

fn compare(actual: &Value, op: &str, expected: &Value) -> Option<bool> {
    let ordering = match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };

    match op {
        "==" => Some(ordering.map_or_else(|| actual == expected, |o| o == Ordering::Equal)),
        "!=" => Some(ordering.map_or_else(|| actual != expected, |o| o != Ordering::Equal)),
        ">" => ordering.map(|o| o == Ordering::Greater),
        "<" => ordering.map(|o| o == Ordering::Less),
        ">=" => ordering.map(|o| o != Ordering::Less),
        "<=" => ordering.map(|o| o != Ordering::Greater),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
