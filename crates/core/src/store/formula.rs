//! Filter formulas for `list` queries
//!
//! The cache cannot index arbitrary predicates, so formula lookups always go
//! to the store. A formula renders to the store's filter expression syntax
//! and can also be evaluated against a payload, which in-memory stores use.

use std::fmt;

use recordcache_domain::Payload;
use serde_json::Value;

/// A record predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    /// `{field} = 'value'`
    Eq { field: String, value: String },
    /// All parts hold.
    And(Vec<Formula>),
    /// At least one part holds.
    Or(Vec<Formula>),
}

impl Formula {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq { field: field.into(), value: value.into() }
    }

    pub fn and(parts: impl IntoIterator<Item = Formula>) -> Self {
        Self::And(parts.into_iter().collect())
    }

    pub fn or(parts: impl IntoIterator<Item = Formula>) -> Self {
        Self::Or(parts.into_iter().collect())
    }

    /// Render as a store filter expression.
    pub fn render(&self) -> String {
        match self {
            Self::Eq { field, value } => format!("{{{field}}}='{}'", escape(value)),
            Self::And(parts) if parts.is_empty() => "TRUE()".to_string(),
            Self::Or(parts) if parts.is_empty() => "FALSE()".to_string(),
            Self::And(parts) => format!("AND({})", join(parts)),
            Self::Or(parts) => format!("OR({})", join(parts)),
        }
    }

    /// Evaluate against a flattened payload.
    pub fn matches(&self, payload: &Payload) -> bool {
        match self {
            Self::Eq { field, value } => match payload.get(field) {
                Some(Value::String(actual)) => actual == value,
                Some(Value::Number(actual)) => actual.to_string() == *value,
                Some(Value::Bool(actual)) => actual.to_string() == *value,
                _ => false,
            },
            Self::And(parts) => parts.iter().all(|part| part.matches(payload)),
            Self::Or(parts) => parts.iter().any(|part| part.matches(payload)),
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn join(parts: &[Formula]) -> String {
    parts.iter().map(Formula::render).collect::<Vec<_>>().join(",")
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
