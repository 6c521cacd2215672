//! Generic nested document values.
//!
//! Catalog content is untyped YAML owned by many independent writers, so it is
//! carried as a [`serde_yaml::Value`] tree. This module adds the kind
//! classification the merge engine matches on, plus canonical key ordering for
//! deterministic encoding.

use std::fmt;

use serde_yaml::{Mapping, Value};

/// A nested document: mapping, sequence, string, number, bool or null.
pub type Document = Value;

/// Fundamental kind of a document value.
///
/// Integers and floats are distinct kinds: replacing `30` with `30.5` is a
/// kind conflict, just as replacing it with `"30"` would be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `null` / `~`.
    Null,
    /// `true` / `false`.
    Bool,
    /// Signed or unsigned integer.
    Integer,
    /// Floating point number.
    Float,
    /// Text.
    String,
    /// Ordered list of values.
    Sequence,
    /// Key/value mapping.
    Mapping,
}

impl ValueKind {
    /// Classifies a value. Tagged values classify as their inner value.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(n) if n.is_f64() => Self::Float,
            Value::Number(_) => Self::Integer,
            Value::String(_) => Self::String,
            Value::Sequence(_) => Self::Sequence,
            Value::Mapping(_) => Self::Mapping,
            Value::Tagged(tagged) => Self::of(&tagged.value),
        }
    }

    /// Returns true for mappings and sequences.
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Sequence | Self::Mapping)
    }

    /// Lowercase name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Sequence => "sequence",
            Self::Mapping => "mapping",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true if no direct value of `mapping` is a mapping or sequence.
#[must_use]
pub fn is_flat(mapping: &Mapping) -> bool {
    !mapping
        .values()
        .any(|value| ValueKind::of(value).is_container())
}

/// Renders a value on a single line for log and error messages.
#[must_use]
pub fn render(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
}

/// Returns the string form of a mapping key.
///
/// YAML allows non-string keys (`1.0: {...}` parses as a float key). Scalars
/// are converted to their textual form; containers are rejected.
#[must_use]
pub fn key_to_string(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Tagged(tagged) => key_to_string(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

/// Returns a copy of `value` with every mapping's keys sorted.
///
/// Sequences keep their order. Keys compare by their string form.
#[must_use]
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Mapping(mapping) => {
            let mut entries: Vec<(&Value, &Value)> = mapping.iter().collect();
            entries
                .sort_by_cached_key(|(key, _)| key_to_string(key).unwrap_or_else(|| render(key)));
            Value::Mapping(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), canonicalize(value)))
                    .collect(),
            )
        }
        Value::Sequence(items) => Value::Sequence(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
