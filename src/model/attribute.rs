use regex::Regex;

use super::value::{Resolution, Unknown, Value, ValueType};
use crate::syntax::{Expr, SourceRange};

/// String comparison mode for attribute predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Sensitive,
    Ignore,
}

impl Case {
    fn ignore(self) -> bool {
        matches!(self, Self::Ignore)
    }
}

/// One `key = value` pair inside a block.
///
/// Every predicate returns `false` when the value is unknown. Rules that
/// need to tell "unknown" apart from "known and different" go through
/// `Block::attribute` instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    name: String,
    raw: Expr,
    resolution: Resolution,
    range: SourceRange,
}

impl Attribute {
    pub fn new(name: impl Into<String>, raw: Expr, resolution: Resolution, range: SourceRange) -> Self {
        Self {
            name: name.into(),
            raw,
            resolution,
            range,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The expression as written.
    pub fn raw(&self) -> &Expr {
        &self.raw
    }

    pub fn range(&self) -> &SourceRange {
        &self.range
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn value(&self) -> Option<&Value> {
        self.resolution.known()
    }

    pub fn unknown(&self) -> Option<&Unknown> {
        self.resolution.unknown()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_known()
    }

    pub fn value_type(&self) -> ValueType {
        self.value().map(Value::value_type).unwrap_or(ValueType::Unknown)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value().and_then(Value::as_str)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.value().and_then(Value::as_bool)
    }

    pub fn as_number(&self) -> Option<f64> {
        self.value().and_then(Value::as_number)
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        self.value().and_then(Value::as_list)
    }

    /// Compare the resolved scalar value. False for unknown, list/map or
    /// type-mismatched values.
    pub fn equals(&self, expected: impl Into<Value>, case: Case) -> bool {
        let expected = expected.into();
        self.value()
            .map(|v| v.scalar_eq(&expected, case.ignore()))
            .unwrap_or(false)
    }

    /// Substring for strings, element equality for lists, key presence for maps.
    pub fn contains(&self, needle: impl Into<Value>, case: Case) -> bool {
        let needle = needle.into();
        match self.value() {
            Some(Value::String(s)) => match needle.as_str() {
                Some(n) if case.ignore() => s.to_lowercase().contains(&n.to_lowercase()),
                Some(n) => s.contains(n),
                None => false,
            },
            Some(Value::List(items)) => items.iter().any(|item| item.scalar_eq(&needle, case.ignore())),
            Some(Value::Map(map)) => match needle.as_str() {
                Some(key) if case.ignore() => map.keys().any(|k| k.eq_ignore_ascii_case(key)),
                Some(key) => map.contains_key(key),
                None => false,
            },
            _ => false,
        }
    }

    pub fn starts_with(&self, prefix: &str, case: Case) -> bool {
        match self.as_str() {
            Some(s) if case.ignore() => s.to_lowercase().starts_with(&prefix.to_lowercase()),
            Some(s) => s.starts_with(prefix),
            None => false,
        }
    }

    /// Regex match against a string value.
    pub fn matches(&self, pattern: &Regex) -> bool {
        self.as_str().map(|s| pattern.is_match(s)).unwrap_or(false)
    }

    pub fn is_true(&self) -> bool {
        self.as_bool() == Some(true)
    }

    pub fn is_false(&self) -> bool {
        self.as_bool() == Some(false)
    }
}
