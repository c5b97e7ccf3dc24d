//! Predicate value objects consumed by the query builder.
//!
//! A [`Filter`] names a field (or an expression standing in for one) plus any
//! number of [`FilterClause`]s. Filters without clauses only select the field;
//! filters with clauses also contribute a WHERE predicate. [`DisplayMode`]
//! decides whether the field shows up in the SELECT/GROUP BY lists.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DisplayMode {
    #[default]
    Column,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchRule {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    /// Substring containment.
    Ct,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MatchValue {
    pub fn is_text(&self) -> bool {
        matches!(self, MatchValue::Text(_))
    }
}

impl fmt::Display for MatchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchValue::Bool(value) => write!(f, "{value}"),
            MatchValue::Integer(value) => write!(f, "{value}"),
            MatchValue::Float(value) => write!(f, "{value}"),
            MatchValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for MatchValue {
    fn from(value: &str) -> Self {
        MatchValue::Text(value.to_string())
    }
}

impl From<String> for MatchValue {
    fn from(value: String) -> Self {
        MatchValue::Text(value)
    }
}

impl From<bool> for MatchValue {
    fn from(value: bool) -> Self {
        MatchValue::Bool(value)
    }
}

impl From<i64> for MatchValue {
    fn from(value: i64) -> Self {
        MatchValue::Integer(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    pub match_on: Vec<MatchValue>,
    pub match_rule: MatchRule,
    /// Values are raw expressions (function calls) and must not be quoted.
    #[serde(default)]
    pub is_function: bool,
}

impl FilterClause {
    pub fn new(match_on: Vec<MatchValue>, match_rule: MatchRule) -> Self {
        Self {
            match_on,
            match_rule,
            is_function: false,
        }
    }

    pub fn single(value: impl Into<MatchValue>, match_rule: MatchRule) -> Self {
        Self::new(vec![value.into()], match_rule)
    }

    pub fn function(expression: impl Into<String>, match_rule: MatchRule) -> Self {
        Self {
            match_on: vec![MatchValue::Text(expression.into())],
            match_rule,
            is_function: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field_name: String,
    #[serde(default)]
    pub filter_clauses: Vec<FilterClause>,
    #[serde(default)]
    pub display_mode: DisplayMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_alias: Option<String>,
}

impl Filter {
    /// A visible column with no predicate.
    pub fn column(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            filter_clauses: Vec::new(),
            display_mode: DisplayMode::Column,
            field_alias: None,
        }
    }

    /// A predicate-only filter that never reaches the SELECT list.
    pub fn hidden(field_name: impl Into<String>, clause: FilterClause) -> Self {
        Self {
            field_name: field_name.into(),
            filter_clauses: vec![clause],
            display_mode: DisplayMode::Hidden,
            field_alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.field_alias = Some(alias.into());
        self
    }

    pub fn is_visible(&self) -> bool {
        self.display_mode == DisplayMode::Column
    }

    /// The sanitized alias, but only when it differs from the field name.
    pub fn distinct_alias(&self) -> Option<String> {
        self.field_alias
            .as_deref()
            .filter(|alias| !alias.is_empty() && *alias != self.field_name)
            .map(sanitize_alias)
    }

    /// The identifier other clauses use to refer to this column.
    pub fn output_name(&self) -> String {
        match self.field_alias.as_deref() {
            Some(alias) if !alias.is_empty() => sanitize_alias(alias),
            _ => self.field_name.clone(),
        }
    }

    /// True when the filter pins the field to exactly one value.
    pub fn is_equality(&self) -> bool {
        self.filter_clauses.len() == 1
            && self.filter_clauses[0].match_rule == MatchRule::Eq
            && self.filter_clauses[0].match_on.len() == 1
    }
}

/// Replaces every non-word character so the result is usable as an output
/// identifier.
pub fn sanitize_alias(alias: &str) -> String {
    alias
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
