//! Client filter parsing and the default operator semantics.
//!
//! Accepted shapes for the `filters` parameter:
//! - `{"attr": {"op": value, ...}}`: explicit operators, several per attribute allowed;
//! - `{"attr": value}`: the attribute's first declared operator.
//!
//! Checks run per key in this order: declared attribute, known operator, allowed operator,
//! array value for `in`/`not_in`.

use crate::action::FilterSpec;
use crate::error::{FilterErrorCode, RequestError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Comparison applied by a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Equal.
    Eq,
    /// Not equal.
    NotEq,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Member of the given array.
    In,
    /// Not a member of the given array.
    NotIn,
    /// String prefix.
    StartsWith,
    /// String suffix.
    EndsWith,
}

impl FilterOperator {
    /// Every operator, in documentation order.
    pub const ALL: [FilterOperator; 10] = [
        Self::Eq,
        Self::NotEq,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::In,
        Self::NotIn,
        Self::StartsWith,
        Self::EndsWith,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::NotEq => "not_eq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
        }
    }

    /// `in` and `not_in` take an array operand.
    pub fn needs_array(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// Default predicate: does `actual` satisfy `self` against `expected`?
    ///
    /// Numbers compare numerically (numeric strings included), strings lexically; values
    /// of incomparable kinds never satisfy an ordering operator.
    pub fn matches(&self, actual: &Value, expected: &Value) -> bool {
        match self {
            Self::Eq => loose_eq(actual, expected),
            Self::NotEq => !loose_eq(actual, expected),
            Self::Gt => compare(actual, expected) == Some(Ordering::Greater),
            Self::Gte => matches!(compare(actual, expected), Some(Ordering::Greater | Ordering::Equal)),
            Self::Lt => compare(actual, expected) == Some(Ordering::Less),
            Self::Lte => matches!(compare(actual, expected), Some(Ordering::Less | Ordering::Equal)),
            Self::In => expected.as_array().is_some_and(|set| set.iter().any(|e| loose_eq(actual, e))),
            Self::NotIn => {
                expected.as_array().is_some_and(|set| !set.iter().any(|e| loose_eq(actual, e)))
            }
            Self::StartsWith => text_pair(actual, expected).is_some_and(|(a, e)| a.starts_with(&e)),
            Self::EndsWith => text_pair(actual, expected).is_some_and(|(a, e)| a.ends_with(&e)),
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|op| op.as_str() == s).ok_or_else(|| {
            RequestError::filter(
                FilterErrorCode::InvalidOperator,
                format!("`{s}` is not a recognized filter operator"),
            )
        })
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loose_eq(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            matches!((as_number(actual), as_number(expected)), (Some(a), Some(b)) if a == b)
        }
        _ => false,
    }
}

fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => as_number(actual)?.partial_cmp(&as_number(expected)?),
    }
}

fn text_pair(actual: &Value, expected: &Value) -> Option<(String, String)> {
    let text = |v: &Value| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    Some((text(actual)?, text(expected)?))
}

/// One validated client filter.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedFilter {
    /// Filterable attribute.
    pub attribute: String,
    /// Effective operator.
    pub operator: FilterOperator,
    /// Operand.
    pub value: Value,
}

/// Validate the raw `filters` parameter against the declared filterable attributes.
pub fn parse_filters(
    raw: &Value,
    declared: &BTreeMap<String, FilterSpec>,
) -> Result<Vec<AppliedFilter>, RequestError> {
    let entries = raw.as_object().ok_or_else(|| {
        RequestError::filter(FilterErrorCode::MalformedFilters, "filters must be an object")
    })?;

    let mut applied = Vec::new();
    for (attribute, requested) in entries {
        let spec = declared.get(attribute).ok_or_else(|| {
            RequestError::filter(
                FilterErrorCode::UnsupportedAttribute,
                format!("filtering by `{attribute}` is not supported"),
            )
        })?;

        let pairs: Vec<(FilterOperator, Value)> = match requested {
            Value::Object(ops) => ops
                .iter()
                .map(|(op, value)| Ok((op.parse::<FilterOperator>()?, value.clone())))
                .collect::<Result<_, RequestError>>()?,
            value => {
                let op = spec.default_operator().ok_or_else(|| {
                    RequestError::filter(
                        FilterErrorCode::InvalidOperator,
                        format!("`{attribute}` declares no operators"),
                    )
                })?;
                vec![(op, value.clone())]
            }
        };

        for (operator, value) in pairs {
            if !spec.operators().contains(&operator) {
                return Err(RequestError::filter(
                    FilterErrorCode::InvalidOperator,
                    format!("operator `{operator}` is not allowed for `{attribute}`"),
                ));
            }
            if operator.needs_array() && !value.is_array() {
                return Err(RequestError::filter(
                    FilterErrorCode::ArrayNeeded,
                    format!("operator `{operator}` on `{attribute}` needs an array value"),
                ));
            }
            applied.push(AppliedFilter { attribute: attribute.clone(), operator, value });
        }
    }
    Ok(applied)
}

/// `{attribute: {operator: value}}` record of the effective filters.
pub fn filters_flag(applied: &[AppliedFilter]) -> Value {
    let mut flag = Map::new();
    for filter in applied {
        let slot = flag
            .entry(filter.attribute.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(ops) = slot {
            ops.insert(filter.operator.as_str().to_string(), filter.value.clone());
        }
    }
    Value::Object(flag)
}
