//! Typed conditions over item attributes.
//!
//! Filters are used for caller query filters and for conditional writes.
//! Adapters translate them into the backing store's expression language; the
//! in-memory store evaluates them directly with [`Filter::matches`].

use crate::types::Item;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Le(String, Value),
    Gt(String, Value),
    Ge(String, Value),
    /// Inclusive on both ends.
    Between(String, Value, Value),
    BeginsWith(String, String),
    Exists(String),
    NotExists(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(name.into(), value.into())
    }

    pub fn ne(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ne(name.into(), value.into())
    }

    pub fn lt(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Lt(name.into(), value.into())
    }

    pub fn le(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Le(name.into(), value.into())
    }

    pub fn gt(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gt(name.into(), value.into())
    }

    pub fn ge(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ge(name.into(), value.into())
    }

    pub fn between(
        name: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Filter::Between(name.into(), low.into(), high.into())
    }

    pub fn begins_with(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Filter::BeginsWith(name.into(), prefix.into())
    }

    pub fn exists(name: impl Into<String>) -> Self {
        Filter::Exists(name.into())
    }

    pub fn not_exists(name: impl Into<String>) -> Self {
        Filter::NotExists(name.into())
    }

    /// Conjunction, flattening nested `And`s.
    pub fn and(self, other: Filter) -> Self {
        let mut clauses = match self {
            Filter::And(clauses) => clauses,
            single => vec![single],
        };
        match other {
            Filter::And(more) => clauses.extend(more),
            single => clauses.push(single),
        }
        Filter::And(clauses)
    }

    pub fn or(self, other: Filter) -> Self {
        Filter::Or(vec![self, other])
    }

    pub fn negate(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// Evaluates the filter against `item`.
    ///
    /// Comparisons against a missing attribute, or between values of
    /// different JSON types, are false.
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Filter::Eq(name, value) => item.get(name).is_some_and(|v| values_equal(v, value)),
            Filter::Ne(name, value) => item.get(name).is_none_or(|v| !values_equal(v, value)),
            Filter::Lt(name, value) => compare_attr(item, name, value, Ordering::is_lt),
            Filter::Le(name, value) => compare_attr(item, name, value, Ordering::is_le),
            Filter::Gt(name, value) => compare_attr(item, name, value, Ordering::is_gt),
            Filter::Ge(name, value) => compare_attr(item, name, value, Ordering::is_ge),
            Filter::Between(name, low, high) => {
                compare_attr(item, name, low, Ordering::is_ge)
                    && compare_attr(item, name, high, Ordering::is_le)
            }
            Filter::BeginsWith(name, prefix) => item
                .get(name)
                .and_then(Value::as_str)
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            Filter::Exists(name) => item.contains_key(name),
            Filter::NotExists(name) => !item.contains_key(name),
            Filter::And(clauses) => clauses.iter().all(|f| f.matches(item)),
            Filter::Or(clauses) => clauses.iter().any(|f| f.matches(item)),
            Filter::Not(inner) => !inner.matches(item),
        }
    }
}

fn compare_attr(item: &Item, name: &str, value: &Value, accept: fn(Ordering) -> bool) -> bool {
    item.get(name)
        .and_then(|attr| compare_values(attr, value))
        .is_some_and(accept)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Orders two scalars of the same JSON type.
///
/// Integers compare exactly so that full-width geohashes keep their order.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                Some(x.cmp(&y))
            } else if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                Some(x.cmp(&y))
            } else {
                x.as_f64()?.partial_cmp(&y.as_f64()?)
            }
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
