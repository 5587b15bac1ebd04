//! Query expression builder
//!
//! Produces the JSON query strings the database service evaluates, e.g.
//! `{"method":"equal","attribute":"user","values":["ada"]}`. Providers treat
//! these strings as opaque and forward them unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One query expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    values: Vec<Value>,
}

impl Query {
    fn new(method: &str, attribute: Option<&str>, values: Vec<Value>) -> Self {
        Self {
            method: method.to_string(),
            attribute: attribute.map(str::to_owned),
            values,
        }
    }

    fn compare(method: &str, attribute: &str, value: impl Into<Value>) -> Self {
        let values = match value.into() {
            Value::Array(items) => items,
            single => vec![single],
        };
        Self::new(method, Some(attribute), values)
    }

    /// Attribute equals the value (or any of the values, if given an array).
    pub fn equal(attribute: &str, value: impl Into<Value>) -> Self {
        Self::compare("equal", attribute, value)
    }

    pub fn not_equal(attribute: &str, value: impl Into<Value>) -> Self {
        Self::compare("notEqual", attribute, value)
    }

    pub fn less_than(attribute: &str, value: impl Into<Value>) -> Self {
        Self::compare("lessThan", attribute, value)
    }

    pub fn less_than_equal(attribute: &str, value: impl Into<Value>) -> Self {
        Self::compare("lessThanEqual", attribute, value)
    }

    pub fn greater_than(attribute: &str, value: impl Into<Value>) -> Self {
        Self::compare("greaterThan", attribute, value)
    }

    pub fn greater_than_equal(attribute: &str, value: impl Into<Value>) -> Self {
        Self::compare("greaterThanEqual", attribute, value)
    }

    /// Inclusive range.
    pub fn between(attribute: &str, start: impl Into<Value>, end: impl Into<Value>) -> Self {
        Self::new("between", Some(attribute), vec![start.into(), end.into()])
    }

    /// Full-text search on an indexed attribute.
    pub fn search(attribute: &str, text: &str) -> Self {
        Self::new("search", Some(attribute), vec![Value::from(text)])
    }

    pub fn starts_with(attribute: &str, prefix: &str) -> Self {
        Self::new("startsWith", Some(attribute), vec![Value::from(prefix)])
    }

    pub fn ends_with(attribute: &str, suffix: &str) -> Self {
        Self::new("endsWith", Some(attribute), vec![Value::from(suffix)])
    }

    pub fn contains(attribute: &str, value: impl Into<Value>) -> Self {
        Self::compare("contains", attribute, value)
    }

    pub fn is_null(attribute: &str) -> Self {
        Self::new("isNull", Some(attribute), Vec::new())
    }

    pub fn is_not_null(attribute: &str) -> Self {
        Self::new("isNotNull", Some(attribute), Vec::new())
    }

    /// Restrict the attributes returned.
    pub fn select<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = attributes
            .into_iter()
            .map(|a| Value::String(a.into()))
            .collect();
        Self::new("select", None, values)
    }

    pub fn order_asc(attribute: &str) -> Self {
        Self::new("orderAsc", Some(attribute), Vec::new())
    }

    pub fn order_desc(attribute: &str) -> Self {
        Self::new("orderDesc", Some(attribute), Vec::new())
    }

    /// Page forward from the given document id.
    pub fn cursor_after(document_id: &str) -> Self {
        Self::new("cursorAfter", None, vec![Value::from(document_id)])
    }

    /// Page backward from the given document id.
    pub fn cursor_before(document_id: &str) -> Self {
        Self::new("cursorBefore", None, vec![Value::from(document_id)])
    }

    pub fn limit(count: u64) -> Self {
        Self::new("limit", None, vec![Value::from(count)])
    }

    pub fn offset(offset: u64) -> Self {
        Self::new("offset", None, vec![Value::from(offset)])
    }

    /// Parse a query string produced by this builder (or by another SDK).
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

impl From<Query> for String {
    fn from(query: Query) -> Self {
        query.to_string()
    }
}
