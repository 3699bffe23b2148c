//! Query parameters for collection endpoints.

use crate::errors::{AppStoreConnectError, AppStoreConnectResult};

/// A query parameter value. Lists are sent comma-joined, as in
/// `fields[apps]=name,bundleId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    /// A single value.
    Single(String),
    /// A list of values.
    List(Vec<String>),
}

impl QueryValue {
    fn render(&self) -> String {
        match self {
            QueryValue::Single(v) => v.clone(),
            QueryValue::List(values) => values.join(","),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Single(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Single(value)
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        QueryValue::Single(value.to_string())
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Single(value.to_string())
    }
}

impl From<Vec<&str>> for QueryValue {
    fn from(values: Vec<&str>) -> Self {
        QueryValue::List(values.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(values: Vec<String>) -> Self {
        QueryValue::List(values)
    }
}

/// Ordered query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    params: Vec<(String, QueryValue)>,
}

impl QueryParams {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter. A repeated key replaces the earlier value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds a parameter in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        let key = key.into();
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.params.push((key, value)),
        }
    }

    /// Returns true if no parameters are set.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Form-encodes the parameters in insertion order.
    pub fn to_query_string(&self) -> AppStoreConnectResult<String> {
        let pairs: Vec<(&str, String)> = self
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.render()))
            .collect();

        serde_urlencoded::to_string(&pairs).map_err(|e| {
            AppStoreConnectError::configuration(format!("Invalid query parameters: {}", e))
        })
    }
}
