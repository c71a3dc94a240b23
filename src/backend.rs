use crate::error::Result;
use crate::writer::Parameters;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Row from a query result, keyed by column name
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    pub columns: HashMap<String, Value>,
}

impl QueryRow {
    pub fn new() -> Self {
        Self {
            columns: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.columns.insert(key.into(), value);
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.columns
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.columns
            .get(key)
            .and_then(|v| v.as_str().map(String::from))
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.columns.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.columns.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.columns.get(key).and_then(|v| v.as_bool())
    }

    /// Take a column out of the row
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.columns.remove(key)
    }

    /// Row as a JSON object
    pub fn into_json(self) -> Value {
        Value::Object(self.columns.into_iter().collect::<Map<String, Value>>())
    }
}

impl Default for QueryRow {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a query
pub type QueryResult = Vec<QueryRow>;

/// Runs compiled statements against a store.
///
/// Implementations bind `parameters` by name (`@p1`, `@p2`, ...) and report
/// store-side failures as errors; the provider attaches the SQL text.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a statement and return every row
    async fn query(&mut self, sql: &str, parameters: &Parameters) -> Result<QueryResult>;

    /// Run a statement and return the first column of the first row
    async fn scalar(&mut self, sql: &str, parameters: &Parameters) -> Result<Option<Value>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_getters() {
        let row = QueryRow::new()
            .with("Id", json!(7))
            .with("Name", json!("text"))
            .with("Score", json!(1.5))
            .with("IsActive", json!(true));

        assert_eq!(row.get_i64("Id"), Some(7));
        assert_eq!(row.get_string("Name"), Some("text".to_string()));
        assert_eq!(row.get_f64("Score"), Some(1.5));
        assert_eq!(row.get_bool("IsActive"), Some(true));
        assert_eq!(row.get::<u32>("Id"), Some(7));
        assert_eq!(row.get_i64("Missing"), None);
        assert_eq!(row.get_bool("Name"), None);
    }

    #[test]
    fn test_into_json() {
        let mut row = QueryRow::default().with("Id", json!(1)).with("Name", json!("a"));
        assert_eq!(row.remove("Name"), Some(json!("a")));
        assert_eq!(row.into_json(), json!({"Id": 1}));
    }
}
