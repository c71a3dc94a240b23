//! Compile-and-execute front end.
//!
//! [`QueryProvider`] owns the executor behind a `tokio` lock and shares one
//! [`MetadataRegistry`] between every compilation it performs.

use crate::ast::{FirstMode, QueryExpr};
use crate::backend::{Executor, QueryResult, QueryRow};
use crate::error::{QueryError, Result};
use crate::metadata::MetadataRegistry;
use crate::translator::{self, CompiledQuery, ResultShape, TranslatorConfig};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct QueryProvider<E: Executor> {
    backend: Arc<RwLock<E>>,
    registry: Arc<MetadataRegistry>,
    config: TranslatorConfig,
}

impl<E: Executor> Clone for QueryProvider<E> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
        }
    }
}

impl<E: Executor> QueryProvider<E> {
    /// Create a provider with the default translator settings
    pub fn new(backend: E, registry: Arc<MetadataRegistry>) -> Self {
        Self::with_config(backend, registry, TranslatorConfig::default())
    }

    /// Create a provider with custom translator settings
    pub fn with_config(backend: E, registry: Arc<MetadataRegistry>, config: TranslatorConfig) -> Self {
        Self {
            backend: Arc::new(RwLock::new(backend)),
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// Translate a query without running it
    pub fn compile(&self, query: &QueryExpr) -> Result<CompiledQuery> {
        translator::compile(query, &self.registry, &self.config)
    }

    /// Run a query and return the raw rows
    pub async fn query_rows(&self, query: &QueryExpr) -> Result<QueryResult> {
        let compiled = self.compile(query)?;
        self.fetch(&compiled).await
    }

    /// Run a query and map every row onto `T`
    pub async fn query<T>(&self, query: &QueryExpr) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let compiled = self.compile(query)?;
        let rows = self.fetch(&compiled).await?;
        rows.into_iter()
            .map(|row| map_row(&compiled.shape, row))
            .collect()
    }

    /// Run a query and return its first row.
    ///
    /// An empty result is [`QueryError::NoElements`] unless the query ends in
    /// `FirstOrDefault`, which yields `None`.
    pub async fn first<T>(&self, query: &QueryExpr) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let mode = query.first_mode().unwrap_or(FirstMode::First);
        let compiled = self.compile(query)?;
        let rows = self.fetch(&compiled).await?;

        match rows.into_iter().next() {
            Some(row) => map_row(&compiled.shape, row).map(Some),
            None => match mode {
                FirstMode::FirstOrDefault => Ok(None),
                FirstMode::First | FirstMode::Single => Err(QueryError::NoElements),
            },
        }
    }

    /// Run a query and return the first column of the first row
    pub async fn scalar(&self, query: &QueryExpr) -> Result<Option<Value>> {
        let compiled = self.compile(query)?;
        let mut backend = self.backend.write().await;
        backend
            .scalar(&compiled.sql, &compiled.parameters)
            .await
            .map_err(|e| rejected(&compiled.sql, e))
    }

    async fn fetch(&self, compiled: &CompiledQuery) -> Result<QueryResult> {
        let mut backend = self.backend.write().await;
        backend
            .query(&compiled.sql, &compiled.parameters)
            .await
            .map_err(|e| rejected(&compiled.sql, e))
    }
}

fn rejected(sql: &str, error: QueryError) -> QueryError {
    tracing::warn!(sql = %sql, error = %error, "store rejected query");
    QueryError::invalid_query(sql, error)
}

/// Rename columns back to property names and deserialize
fn map_row<T>(shape: &ResultShape, mut row: QueryRow) -> Result<T>
where
    T: DeserializeOwned,
{
    let value = match shape {
        ResultShape::Entity(table) => {
            let mut object = Map::new();
            for column in &table.columns {
                let value = row.remove(&column.name).unwrap_or(Value::Null);
                object.insert(column.property.clone(), value);
            }
            Value::Object(object)
        }
        ResultShape::Column(column) => row.remove(&column.name).unwrap_or(Value::Null),
    };

    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Lambda, Param};
    use crate::builder::QueryBuilder;
    use crate::schema::{EntityMapping, MappingCatalog, SqlType};
    use crate::writer::Parameters;
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;

    struct MockBackend {
        rows: QueryResult,
        executed: Vec<String>,
    }

    impl MockBackend {
        fn new(rows: QueryResult) -> Self {
            Self {
                rows,
                executed: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl Executor for MockBackend {
        async fn query(&mut self, sql: &str, _parameters: &Parameters) -> Result<QueryResult> {
            self.executed.push(sql.to_string());
            Ok(self.rows.clone())
        }

        async fn scalar(&mut self, sql: &str, _parameters: &Parameters) -> Result<Option<Value>> {
            self.executed.push(sql.to_string());
            Ok(self
                .rows
                .first()
                .and_then(|row| row.columns.values().next().cloned()))
        }
    }

    struct Account;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "PascalCase")]
    struct AccountRow {
        id: i64,
        display_name: String,
    }

    fn registry() -> Arc<MetadataRegistry> {
        let mut catalog = MappingCatalog::new();
        catalog
            .register::<Account>(
                EntityMapping::new("Account")
                    .key("Id", SqlType::BigInt)
                    .column_as("DisplayName", "display_name", SqlType::Text),
            )
            .unwrap();
        Arc::new(MetadataRegistry::new(catalog))
    }

    #[tokio::test]
    async fn test_rows_renamed_to_properties() {
        let backend = MockBackend::new(vec![QueryRow::new()
            .with("Id", json!(3))
            .with("display_name", json!("Ada"))]);
        let provider = QueryProvider::new(backend, registry());

        let accounts: Vec<AccountRow> = provider
            .query(&QueryBuilder::source::<Account>().build())
            .await
            .unwrap();

        assert_eq!(
            accounts,
            vec![AccountRow {
                id: 3,
                display_name: "Ada".to_string()
            }]
        );
        assert_eq!(
            provider.backend.read().await.executed,
            vec!["SELECT a.[Id],a.[display_name] FROM [Account] a"]
        );
    }

    #[tokio::test]
    async fn test_first_modes_on_empty_result() {
        let provider = QueryProvider::new(MockBackend::new(vec![]), registry());

        let query = QueryBuilder::source::<Account>().first_or_default(None).build();
        let row: Option<AccountRow> = provider.first(&query).await.unwrap();
        assert!(row.is_none());

        let query = QueryBuilder::source::<Account>().first(None).build();
        let err = provider.first::<AccountRow>(&query).await.unwrap_err();
        assert!(matches!(err, QueryError::NoElements));

        let query = QueryBuilder::source::<Account>().single(None).build();
        let err = provider.first::<AccountRow>(&query).await.unwrap_err();
        assert!(matches!(err, QueryError::NoElements));
    }

    #[tokio::test]
    async fn test_member_projection() {
        let backend = MockBackend::new(vec![
            QueryRow::new().with("display_name", json!("Ada")),
            QueryRow::new().with("display_name", json!("Grace")),
        ]);
        let provider = QueryProvider::new(backend, registry());

        let a = Param::new::<Account>("a");
        let query = QueryBuilder::source::<Account>()
            .select(Lambda::single(&a, a.field("DisplayName")))
            .build();

        let names: Vec<String> = provider.query(&query).await.unwrap();
        assert_eq!(names, vec!["Ada", "Grace"]);
    }

    #[tokio::test]
    async fn test_compile_errors_skip_the_store() {
        let provider = QueryProvider::new(MockBackend::new(vec![]), registry());
        let a = Param::new::<Account>("a");
        let query = QueryBuilder::source::<Account>()
            .where_clause(Lambda::single(&a, a.field("Nope")))
            .build();

        let err = provider.query_rows(&query).await.unwrap_err();
        assert!(matches!(err, QueryError::Configuration(_)));
        assert!(provider.backend.read().await.executed.is_empty());
    }
}
