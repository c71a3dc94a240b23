use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    /// The entity type has no usable mapping (table, columns or key).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The query combines operators in a way the writer cannot express.
    #[error("Usage error: {0}")]
    Usage(String),

    /// The expression tree is malformed.
    #[error("Translation error: {0}")]
    Translation(String),

    /// The store rejected the generated statement.
    #[error("The client query is invalid: {sql}")]
    InvalidQuery {
        sql: String,
        #[source]
        source: Box<QueryError>,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Sequence contains no elements")]
    NoElements,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueryError {
    pub(crate) fn invalid_query(sql: impl Into<String>, source: QueryError) -> Self {
        QueryError::InvalidQuery {
            sql: sql.into(),
            source: Box::new(source),
        }
    }
}
