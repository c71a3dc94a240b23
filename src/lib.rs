//! typed-query - Typed Query to SQL Compiler
//!
//! typed-query turns a composed, typed query description into one
//! parameterized SQL Server `SELECT` statement plus a named parameter set,
//! ready to hand to a database client.
//!
//! # Architecture
//!
//! - **Mappings**: Entity types are mapped onto tables with explicit
//!   [`EntityMapping`] declarations collected in a [`MappingCatalog`]
//! - **Metadata Registry**: Table descriptors and aliases are materialized once
//!   per type and shared by every compilation
//! - **Translator**: A single pass over the operator chain fills the SQL
//!   writer and the query context
//! - **Provider**: Compiles, runs the statement through an [`Executor`] and maps
//!   rows back onto serde types
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use typed_query::prelude::*;
//!
//! struct DataType;
//!
//! fn main() -> Result<()> {
//!     let mut catalog = MappingCatalog::new();
//!     catalog.register::<DataType>(
//!         EntityMapping::new("DataType")
//!             .key("Id", SqlType::Integer)
//!             .column("Name", SqlType::Text)
//!             .column("IsActive", SqlType::Boolean)
//!             .nullable("Created", SqlType::Timestamp),
//!     )?;
//!     let registry = Arc::new(MetadataRegistry::new(catalog));
//!
//!     let m = Param::new::<DataType>("m");
//!     let query = QueryBuilder::source::<DataType>()
//!         .where_clause(Lambda::single(&m, m.field("Name").equals(Expr::constant("text"))))
//!         .build();
//!
//!     let compiled = compile(&query, &registry, &TranslatorConfig::default())?;
//!     assert_eq!(
//!         compiled.sql,
//!         "SELECT a.[Id],a.[Name],a.[IsActive],a.[Created] FROM [DataType] a WHERE (a.[Name] = @p1)"
//!     );
//!     assert_eq!(compiled.parameters.get("p1"), Some(&serde_json::json!("text")));
//!     Ok(())
//! }
//! ```
//!
//! # Scope
//!
//! Only the operators in [`QueryExpr`] are translated: filters, single-column
//! or whole-entity projections, inner equi-joins, ordering, Take/Skip,
//! Distinct and First. Anything else is rejected with an error before any SQL
//! is produced.

pub mod ast;
pub mod backend;
pub mod builder;
pub mod context;
pub mod error;
pub mod eval;
pub mod metadata;
pub mod provider;
pub mod schema;
pub mod translator;
pub mod writer;

pub use ast::{
    BinaryOp, EntityType, Expr, FirstMode, Lambda, Param, QueryExpr, SortDirection, StringOp,
};
pub use backend::{Executor, QueryResult, QueryRow};
pub use builder::QueryBuilder;
pub use context::{OperatorContext, Projection};
pub use error::{QueryError, Result};
pub use metadata::{MetadataRegistry, TableDescriptor};
pub use provider::QueryProvider;
pub use schema::{ColumnDef, EntityMapping, MappingCatalog, SqlType};
pub use translator::{compile, CompiledQuery, ResultShape, Translator, TranslatorConfig};
pub use writer::{Parameters, SqlWriter};

/// Prelude for common imports
pub mod prelude {
    pub use crate::ast::{EntityType, Expr, Lambda, Param, QueryExpr};
    pub use crate::backend::{Executor, QueryResult, QueryRow};
    pub use crate::builder::QueryBuilder;
    pub use crate::error::{QueryError, Result};
    pub use crate::metadata::MetadataRegistry;
    pub use crate::provider::QueryProvider;
    pub use crate::schema::{EntityMapping, MappingCatalog, SqlType};
    pub use crate::translator::{compile, CompiledQuery, TranslatorConfig};
    pub use crate::writer::Parameters;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        // Ensure all main types are exported
        let _catalog = MappingCatalog::new();
        let _sql_type = SqlType::Text;
        let _op = BinaryOp::Eq;
        let _config = TranslatorConfig::default();
        let _params = Parameters::new();
    }
}
