use crate::ast::EntityType;
use crate::error::{QueryError, Result};
use std::any::TypeId;
use std::collections::HashMap;

/// SQL type of a mapped column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    BigInt,
    Integer,
    SmallInt,
    Real,
    Text,
    Boolean,
    Timestamp,
}

impl SqlType {
    pub fn is_boolean(&self) -> bool {
        matches!(self, SqlType::Boolean)
    }
}

/// Column definition: entity property bound to a table column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub property: String,
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
}

/// Declarative table mapping for one entity type.
///
/// Columns keep their declaration order; that order is the SELECT list order.
#[derive(Debug, Clone)]
pub struct EntityMapping {
    table: String,
    key: Option<String>,
    columns: Vec<ColumnDef>,
}

impl EntityMapping {
    /// Start a mapping onto `table`
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: None,
            columns: Vec::new(),
        }
    }

    /// Declare the identifying key column
    pub fn key(mut self, property: impl Into<String>, sql_type: SqlType) -> Self {
        let property = property.into();
        self.key = Some(property.clone());
        self.columns.push(ColumnDef {
            name: property.clone(),
            property,
            sql_type,
            nullable: false,
        });
        self
    }

    /// Map a non-nullable property onto a column of the same name
    pub fn column(mut self, property: impl Into<String>, sql_type: SqlType) -> Self {
        let property = property.into();
        self.columns.push(ColumnDef {
            name: property.clone(),
            property,
            sql_type,
            nullable: false,
        });
        self
    }

    /// Map a nullable property onto a column of the same name
    pub fn nullable(mut self, property: impl Into<String>, sql_type: SqlType) -> Self {
        let property = property.into();
        self.columns.push(ColumnDef {
            name: property.clone(),
            property,
            sql_type,
            nullable: true,
        });
        self
    }

    /// Map a property onto a differently named column
    pub fn column_as(
        mut self,
        property: impl Into<String>,
        column: impl Into<String>,
        sql_type: SqlType,
    ) -> Self {
        self.columns.push(ColumnDef {
            property: property.into(),
            name: column.into(),
            sql_type,
            nullable: false,
        });
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_property(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }
}

/// Entity mappings declared at startup, keyed by Rust type.
///
/// Registration does not validate; a mapping that lacks a key or columns is
/// reported when the metadata registry first resolves it.
pub struct MappingCatalog {
    mappings: HashMap<TypeId, EntityMapping>,
}

impl MappingCatalog {
    pub fn new() -> Self {
        Self {
            mappings: HashMap::new(),
        }
    }

    /// Register the mapping for entity type `T`
    pub fn register<T>(&mut self, mapping: EntityMapping) -> Result<()>
    where
        T: 'static,
    {
        let entity = EntityType::of::<T>();

        if self.mappings.contains_key(&entity.id()) {
            return Err(QueryError::Configuration(format!(
                "Entity {} already registered",
                entity.name()
            )));
        }

        self.mappings.insert(entity.id(), mapping);

        Ok(())
    }

    /// Get the mapping for an entity type
    pub fn get(&self, entity: &EntityType) -> Option<&EntityMapping> {
        self.mappings.get(&entity.id())
    }

    pub fn contains(&self, entity: &EntityType) -> bool {
        self.mappings.contains_key(&entity.id())
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl Default for MappingCatalog {
    fn default() -> Self {
        Self::new()
    }
}
