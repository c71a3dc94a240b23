//! Per-type table metadata cache.
//!
//! [`MetadataRegistry`] turns the declarations held by a [`MappingCatalog`]
//! into [`TableDescriptor`]s on first reference and keeps them for its own
//! lifetime. Any number of compilations may resolve descriptors concurrently;
//! racing first resolutions of one type materialize exactly one descriptor and
//! consume exactly one alias.

use crate::ast::EntityType;
use crate::error::{QueryError, Result};
use crate::schema::{ColumnDef, EntityMapping, MappingCatalog};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::any::TypeId;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Aliases that would parse as keywords
const RESERVED_ALIASES: &[&str] = &[
    "as", "at", "by", "go", "if", "in", "is", "of", "on", "or", "to",
];

/// Resolved table metadata for one entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub alias: String,
    pub key: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDescriptor {
    fn build(entity: &EntityType, mapping: &EntityMapping) -> Result<Self> {
        if mapping.table().is_empty() {
            return Err(QueryError::Configuration(format!(
                "Entity {} has no table name",
                entity
            )));
        }

        if mapping.columns().is_empty() {
            return Err(QueryError::Configuration(format!(
                "Entity {} maps no columns",
                entity
            )));
        }

        let key = mapping.key_property().ok_or_else(|| {
            QueryError::Configuration(format!("Entity {} has no identifying key", entity))
        })?;

        let mut seen = HashSet::new();
        for column in mapping.columns() {
            if !seen.insert(column.property.as_str()) {
                return Err(QueryError::Configuration(format!(
                    "Entity {} maps property {} twice",
                    entity, column.property
                )));
            }
        }

        Ok(Self {
            name: mapping.table().to_string(),
            alias: String::new(),
            key: key.to_string(),
            columns: mapping.columns().to_vec(),
        })
    }

    /// Look up a column by property name
    pub fn column(&self, property: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.property == property)
    }

    /// Alias-qualified, bracketed column reference
    pub fn qualify(&self, column: &ColumnDef) -> String {
        format!("{}.[{}]", self.alias, column.name)
    }

    /// Qualified references for every column, in declaration order
    pub fn select_list(&self) -> Vec<String> {
        self.columns.iter().map(|c| self.qualify(c)).collect()
    }
}

/// Sequential alias for the `index`th table: a..z, aa, ab, ...
fn alias_for(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();

    while n > 0 {
        n -= 1;
        letters.push((b'a' + (n % 26) as u8) as char);
        n /= 26;
    }

    letters.iter().rev().collect()
}

/// Metadata cache shared by every compilation against one data context
pub struct MetadataRegistry {
    catalog: MappingCatalog,
    tables: DashMap<TypeId, Arc<TableDescriptor>>,
    next_alias: AtomicUsize,
}

impl MetadataRegistry {
    pub fn new(catalog: MappingCatalog) -> Self {
        Self {
            catalog,
            tables: DashMap::new(),
            next_alias: AtomicUsize::new(0),
        }
    }

    /// Resolve the descriptor for an entity type, building it on first use
    pub fn descriptor(&self, entity: &EntityType) -> Result<Arc<TableDescriptor>> {
        if let Some(table) = self.tables.get(&entity.id()) {
            return Ok(Arc::clone(table.value()));
        }

        // The vacant entry holds the shard lock, so a racing resolver waits
        // here and then observes the occupied entry.
        match self.tables.entry(entity.id()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let mapping = self.catalog.get(entity).ok_or_else(|| {
                    QueryError::Configuration(format!("Entity {} is not mapped", entity))
                })?;

                let mut table = TableDescriptor::build(entity, mapping)?;
                table.alias = self.allocate_alias();
                let table = Arc::new(table);

                tracing::trace!(
                    entity = entity.name(),
                    table = %table.name,
                    alias = %table.alias,
                    "registered table descriptor"
                );

                entry.insert(Arc::clone(&table));
                Ok(table)
            }
        }
    }

    fn allocate_alias(&self) -> String {
        loop {
            let alias = alias_for(self.next_alias.fetch_add(1, Ordering::SeqCst));
            if !RESERVED_ALIASES.contains(&alias.as_str()) {
                return alias;
            }
        }
    }

    /// Number of materialized descriptors
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
