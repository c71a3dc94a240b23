//! Operator-chain to SQL translation.
//!
//! [`Translator`] walks a [`QueryExpr`] once, outermost operator first,
//! feeding the [`SqlWriter`] and [`OperatorContext`]. Nothing is revisited:
//! ORDER BY keys are prepended as they are met, Take/Skip/Where recurse into
//! their source before recording themselves so that recorded state follows
//! authoring order.

use crate::ast::{EntityType, Expr, Lambda, Param, QueryExpr, SortDirection};
use crate::context::{OperatorContext, Projection};
use crate::error::{QueryError, Result};
use crate::eval;
use crate::metadata::{MetadataRegistry, TableDescriptor};
use crate::schema::ColumnDef;
use crate::writer::{Parameters, SqlWriter};
use serde::Deserialize;
use std::sync::Arc;

/// Translator settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Prefix of synthetic parameter names (`@p1`, `@p2`, ...)
    pub parameter_prefix: String,
    /// Most parameters a single statement may bind
    pub max_parameters: usize,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            parameter_prefix: "p".to_string(),
            max_parameters: 2100,
        }
    }
}

/// How result rows map back onto the projection
#[derive(Debug, Clone, PartialEq)]
pub enum ResultShape {
    Entity(Arc<TableDescriptor>),
    Column(ColumnDef),
}

/// Output of a translation
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub sql: String,
    pub parameters: Parameters,
    pub shape: ResultShape,
}

/// Column reference resolved against the registry
struct ColumnRef {
    entity: EntityType,
    table: Arc<TableDescriptor>,
    column: ColumnDef,
}

impl ColumnRef {
    fn sql(&self) -> String {
        self.table.qualify(&self.column)
    }
}

/// Compile a query with a fresh translator
pub fn compile(
    query: &QueryExpr,
    registry: &MetadataRegistry,
    config: &TranslatorConfig,
) -> Result<CompiledQuery> {
    Translator::new(registry, config, query.root_entity()).evaluate(query)
}

/// Single-use translator for one query
pub struct Translator<'a> {
    registry: &'a MetadataRegistry,
    writer: SqlWriter,
    context: OperatorContext,
    /// Tables in FROM/JOIN order
    tables: Vec<EntityType>,
    /// Entities whose columns were referenced
    referenced: Vec<EntityType>,
}

impl<'a> Translator<'a> {
    pub fn new(registry: &'a MetadataRegistry, config: &TranslatorConfig, root: EntityType) -> Self {
        Self {
            registry,
            writer: SqlWriter::new(config.parameter_prefix.clone(), config.max_parameters),
            context: OperatorContext::new(root),
            tables: vec![root],
            referenced: Vec::new(),
        }
    }

    /// Translate the query and finalize the statement
    pub fn evaluate(mut self, query: &QueryExpr) -> Result<CompiledQuery> {
        let root = self.context.root();
        if query.root_entity() != root {
            return Err(QueryError::Translation(format!(
                "Query is rooted at {} but the translator was created for {}",
                query.root_entity(),
                root
            )));
        }

        // Aliases follow FROM/JOIN order on a cold registry
        for entity in query.tables() {
            self.registry.descriptor(&entity)?;
        }
        let from = self.registry.descriptor(&root)?;

        if !query.is_source() {
            self.visit_query(query)?;
        }

        for entity in &self.referenced {
            if !self.tables.contains(entity) {
                return Err(QueryError::Translation(format!(
                    "{} is referenced but is not part of the query source",
                    entity
                )));
            }
        }

        let (columns, shape) = match self.context.projection() {
            Projection::Entity(entity) => {
                let table = self.registry.descriptor(&entity)?;
                (table.select_list(), ResultShape::Entity(table))
            }
            Projection::Member { entity, property } => {
                let column = self.resolve(&entity, &property)?;
                (vec![column.sql()], ResultShape::Column(column.column))
            }
        };

        let (sql, parameters) = self.writer.finalize(&self.context, &from, &columns);

        tracing::debug!(
            sql = %sql,
            parameters = parameters.len(),
            "compiled query"
        );

        Ok(CompiledQuery {
            sql,
            parameters,
            shape,
        })
    }

    fn visit_query(&mut self, node: &QueryExpr) -> Result<()> {
        match node {
            QueryExpr::Source(_) => Ok(()),
            QueryExpr::Select { source, projector } => {
                let projection = self.projection(projector)?;
                self.context.select(projection);
                self.visit_query(source)
            }
            QueryExpr::Where { source, predicate } => {
                self.visit_query(source)?;
                self.context.require_unlimited("Where")?;
                self.visit_where(predicate)
            }
            QueryExpr::OrderBy {
                source,
                key,
                direction,
            } => {
                let column = self.key_column(key)?;
                self.writer
                    .write_order(&column.sql(), *direction == SortDirection::Desc);
                self.visit_query(source)?;
                self.context.require_unlimited("OrderBy")
            }
            QueryExpr::Join {
                outer,
                inner,
                outer_key,
                inner_key,
            } => self.visit_join(outer, inner, outer_key, inner_key),
            QueryExpr::Take { source, count } => {
                self.visit_query(source)?;
                self.context.take(eval::evaluate_count(count)?)
            }
            QueryExpr::Skip { source, count } => {
                self.visit_query(source)?;
                self.context.skip(eval::evaluate_count(count)?)
            }
            QueryExpr::Distinct { source } => {
                self.visit_query(source)?;
                self.context.require_unlimited("Distinct")?;
                self.context.require_distinct();
                Ok(())
            }
            QueryExpr::First {
                source, predicate, ..
            } => {
                self.visit_query(source)?;
                if let Some(predicate) = predicate {
                    self.context.require_unlimited("A First predicate")?;
                    self.visit_where(predicate)?;
                }
                self.context.take(1)
            }
        }
    }

    fn visit_where(&mut self, predicate: &Lambda) -> Result<()> {
        self.writer.begin_predicate();
        self.visit_predicate(&predicate.body, false)
    }

    fn visit_join(
        &mut self,
        outer: &QueryExpr,
        inner: &EntityType,
        outer_key: &Lambda,
        inner_key: &Lambda,
    ) -> Result<()> {
        // Earlier joins first, so fragments come out in declaration order
        self.visit_query(outer)?;
        self.context.require_unlimited("Join")?;

        if self.tables.contains(inner) {
            return Err(QueryError::Usage(format!(
                "{} is joined to itself; self-joins share one alias and are not supported",
                inner
            )));
        }

        let left = self.key_column(outer_key)?;
        if !self.tables.contains(&left.entity) {
            return Err(QueryError::Translation(format!(
                "Outer join key belongs to {}, which is not part of the outer source",
                left.entity
            )));
        }

        let table = self.registry.descriptor(inner)?;

        let right = self.key_column(inner_key)?;
        if right.entity != *inner {
            return Err(QueryError::Translation(format!(
                "Inner join key belongs to {}, expected {}",
                right.entity, inner
            )));
        }

        self.tables.push(*inner);
        self.writer
            .write_join(&table.name, &table.alias, &left.sql(), &right.sql());
        Ok(())
    }

    fn projection(&mut self, projector: &Lambda) -> Result<Projection> {
        match &projector.body {
            Expr::Parameter(param) => {
                if !self.referenced.contains(&param.entity) {
                    self.referenced.push(param.entity);
                }
                Ok(Projection::Entity(param.entity))
            }
            Expr::Member { target, member } => match target.as_ref() {
                Expr::Parameter(param) => {
                    let column = self.column(param, member)?;
                    Ok(Projection::Member {
                        entity: column.entity,
                        property: column.column.property,
                    })
                }
                _ => Err(QueryError::Usage(
                    "Projections may select an entity or one of its members".to_string(),
                )),
            },
            other => Err(QueryError::Usage(format!(
                "Unsupported projection {:?}",
                other
            ))),
        }
    }

    fn key_column(&mut self, key: &Lambda) -> Result<ColumnRef> {
        self.column_ref(&key.body)?.ok_or_else(|| {
            QueryError::Translation(format!(
                "Key selector must reference a mapped column, found {:?}",
                key.body
            ))
        })
    }

    fn resolve(&self, entity: &EntityType, property: &str) -> Result<ColumnRef> {
        let table = self.registry.descriptor(entity)?;
        let column = table.column(property).cloned().ok_or_else(|| {
            QueryError::Configuration(format!("{} has no mapped property {}", entity, property))
        })?;
        Ok(ColumnRef {
            entity: *entity,
            table,
            column,
        })
    }

    fn column(&mut self, param: &Param, property: &str) -> Result<ColumnRef> {
        let column = self.resolve(&param.entity, property)?;
        if !self.referenced.contains(&param.entity) {
            self.referenced.push(param.entity);
        }
        Ok(column)
    }

    /// Resolve `expr` if it is a member of a query parameter
    fn column_ref(&mut self, expr: &Expr) -> Result<Option<ColumnRef>> {
        match expr {
            Expr::Member { target, member } => match target.as_ref() {
                Expr::Parameter(param) => self.column(param, member).map(Some),
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn require_column(&mut self, expr: &Expr, operation: &str) -> Result<ColumnRef> {
        self.column_ref(expr)?.ok_or_else(|| {
            QueryError::Translation(format!(
                "{} must be applied to a mapped column, found {:?}",
                operation, expr
            ))
        })
    }

    /// Emit an expression that yields a boolean
    fn visit_predicate(&mut self, expr: &Expr, negated: bool) -> Result<()> {
        match expr {
            Expr::Not(operand) => self.visit_predicate(operand, !negated),
            Expr::Binary { op, left, right } => {
                if negated {
                    self.writer.write("NOT ");
                }
                self.writer.open_brace();
                if op.is_logical() {
                    self.visit_predicate(left, false)?;
                    self.writer.write(&format!(" {} ", op));
                    self.visit_predicate(right, false)?;
                } else {
                    self.visit_value(left)?;
                    self.writer.write(&format!(" {} ", op));
                    self.visit_value(right)?;
                }
                self.writer.close_brace();
                Ok(())
            }
            Expr::Member { target, member } => match target.as_ref() {
                Expr::Parameter(param) => {
                    let column = self.column(param, member)?;
                    if !column.column.sql_type.is_boolean() {
                        return Err(QueryError::Usage(format!(
                            "{}.{} is not boolean and cannot be used as a condition",
                            column.entity, column.column.property
                        )));
                    }
                    self.writer.column_name(&column.sql());
                    self.writer.boolean(negated);
                    Ok(())
                }
                _ => self.visit_flag(expr, negated),
            },
            Expr::Constant(_) | Expr::Captured { .. } => self.visit_flag(expr, negated),
            Expr::HasValue(operand) => {
                let column = self.require_column(operand, "HasValue")?;
                self.writer.column_name(&column.sql());
                self.writer.is_null(negated);
                Ok(())
            }
            Expr::StringMatch { op, target, value } => {
                let column = self.require_column(target, "String matching")?;
                self.writer.column_name(&column.sql());
                self.writer.like(negated);
                if op.leading_wildcard() {
                    self.writer.like_prefix();
                }
                self.visit_value(value)?;
                if op.trailing_wildcard() {
                    self.writer.like_suffix();
                }
                Ok(())
            }
            Expr::CollectionContains { collection, item } => {
                let column = self.require_column(item, "Collection membership")?;
                let values = eval::evaluate_list(collection)?;
                if values.is_empty() {
                    // IN () is not valid SQL
                    self.writer.truth(negated);
                    return Ok(());
                }
                self.writer.column_name(&column.sql());
                self.writer.in_list(negated, values)
            }
            Expr::IsNullOrEmpty(operand) => {
                let column = self.require_column(operand, "IsNullOrEmpty")?;
                self.writer.write("ISNULL(");
                self.writer.column_name(&column.sql());
                self.writer.write(", ");
                self.writer.empty_string();
                self.writer.write(") ");
                self.writer.equality(negated);
                self.writer.write(" ");
                self.writer.empty_string();
                Ok(())
            }
            Expr::Parameter(_) | Expr::Array(_) => Err(QueryError::Translation(format!(
                "{:?} is not a condition",
                expr
            ))),
        }
    }

    /// Captured boolean known at compile time
    fn visit_flag(&mut self, expr: &Expr, negated: bool) -> Result<()> {
        let value = eval::evaluate(expr)?;
        let flag = value.as_bool().ok_or_else(|| {
            QueryError::Translation(format!("Expected a boolean condition, found {}", value))
        })?;
        self.writer.truth(flag != negated);
        Ok(())
    }

    /// Emit an operand of a comparison
    fn visit_value(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Member { target, member } => match target.as_ref() {
                Expr::Parameter(param) => {
                    let column = self.column(param, member)?;
                    self.writer.column_name(&column.sql());
                    Ok(())
                }
                _ => self.writer.parameter(eval::evaluate(expr)?),
            },
            Expr::Constant(value) | Expr::Captured { value, .. } => {
                self.writer.parameter(value.clone())
            }
            Expr::Parameter(_) | Expr::Array(_) => Err(QueryError::Translation(format!(
                "{:?} cannot be used as a value",
                expr
            ))),
            // Conditions are not values in T-SQL; only row-independent ones
            // can be folded into a parameter.
            Expr::Binary { .. }
            | Expr::Not(_)
            | Expr::HasValue(_)
            | Expr::StringMatch { .. }
            | Expr::CollectionContains { .. }
            | Expr::IsNullOrEmpty(_) => match eval::evaluate(expr) {
                Ok(value) => self.writer.parameter(value),
                Err(_) => Err(QueryError::Translation(format!(
                    "Row-dependent condition {:?} cannot be used as a comparison operand",
                    expr
                ))),
            },
        }
    }
}
