//! SQL fragment and parameter accumulation.
//!
//! The translator drives a [`SqlWriter`] while it walks the query: join
//! fragments, WHERE text and ORDER BY text are built up independently and
//! stitched together by [`SqlWriter::finalize`]. Relational emitters take the
//! negation state as an argument instead of reading a shared flag.

use crate::context::OperatorContext;
use crate::error::{QueryError, Result};
use crate::metadata::TableDescriptor;
use serde_json::{Map, Value};
use std::fmt::Write;

/// Bound parameter values in allocation order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    entries: Vec<(String, Value)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, name: String, value: Value) {
        self.entries.push((name, value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parameters as a JSON object, keys in allocation order
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self.entries.iter().cloned().collect();
        Value::Object(map)
    }
}

/// SQL writer for one compilation
#[derive(Debug)]
pub struct SqlWriter {
    joins: Vec<String>,
    where_clause: String,
    order_by: String,
    parameters: Parameters,
    next_parameter: usize,
    prefix: String,
    max_parameters: usize,
}

impl SqlWriter {
    pub fn new(prefix: impl Into<String>, max_parameters: usize) -> Self {
        Self {
            joins: Vec::new(),
            where_clause: String::new(),
            order_by: String::new(),
            parameters: Parameters::new(),
            next_parameter: 0,
            prefix: prefix.into(),
            max_parameters,
        }
    }

    pub fn write(&mut self, text: &str) {
        self.where_clause.push_str(text);
    }

    /// Start a new top-level predicate, AND-ed onto any earlier one
    pub fn begin_predicate(&mut self) {
        if !self.where_clause.is_empty() {
            self.write(" AND ");
        }
    }

    pub fn open_brace(&mut self) {
        self.write("(");
    }

    pub fn close_brace(&mut self) {
        self.write(")");
    }

    pub fn column_name(&mut self, column: &str) {
        self.write(column);
    }

    /// Bind a value. JSON null is written inline as `NULL`.
    pub fn parameter(&mut self, value: Value) -> Result<()> {
        if value.is_null() {
            self.write("NULL");
            return Ok(());
        }

        if self.parameters.len() >= self.max_parameters {
            return Err(QueryError::Usage(format!(
                "Query needs more than {} parameters",
                self.max_parameters
            )));
        }

        self.next_parameter += 1;
        let name = format!("{}{}", self.prefix, self.next_parameter);
        self.write("@");
        self.write(&name);
        self.parameters.push(name, value);
        Ok(())
    }

    /// Nullable has-value test: `IS NOT NULL`, or `IS NULL` when negated
    pub fn is_null(&mut self, negated: bool) {
        if negated {
            self.write(" IS NULL");
        } else {
            self.write(" IS NOT NULL");
        }
    }

    pub fn like(&mut self, negated: bool) {
        if negated {
            self.write(" NOT LIKE ");
        } else {
            self.write(" LIKE ");
        }
    }

    pub fn like_prefix(&mut self) {
        self.write("'%'+");
    }

    pub fn like_suffix(&mut self) {
        self.write("+'%'");
    }

    /// `[NOT] IN (@p1, @p2, ...)`, one parameter per value
    pub fn in_list(&mut self, negated: bool, values: Vec<Value>) -> Result<()> {
        if negated {
            self.write(" NOT IN ");
        } else {
            self.write(" IN ");
        }

        self.open_brace();
        let count = values.len();
        for (i, value) in values.into_iter().enumerate() {
            self.parameter(value)?;
            if i + 1 < count {
                self.write(", ");
            }
        }
        self.close_brace();
        Ok(())
    }

    /// Boolean column used as a predicate
    pub fn boolean(&mut self, negated: bool) {
        if negated {
            self.write(" = 0");
        } else {
            self.write(" <> 0");
        }
    }

    /// `=`, or `<>` when negated
    pub fn equality(&mut self, negated: bool) {
        if negated {
            self.write("<>");
        } else {
            self.write("=");
        }
    }

    pub fn empty_string(&mut self) {
        self.write("''");
    }

    /// Constant truth value for predicates known at compile time
    pub fn truth(&mut self, value: bool) {
        if value {
            self.write("1 = 1");
        } else {
            self.write("1 = 0");
        }
    }

    /// Add an ORDER BY key.
    ///
    /// Ordering operators are visited outermost first, which is the reverse
    /// of authoring order, so each key goes in front of the ones already seen.
    pub fn write_order(&mut self, name: &str, descending: bool) {
        let mut order = String::from(name);
        if descending {
            order.push_str(" DESC");
        }
        if !self.order_by.is_empty() {
            order.push_str(", ");
        }
        self.order_by.insert_str(0, &order);
    }

    pub fn write_join(&mut self, table: &str, alias: &str, left: &str, right: &str) {
        self.joins
            .push(format!(" JOIN [{}] {} ON {} = {}", table, alias, left, right));
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Assemble the statement
    pub fn finalize(
        self,
        context: &OperatorContext,
        from: &TableDescriptor,
        columns: &[String],
    ) -> (String, Parameters) {
        let mut sql = String::from("SELECT ");

        // OFFSET/FETCH replaces TOP once an offset is in play
        let offset = context.skip_count();
        let top = if offset.is_some() {
            None
        } else {
            context.take_count()
        };

        if let Some(top) = top {
            let _ = write!(sql, "TOP({}) ", top);
        }

        if context.is_distinct() {
            sql.push_str("DISTINCT ");
        }

        sql.push_str(&columns.join(","));
        let _ = write!(sql, " FROM [{}] {}", from.name, from.alias);

        for join in &self.joins {
            sql.push_str(join);
        }

        if !self.where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clause);
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by);
        } else if offset.is_some() {
            sql.push_str(" ORDER BY (SELECT NULL)");
        }

        if let Some(offset) = offset {
            let _ = write!(sql, " OFFSET {} ROWS", offset);
            if let Some(take) = context.take_count() {
                let _ = write!(sql, " FETCH NEXT {} ROWS ONLY", take);
            }
        }

        (sql, self.parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::EntityType;
    use crate::schema::{ColumnDef, SqlType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Player;

    fn player_table() -> TableDescriptor {
        TableDescriptor {
            name: "Player".to_string(),
            alias: "a".to_string(),
            key: "Id".to_string(),
            columns: vec![
                ColumnDef {
                    property: "Id".to_string(),
                    name: "Id".to_string(),
                    sql_type: SqlType::Integer,
                    nullable: false,
                },
                ColumnDef {
                    property: "Name".to_string(),
                    name: "Name".to_string(),
                    sql_type: SqlType::Text,
                    nullable: false,
                },
            ],
        }
    }

    fn finalize(writer: SqlWriter, context: &OperatorContext) -> (String, Parameters) {
        let table = player_table();
        let columns = table.select_list();
        writer.finalize(context, &table, &columns)
    }

    #[test]
    fn test_plain_select() {
        let context = OperatorContext::new(EntityType::of::<Player>());
        let (sql, params) = finalize(SqlWriter::new("p", 10), &context);

        assert_eq!(sql, "SELECT a.[Id],a.[Name] FROM [Player] a");
        assert!(params.is_empty());
    }

    #[test]
    fn test_parameters_allocated_in_order() {
        let mut writer = SqlWriter::new("p", 10);
        writer.parameter(json!("x")).unwrap();
        writer.write(" ");
        writer.parameter(Value::Null).unwrap();
        writer.write(" ");
        writer.parameter(json!(3)).unwrap();

        assert_eq!(writer.parameters().names(), vec!["p1", "p2"]);
        assert_eq!(writer.parameters().get("p2"), Some(&json!(3)));

        let context = OperatorContext::new(EntityType::of::<Player>());
        let (sql, params) = finalize(writer, &context);
        assert!(sql.ends_with("WHERE @p1 NULL @p2"));
        assert_eq!(params.to_json(), json!({"p1": "x", "p2": 3}));
    }

    #[test]
    fn test_parameter_cap() {
        let mut writer = SqlWriter::new("p", 2);
        writer.in_list(false, vec![json!(1), json!(2)]).unwrap();
        let err = writer.parameter(json!(3)).unwrap_err();
        assert!(matches!(err, QueryError::Usage(_)));
    }

    #[test]
    fn test_order_prepends() {
        let mut writer = SqlWriter::new("p", 10);
        writer.write_order("a.[Id]", false);
        writer.write_order("a.[Name]", true);

        let context = OperatorContext::new(EntityType::of::<Player>());
        let (sql, _) = finalize(writer, &context);
        assert!(sql.ends_with(" ORDER BY a.[Name] DESC, a.[Id]"));
    }

    #[test]
    fn test_top_and_distinct() {
        let mut context = OperatorContext::new(EntityType::of::<Player>());
        context.take(5).unwrap();
        context.require_distinct();

        let (sql, _) = finalize(SqlWriter::new("p", 10), &context);
        assert_eq!(sql, "SELECT TOP(5) DISTINCT a.[Id],a.[Name] FROM [Player] a");
    }

    #[test]
    fn test_offset_fetch() {
        let mut context = OperatorContext::new(EntityType::of::<Player>());
        context.skip(20).unwrap();
        context.take(10).unwrap();

        let (sql, _) = finalize(SqlWriter::new("p", 10), &context);
        assert_eq!(
            sql,
            "SELECT a.[Id],a.[Name] FROM [Player] a ORDER BY (SELECT NULL) OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
    }

    #[test]
    fn test_joins_and_predicates() {
        let mut writer = SqlWriter::new("ld__", 10);
        writer.write_join("Team", "b", "a.[TeamId]", "b.[TeamId]");
        writer.write_join("League", "c", "b.[LeagueId]", "c.[LeagueId]");
        writer.begin_predicate();
        writer.column_name("a.[Name]");
        writer.like(true);
        writer.like_prefix();
        writer.parameter(json!("bo")).unwrap();
        writer.begin_predicate();
        writer.column_name("a.[Deleted]");
        writer.is_null(true);

        let context = OperatorContext::new(EntityType::of::<Player>());
        let (sql, params) = finalize(writer, &context);
        assert_eq!(
            sql,
            "SELECT a.[Id],a.[Name] FROM [Player] a JOIN [Team] b ON a.[TeamId] = b.[TeamId] JOIN [League] c ON b.[LeagueId] = c.[LeagueId] WHERE a.[Name] NOT LIKE '%'+@ld__1 AND a.[Deleted] IS NULL"
        );
        assert_eq!(params.names(), vec!["ld__1"]);
    }
}
