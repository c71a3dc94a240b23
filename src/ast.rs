//! Query expression tree handed to the translator.
//!
//! A query is an operator chain ([`QueryExpr`]) rooted at
//! [`QueryExpr::Source`], the untouched data source for one entity type.
//! Predicates, projections and key selectors are [`Lambda`]s over scalar
//! [`Expr`] nodes.

use serde_json::Value;
use std::any::TypeId;
use std::fmt;

/// Identity of a mapped entity type
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityType {
    id: TypeId,
    name: &'static str,
}

impl EntityType {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityType({})", self.name)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Lambda parameter bound to one row of an entity type
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub entity: EntityType,
}

impl Param {
    pub fn new<T: 'static>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity: EntityType::of::<T>(),
        }
    }

    /// The parameter itself as an expression
    pub fn expr(&self) -> Expr {
        Expr::Parameter(self.clone())
    }

    /// Member access on the parameter, i.e. a column reference
    pub fn field(&self, property: impl Into<String>) -> Expr {
        self.expr().member(property)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<Param>,
    pub body: Expr,
}

impl Lambda {
    pub fn new(params: Vec<Param>, body: Expr) -> Self {
        Self { params, body }
    }

    pub fn single(param: &Param, body: Expr) -> Self {
        Self::new(vec![param.clone()], body)
    }
}

/// Comparison and logical operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Eq => write!(f, "="),
            BinaryOp::Ne => write!(f, "<>"),
            BinaryOp::Lt => write!(f, "<"),
            BinaryOp::Le => write!(f, "<="),
            BinaryOp::Gt => write!(f, ">"),
            BinaryOp::Ge => write!(f, ">="),
            BinaryOp::And => write!(f, "AND"),
            BinaryOp::Or => write!(f, "OR"),
        }
    }
}

/// String methods rendered as LIKE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOp {
    Contains,
    StartsWith,
    EndsWith,
}

impl StringOp {
    pub fn leading_wildcard(&self) -> bool {
        matches!(self, StringOp::Contains | StringOp::EndsWith)
    }

    pub fn trailing_wildcard(&self) -> bool {
        matches!(self, StringOp::Contains | StringOp::StartsWith)
    }
}

/// Scalar and predicate expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to a lambda parameter
    Parameter(Param),
    /// Member access; on a parameter this is a column
    Member { target: Box<Expr>, member: String },
    /// Nullable "has value" test
    HasValue(Box<Expr>),
    Constant(Value),
    /// Variable captured from the enclosing scope
    Captured { name: String, value: Value },
    Array(Vec<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    StringMatch {
        op: StringOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `collection.contains(item)`
    CollectionContains {
        collection: Box<Expr>,
        item: Box<Expr>,
    },
    IsNullOrEmpty(Box<Expr>),
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    pub fn null() -> Self {
        Expr::Constant(Value::Null)
    }

    pub fn captured(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Expr::Captured {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn array(items: Vec<Expr>) -> Self {
        Expr::Array(items)
    }

    pub fn member(self, member: impl Into<String>) -> Self {
        Expr::Member {
            target: Box::new(self),
            member: member.into(),
        }
    }

    pub fn has_value(self) -> Self {
        Expr::HasValue(Box::new(self))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn equals(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Eq, self, other)
    }

    pub fn not_equals(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Ne, self, other)
    }

    pub fn lt(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Lt, self, other)
    }

    pub fn le(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Le, self, other)
    }

    pub fn gt(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Gt, self, other)
    }

    pub fn ge(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Ge, self, other)
    }

    pub fn and(self, other: Expr) -> Self {
        Self::binary(BinaryOp::And, self, other)
    }

    pub fn or(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Or, self, other)
    }

    fn string_match(self, op: StringOp, value: Expr) -> Self {
        Expr::StringMatch {
            op,
            target: Box::new(self),
            value: Box::new(value),
        }
    }

    pub fn contains(self, value: Expr) -> Self {
        self.string_match(StringOp::Contains, value)
    }

    pub fn starts_with(self, value: Expr) -> Self {
        self.string_match(StringOp::StartsWith, value)
    }

    pub fn ends_with(self, value: Expr) -> Self {
        self.string_match(StringOp::EndsWith, value)
    }

    /// `self` is the collection, `item` the tested element
    pub fn contains_item(self, item: Expr) -> Self {
        Expr::CollectionContains {
            collection: Box::new(self),
            item: Box::new(item),
        }
    }

    pub fn is_null_or_empty(self) -> Self {
        Expr::IsNullOrEmpty(Box::new(self))
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Which single-element operator terminated the query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstMode {
    First,
    FirstOrDefault,
    Single,
}

/// Operator chain
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    /// Untouched data source
    Source(EntityType),
    Where {
        source: Box<QueryExpr>,
        predicate: Lambda,
    },
    Select {
        source: Box<QueryExpr>,
        projector: Lambda,
    },
    Join {
        outer: Box<QueryExpr>,
        inner: EntityType,
        outer_key: Lambda,
        inner_key: Lambda,
    },
    /// OrderBy, ThenBy and their descending forms
    OrderBy {
        source: Box<QueryExpr>,
        key: Lambda,
        direction: SortDirection,
    },
    Take {
        source: Box<QueryExpr>,
        count: Expr,
    },
    Skip {
        source: Box<QueryExpr>,
        count: Expr,
    },
    Distinct {
        source: Box<QueryExpr>,
    },
    First {
        source: Box<QueryExpr>,
        predicate: Option<Lambda>,
        mode: FirstMode,
    },
}

impl QueryExpr {
    /// Entity type of the source at the bottom of the chain
    pub fn root_entity(&self) -> EntityType {
        match self {
            QueryExpr::Source(entity) => *entity,
            QueryExpr::Join { outer, .. } => outer.root_entity(),
            QueryExpr::Where { source, .. }
            | QueryExpr::Select { source, .. }
            | QueryExpr::OrderBy { source, .. }
            | QueryExpr::Take { source, .. }
            | QueryExpr::Skip { source, .. }
            | QueryExpr::Distinct { source }
            | QueryExpr::First { source, .. } => source.root_entity(),
        }
    }

    /// Root entity followed by each joined entity, in FROM/JOIN order
    pub fn tables(&self) -> Vec<EntityType> {
        match self {
            QueryExpr::Source(entity) => vec![*entity],
            QueryExpr::Join { outer, inner, .. } => {
                let mut tables = outer.tables();
                tables.push(*inner);
                tables
            }
            QueryExpr::Where { source, .. }
            | QueryExpr::Select { source, .. }
            | QueryExpr::OrderBy { source, .. }
            | QueryExpr::Take { source, .. }
            | QueryExpr::Skip { source, .. }
            | QueryExpr::Distinct { source }
            | QueryExpr::First { source, .. } => source.tables(),
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, QueryExpr::Source(_))
    }

    /// Mode of the outermost single-element operator, if any
    pub fn first_mode(&self) -> Option<FirstMode> {
        match self {
            QueryExpr::First { mode, .. } => Some(*mode),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Player;
    struct Team;

    #[test]
    fn test_root_entity_through_join() {
        let team = Param::new::<Team>("t");
        let player = Param::new::<Player>("p");

        let query = QueryExpr::Take {
            source: Box::new(QueryExpr::Join {
                outer: Box::new(QueryExpr::Source(EntityType::of::<Team>())),
                inner: EntityType::of::<Player>(),
                outer_key: Lambda::single(&team, team.field("TeamId")),
                inner_key: Lambda::single(&player, player.field("TeamId")),
            }),
            count: Expr::constant(3),
        };

        assert_eq!(query.root_entity(), EntityType::of::<Team>());
        assert_eq!(
            query.tables(),
            vec![EntityType::of::<Team>(), EntityType::of::<Player>()]
        );
        assert!(!query.is_source());
        assert_eq!(query.first_mode(), None);
    }

    #[test]
    fn test_expression_helpers() {
        let p = Param::new::<Player>("p");
        let expr = !p.field("Name").contains(Expr::constant("al"));

        match expr {
            Expr::Not(inner) => match *inner {
                Expr::StringMatch { op, value, .. } => {
                    assert_eq!(op, StringOp::Contains);
                    assert_eq!(*value, Expr::Constant(json!("al")));
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_binary_op_display() {
        assert_eq!(BinaryOp::Ne.to_string(), "<>");
        assert_eq!(BinaryOp::Or.to_string(), "OR");
        assert!(BinaryOp::And.is_logical());
        assert!(!BinaryOp::Ge.is_logical());
    }
}
