use crate::ast::{EntityType, Expr, FirstMode, Lambda, QueryExpr, SortDirection};

/// Fluent construction of an operator chain.
///
/// Each call wraps the chain built so far, so operators are recorded in the
/// order they are written.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    query: QueryExpr,
}

impl QueryBuilder {
    /// Start from the untouched source of `entity`
    pub fn new(entity: EntityType) -> Self {
        Self {
            query: QueryExpr::Source(entity),
        }
    }

    /// Start from the untouched source of `T`
    pub fn source<T: 'static>() -> Self {
        Self::new(EntityType::of::<T>())
    }

    fn wrap(self, f: impl FnOnce(Box<QueryExpr>) -> QueryExpr) -> Self {
        Self {
            query: f(Box::new(self.query)),
        }
    }

    /// Filter rows. Repeated calls are AND-combined.
    pub fn where_clause(self, predicate: Lambda) -> Self {
        self.wrap(|source| QueryExpr::Where { source, predicate })
    }

    /// Project rows onto an entity or one of its members
    pub fn select(self, projector: Lambda) -> Self {
        self.wrap(|source| QueryExpr::Select { source, projector })
    }

    /// Inner join `U` on `outer_key == inner_key`
    pub fn join<U: 'static>(self, outer_key: Lambda, inner_key: Lambda) -> Self {
        self.wrap(|outer| QueryExpr::Join {
            outer,
            inner: EntityType::of::<U>(),
            outer_key,
            inner_key,
        })
    }

    fn ordered(self, key: Lambda, direction: SortDirection) -> Self {
        self.wrap(|source| QueryExpr::OrderBy {
            source,
            key,
            direction,
        })
    }

    pub fn order_by(self, key: Lambda) -> Self {
        self.ordered(key, SortDirection::Asc)
    }

    pub fn order_by_desc(self, key: Lambda) -> Self {
        self.ordered(key, SortDirection::Desc)
    }

    /// Secondary ordering key
    pub fn then_by(self, key: Lambda) -> Self {
        self.ordered(key, SortDirection::Asc)
    }

    pub fn then_by_desc(self, key: Lambda) -> Self {
        self.ordered(key, SortDirection::Desc)
    }

    pub fn take(self, count: u64) -> Self {
        self.take_expr(Expr::constant(count))
    }

    /// Take with a count computed from captured values
    pub fn take_expr(self, count: Expr) -> Self {
        self.wrap(|source| QueryExpr::Take { source, count })
    }

    pub fn skip(self, count: u64) -> Self {
        self.skip_expr(Expr::constant(count))
    }

    pub fn skip_expr(self, count: Expr) -> Self {
        self.wrap(|source| QueryExpr::Skip { source, count })
    }

    pub fn distinct(self) -> Self {
        self.wrap(|source| QueryExpr::Distinct { source })
    }

    fn single_element(self, predicate: Option<Lambda>, mode: FirstMode) -> Self {
        self.wrap(|source| QueryExpr::First {
            source,
            predicate,
            mode,
        })
    }

    /// First row; an empty result is an error
    pub fn first(self, predicate: Option<Lambda>) -> Self {
        self.single_element(predicate, FirstMode::First)
    }

    /// First row, or nothing when the result is empty
    pub fn first_or_default(self, predicate: Option<Lambda>) -> Self {
        self.single_element(predicate, FirstMode::FirstOrDefault)
    }

    pub fn single(self, predicate: Option<Lambda>) -> Self {
        self.single_element(predicate, FirstMode::Single)
    }

    pub fn build(self) -> QueryExpr {
        self.query
    }
}

impl From<QueryBuilder> for QueryExpr {
    fn from(builder: QueryBuilder) -> Self {
        builder.build()
    }
}
