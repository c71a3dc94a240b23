use crate::ast::EntityType;
use crate::error::{QueryError, Result};

/// Shape of the SELECT list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Every mapped column of an entity
    Entity(EntityType),
    /// One property of an entity
    Member { entity: EntityType, property: String },
}

impl Projection {
    pub fn entity(&self) -> EntityType {
        match self {
            Projection::Entity(entity) => *entity,
            Projection::Member { entity, .. } => *entity,
        }
    }
}

/// Query shape accumulated while the translator walks the operator chain
#[derive(Debug, Clone)]
pub struct OperatorContext {
    root: EntityType,
    projection: Option<Projection>,
    distinct: bool,
    take: Option<u64>,
    skip: Option<u64>,
}

impl OperatorContext {
    pub fn new(root: EntityType) -> Self {
        Self {
            root,
            projection: None,
            distinct: false,
            take: None,
            skip: None,
        }
    }

    pub fn root(&self) -> EntityType {
        self.root
    }

    /// Record a limit; the last call wins.
    ///
    /// `FETCH NEXT` needs a positive count, so Take(0) is rejected once an
    /// offset is recorded.
    pub fn take(&mut self, count: u64) -> Result<()> {
        if count == 0 {
            if let Some(skip) = self.skip {
                return Err(QueryError::Usage(format!(
                    "Take(0) after Skip({}) cannot be expressed with OFFSET/FETCH",
                    skip
                )));
            }
        }
        self.take = Some(count);
        Ok(())
    }

    /// Record an offset. A TOP-style limit cannot be followed by an offset.
    pub fn skip(&mut self, count: u64) -> Result<()> {
        if let Some(take) = self.take {
            return Err(QueryError::Usage(format!(
                "Skip({}) after Take({}) is not supported; apply Skip before Take",
                count, take
            )));
        }
        self.skip = Some(count);
        Ok(())
    }

    /// Fail if Take or Skip has already been recorded.
    ///
    /// SQL applies filtering, ordering and DISTINCT before TOP/OFFSET, so
    /// `operator` cannot be placed after a limit.
    pub fn require_unlimited(&self, operator: &str) -> Result<()> {
        if self.take.is_some() || self.skip.is_some() {
            return Err(QueryError::Usage(format!(
                "{} after Take or Skip is not supported; apply it before limiting",
                operator
            )));
        }
        Ok(())
    }

    pub fn require_distinct(&mut self) {
        self.distinct = true;
    }

    /// Record an explicit projection.
    ///
    /// The operator chain is walked outermost first, so the first projection
    /// seen is the one authored last, and it determines the result shape.
    pub fn select(&mut self, projection: Projection) {
        if self.projection.is_none() {
            self.projection = Some(projection);
        }
    }

    /// The selected projection, defaulting to the root entity
    pub fn projection(&self) -> Projection {
        self.projection
            .clone()
            .unwrap_or(Projection::Entity(self.root))
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn take_count(&self) -> Option<u64> {
        self.take
    }

    pub fn skip_count(&self) -> Option<u64> {
        self.skip
    }
}
