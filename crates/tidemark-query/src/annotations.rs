//! Named aggregate columns attached to a pipeline.

use tidemark_core::{Expr, Ident};

use crate::error::{QueryError, QueryResult};

/// Output name reserved for the bucket column.
pub const BUCKET_COLUMN: &str = "bucket";

/// Ordered output name → aggregate expression mapping.
///
/// Names are unique and never `bucket`. Every expression must be an
/// aggregate so it can be computed per bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    entries: Vec<(Ident, Expr)>,
}

impl Annotations {
    /// No annotations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an annotation, builder style.
    pub fn with(mut self, name: &str, expr: Expr) -> QueryResult<Self> {
        self.insert(name, expr)?;
        Ok(self)
    }

    /// Add an annotation.
    pub fn insert(&mut self, name: &str, expr: Expr) -> QueryResult<()> {
        let name = Ident::new(name)?;
        if name.as_str() == BUCKET_COLUMN {
            return Err(QueryError::invalid_shape(format!(
                "annotation name {BUCKET_COLUMN} is reserved"
            )));
        }
        if self.get(name.as_str()).is_some() {
            return Err(QueryError::invalid_shape(format!(
                "duplicate annotation {name}"
            )));
        }
        if !expr.is_aggregate() {
            return Err(QueryError::invalid_shape(format!(
                "annotation {name} is not an aggregate"
            )));
        }
        self.entries.push((name, expr));
        Ok(())
    }

    /// Both sets of annotations, `self` first.
    pub fn merge(&self, other: &Self) -> QueryResult<Self> {
        let mut merged = self.clone();
        for (name, expr) in &other.entries {
            merged.insert(name.as_str(), expr.clone())?;
        }
        Ok(merged)
    }

    /// Expression annotated as `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.entries
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, expr)| expr)
    }

    /// `(name, expression)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Ident, &Expr)> {
        self.entries.iter().map(|(name, expr)| (name, expr))
    }

    /// Number of annotations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no annotations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
