//! Row predicates.

use tidemark_core::{Ident, StatementBuilder, Value};

use crate::error::{QueryError, QueryResult};

/// Comparison operator of a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl Comparison {
    /// SQL operator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

impl std::fmt::Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `column <op> value`, with the value bound.
///
/// A NULL value is only meaningful for equality and renders as
/// `IS [NOT] NULL`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    column: Ident,
    op: Comparison,
    value: Value,
}

impl Filter {
    /// Create a filter.
    pub fn new(column: Ident, op: Comparison, value: Value) -> QueryResult<Self> {
        if value.is_null() && !matches!(op, Comparison::Eq | Comparison::Ne) {
            return Err(QueryError::invalid_shape(format!(
                "cannot compare {column} {op} NULL"
            )));
        }
        Ok(Self { column, op, value })
    }

    /// Filtered column.
    #[must_use]
    pub const fn column(&self) -> &Ident {
        &self.column
    }

    pub(crate) fn render(&self, b: &mut StatementBuilder) {
        b.push_ident(&self.column);
        match (&self.value, self.op) {
            (Value::Null, Comparison::Eq) => {
                b.push_sql(" IS NULL");
            }
            (Value::Null, _) => {
                b.push_sql(" IS NOT NULL");
            }
            (value, op) => {
                b.push_sql(" ").push_sql(op.as_str()).push_sql(" ");
                b.push_bind(value.clone());
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn render(filter: &Filter) -> String {
        let mut b = StatementBuilder::new();
        filter.render(&mut b);
        b.build().sql
    }

    #[test]
    fn binds_the_value() {
        let filter = Filter::new(Ident::new("device").unwrap(), Comparison::Eq, "a'; --".into()).unwrap();
        assert_eq!(render(&filter), r#""device" = $1"#);
    }

    #[test]
    fn null_comparisons() {
        let col = Ident::new("device").unwrap();
        let is_null = Filter::new(col.clone(), Comparison::Eq, Value::Null).unwrap();
        assert_eq!(render(&is_null), r#""device" IS NULL"#);
        let not_null = Filter::new(col.clone(), Comparison::Ne, Value::Null).unwrap();
        assert_eq!(render(&not_null), r#""device" IS NOT NULL"#);
        assert!(Filter::new(col, Comparison::Lt, Value::Null).is_err());
    }
}
