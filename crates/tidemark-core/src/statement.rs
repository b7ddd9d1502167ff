//! Parameterized statement builder.
//!
//! SQL text only ever receives fixed keywords, validated quoted identifiers
//! and `$n` placeholders. Values travel separately as bound parameters.

use std::fmt::Write as _;

use crate::ident::{Ident, TableName};
use crate::value::Value;

/// A rendered statement with its bound parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    /// SQL text with `$1..$n` placeholders.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Vec<Value>,
}

impl Statement {
    /// A statement with no parameters.
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

/// PostgreSQL types a placeholder can be cast to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cast {
    /// `::interval`
    Interval,
    /// `::integer`
    Integer,
    /// `::double precision`
    Double,
    /// `::timestamptz`
    Timestamptz,
    /// `::regclass`
    Regclass,
    /// `::name`
    Name,
    /// `::text`
    Text,
    /// `::boolean`
    Boolean,
}

impl Cast {
    /// SQL spelling of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interval => "interval",
            Self::Integer => "integer",
            Self::Double => "double precision",
            Self::Timestamptz => "timestamptz",
            Self::Regclass => "regclass",
            Self::Name => "name",
            Self::Text => "text",
            Self::Boolean => "boolean",
        }
    }
}

/// Incremental builder for a [`Statement`].
#[derive(Debug, Default)]
pub struct StatementBuilder {
    sql: String,
    params: Vec<Value>,
}

impl StatementBuilder {
    /// Start an empty statement.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append fixed SQL text. Callers pass literals only.
    pub fn push_sql(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append a quoted identifier.
    pub fn push_ident(&mut self, ident: &Ident) -> &mut Self {
        self.sql.push_str(&ident.quoted());
        self
    }

    /// Append a quoted, possibly schema-qualified, table name.
    pub fn push_table(&mut self, table: &TableName) -> &mut Self {
        self.sql.push_str(&table.quoted());
        self
    }

    /// Bind a value and append its placeholder.
    pub fn push_bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.params.push(value.into());
        let n = self.params.len();
        let _ = write!(self.sql, "${n}");
        self
    }

    /// Bind a value and append its placeholder with an explicit cast.
    pub fn push_bind_cast(&mut self, value: impl Into<Value>, cast: Cast) -> &mut Self {
        self.push_bind(value);
        self.sql.push_str("::");
        self.sql.push_str(cast.as_str());
        self
    }

    /// Append `items` separated by `sep`, rendering each with `f`.
    pub fn push_separated<T>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        sep: &str,
        mut f: impl FnMut(&mut Self, T),
    ) -> &mut Self {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(sep);
            }
            f(self, item);
        }
        self
    }

    /// Number of parameters bound so far.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Finish the statement.
    #[must_use]
    pub fn build(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Render `s` as a single-quoted SQL string literal.
///
/// Only for `ALTER TABLE ... SET (...)` storage options, which the engine
/// does not accept as bound parameters. Callers embed validated identifiers
/// and canonical interval literals, never raw user text.
#[must_use]
pub fn quote_literal(s: &str) -> String {
    let escaped: String = s
        .chars()
        .filter(|&c| c != '\0')
        .flat_map(|c| match c {
            '\'' => vec!['\'', '\''],
            _ => vec![c],
        })
        .collect();
    format!("'{escaped}'")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::interval::Interval;

    #[test]
    fn placeholders_are_numbered_in_order() {
        let table = TableName::parse("readings").unwrap();
        let mut b = StatementBuilder::new();
        b.push_sql("SELECT set_chunk_time_interval(")
            .push_bind_cast(table.quoted(), Cast::Regclass)
            .push_sql(", ")
            .push_bind_cast(Interval::days(1), Cast::Interval)
            .push_sql(")");
        let stmt = b.build();
        assert_eq!(
            stmt.sql,
            "SELECT set_chunk_time_interval($1::regclass, $2::interval)"
        );
        assert_eq!(stmt.params.len(), 2);
        assert_eq!(stmt.params[1], Value::Interval(Interval::days(1)));
    }

    #[test]
    fn separated_renders_lists() {
        let cols = ["a", "b", "c"].map(|c| Ident::new(c).unwrap());
        let mut b = StatementBuilder::new();
        b.push_separated(&cols, ", ", |b, c| {
            b.push_ident(c);
        });
        assert_eq!(b.build().sql, r#""a", "b", "c""#);
    }

    #[test]
    fn quote_literal_escapes_quotes() {
        assert_eq!(quote_literal("1 day"), "'1 day'");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal("a\0b"), "'ab'");
    }

    mod proptest_literals {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Arbitrary input never leaves an unescaped quote inside the literal.
            #[test]
            fn quote_literal_never_leaves_unescaped_quotes(s in ".*") {
                let quoted = quote_literal(&s);
                let inner = &quoted[1..quoted.len() - 1];
                prop_assert!(inner.matches('\'').count() % 2 == 0);
                prop_assert!(!inner.replace("''", "").contains('\''));
            }
        }
    }
}
