//! Validated SQL identifiers.
//!
//! Column, table and schema names are checked against an allow-list before
//! they can appear in a statement, and are always rendered double-quoted.
//! Nothing that fails validation can reach SQL text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// PostgreSQL truncates identifiers longer than this (`NAMEDATALEN - 1`).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Check `s` against the identifier allow-list.
///
/// Accepts ASCII letters, digits and underscores, not starting with a digit,
/// at most [`MAX_IDENTIFIER_LEN`] bytes.
fn validate_identifier(s: &str) -> Option<&str> {
    let first = s.chars().next()?;
    if s.len() > MAX_IDENTIFIER_LEN || first.is_ascii_digit() {
        return None;
    }
    if s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some(s)
    } else {
        None
    }
}

/// A single validated identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ident(String);

impl Ident {
    /// Validate and wrap an identifier.
    pub fn new(name: impl AsRef<str>) -> CoreResult<Self> {
        let name = name.as_ref();
        validate_identifier(name)
            .map(|s| Self(s.to_owned()))
            .ok_or_else(|| CoreError::invalid_identifier(name))
    }

    /// The raw, unquoted name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name as a double-quoted SQL identifier.
    #[must_use]
    pub fn quoted(&self) -> String {
        // The allow-list excludes '"', so no escaping is needed.
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Ident {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Ident {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Ident {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Ident> for String {
    fn from(value: Ident) -> Self {
        value.0
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A table name, optionally schema-qualified (`schema.table`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName {
    schema: Option<Ident>,
    name: Ident,
}

impl TableName {
    /// Parse `table` or `schema.table`.
    pub fn parse(text: &str) -> CoreResult<Self> {
        match text.split_once('.') {
            Some((schema, name)) => Ok(Self {
                schema: Some(Ident::new(schema)?),
                name: Ident::new(name)?,
            }),
            None => Ok(Self {
                schema: None,
                name: Ident::new(text)?,
            }),
        }
    }

    /// An unqualified table name.
    #[must_use]
    pub fn unqualified(name: Ident) -> Self {
        Self { schema: None, name }
    }

    /// A schema-qualified table name.
    #[must_use]
    pub fn qualified(schema: Ident, name: Ident) -> Self {
        Self {
            schema: Some(schema),
            name,
        }
    }

    /// Qualify with `schema` unless already qualified.
    #[must_use]
    pub fn in_schema(self, schema: Option<&Ident>) -> Self {
        match (&self.schema, schema) {
            (None, Some(schema)) => Self::qualified(schema.clone(), self.name),
            _ => self,
        }
    }

    /// Schema component, if qualified.
    #[must_use]
    pub fn schema(&self) -> Option<&Ident> {
        self.schema.as_ref()
    }

    /// Table component.
    #[must_use]
    pub fn name(&self) -> &Ident {
        &self.name
    }

    /// Quoted form, usable both in SQL text and as a `regclass` input.
    #[must_use]
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema.quoted(), self.name.quoted()),
            None => self.name.quoted(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl FromStr for TableName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TableName {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TableName> for String {
    fn from(value: TableName) -> Self {
        value.to_string()
    }
}

impl From<Ident> for TableName {
    fn from(value: Ident) -> Self {
        Self::unqualified(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn validate_identifier_rejects_special_chars() {
        assert!(validate_identifier("valid_column").is_some());
        assert!(validate_identifier("column123").is_some());
        assert!(validate_identifier("_private").is_some());
        assert!(validate_identifier("column; DROP TABLE").is_none());
        assert!(validate_identifier("").is_none());
        assert!(validate_identifier("col-name").is_none());
        assert!(validate_identifier("1column").is_none());
        assert!(validate_identifier("quote\"d").is_none());
    }

    #[test]
    fn identifier_length_is_bounded() {
        assert!(Ident::new("a".repeat(MAX_IDENTIFIER_LEN)).is_ok());
        assert!(Ident::new("a".repeat(MAX_IDENTIFIER_LEN + 1)).is_err());
    }

    #[test]
    fn ident_is_quoted() {
        assert_eq!(Ident::new("time").unwrap().quoted(), "\"time\"");
    }

    #[test]
    fn table_name_parses_schema() {
        let table = TableName::parse("metrics.cpu_usage").unwrap();
        assert_eq!(table.schema().map(Ident::as_str), Some("metrics"));
        assert_eq!(table.name().as_str(), "cpu_usage");
        assert_eq!(table.quoted(), "\"metrics\".\"cpu_usage\"");
        assert_eq!(table.to_string(), "metrics.cpu_usage");

        let bare = TableName::parse("readings").unwrap();
        assert!(bare.schema().is_none());
        assert_eq!(bare.quoted(), "\"readings\"");
    }

    #[test]
    fn table_name_rejects_extra_dots() {
        assert!(TableName::parse("a.b.c").is_err());
        assert!(TableName::parse(".readings").is_err());
    }

    #[test]
    fn in_schema_keeps_explicit_qualification() {
        let public = Ident::new("public").unwrap();
        let explicit = TableName::parse("other.readings").unwrap();
        assert_eq!(
            explicit.clone().in_schema(Some(&public)),
            explicit
        );
        let bare = TableName::parse("readings").unwrap().in_schema(Some(&public));
        assert_eq!(bare.to_string(), "public.readings");
    }

    #[test]
    fn serde_validates() {
        let ok: Ident = serde_json::from_str(r#""device_id""#).unwrap();
        assert_eq!(ok.as_str(), "device_id");
        assert!(serde_json::from_str::<Ident>(r#""drop table""#).is_err());
    }

    mod proptest_identifiers {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Identifiers with SQL metacharacters are always rejected.
            #[test]
            fn validate_identifier_rejects_special(s in ".*[;\"'`\\-\\+\\*\\/ ].*") {
                prop_assert!(Ident::new(&s).is_err(), "accepted invalid identifier: {}", s);
            }

            /// Accepted identifiers render as a single quoted token.
            #[test]
            fn accepted_identifiers_quote_cleanly(s in "[a-z_][a-z0-9_]{0,40}") {
                let ident = Ident::new(&s).unwrap();
                let quoted = ident.quoted();
                prop_assert_eq!(quoted.matches('"').count(), 2);
            }
        }
    }
}
