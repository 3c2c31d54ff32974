//! SQL identifier sanitizing.
//!
//! Identifiers (schema/table/column names) cannot be bound as parameters, so every
//! identifier that reaches SQL text passes through [`sanitize_identifier`] first.
//!
//! The filter is an allowlist, not an escaper:
//! - input is split on `.` so `schema.table` and `table.column` survive
//! - each segment keeps only `[A-Za-z0-9_]`
//! - segments that end up empty are dropped
//!
//! # Example
//! ```ignore
//! use pgexplorer::ident::sanitize_identifier;
//!
//! assert_eq!(sanitize_identifier("public.users"), "public.users");
//! assert_eq!(sanitize_identifier("users; DROP TABLE x"), "usersDROPTABLEx");
//! ```

use crate::error::{ExplorerError, ExplorerResult};
use std::fmt;

/// Strip an identifier down to `[A-Za-z0-9_]` segments joined by `.`.
///
/// Returns an empty string when no segment survives.
pub fn sanitize_identifier(identifier: &str) -> String {
    let mut out = String::with_capacity(identifier.len());
    for segment in identifier.split('.') {
        let start = out.len();
        if start > 0 {
            out.push('.');
        }
        let body = out.len();
        out.extend(
            segment
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_'),
        );
        if out.len() == body {
            // Empty segment: undo the separator.
            out.truncate(start);
        }
    }
    out
}

/// Double-quote a name the server reported, doubling embedded quotes.
///
/// Only for names that came back from the server (result columns); user input
/// goes through [`sanitize_identifier`].
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// An identifier that has already been through [`sanitize_identifier`] and is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SafeIdent(String);

impl SafeIdent {
    /// Sanitize `raw`; `None` if nothing survives.
    pub fn new(raw: &str) -> Option<Self> {
        let clean = sanitize_identifier(raw);
        (!clean.is_empty()).then_some(Self(clean))
    }

    /// Like [`SafeIdent::new`] but reports which input was rejected.
    pub fn parse(raw: &str, what: &str) -> ExplorerResult<Self> {
        Self::new(raw).ok_or_else(|| {
            ExplorerError::validation(format!("{what} '{raw}' is not a valid identifier"))
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SafeIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SafeIdent {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A `schema.table` pair built from sanitized parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedTable {
    pub schema: SafeIdent,
    pub table: SafeIdent,
}

impl QualifiedTable {
    pub fn new(schema: SafeIdent, table: SafeIdent) -> Self {
        Self { schema, table }
    }

    /// Sanitize both parts, failing if either is empty afterwards.
    pub fn parse(schema: &str, table: &str) -> ExplorerResult<Self> {
        Ok(Self {
            schema: SafeIdent::parse(schema, "schema")?,
            table: SafeIdent::parse(table, "table")?,
        })
    }

    pub(crate) fn write_sql(&self, out: &mut String) {
        out.push_str(self.schema.as_str());
        out.push('.');
        out.push_str(self.table.as_str());
    }

    pub fn to_sql(&self) -> String {
        let mut out = String::with_capacity(self.schema.0.len() + self.table.0.len() + 1);
        self.write_sql(&mut out);
        out
    }
}

impl fmt::Display for QualifiedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_identifiers_are_unchanged() {
        for ident in ["users", "public.users", "schema.table.column", "_x1", "A_b_9"] {
            assert_eq!(sanitize_identifier(ident), ident);
        }
    }

    #[test]
    fn server_names_are_quoted() {
        assert_eq!(quote_ident("id"), "\"id\"");
        assert_eq!(quote_ident("My \"Col\""), "\"My \"\"Col\"\"\"");
    }

    #[test]
    fn strips_injection_characters() {
        let out = sanitize_identifier("name'; DROP TABLE users; --");
        assert_eq!(out, "nameDROPTABLEusers");
        for bad in ['\'', ';', '-', ' ', '(', ')', '"'] {
            assert!(!out.contains(bad), "found {bad:?} in {out}");
        }
    }

    #[test]
    fn strips_whitespace_and_quotes() {
        assert_eq!(sanitize_identifier(" \"Weird Name\" "), "WeirdName");
        assert_eq!(sanitize_identifier("col\tumn\n"), "column");
    }

    #[test]
    fn drops_empty_segments() {
        assert_eq!(sanitize_identifier("schema..table"), "schema.table");
        assert_eq!(sanitize_identifier(".users."), "users");
        assert_eq!(sanitize_identifier("'.'.users"), "users");
    }

    #[test]
    fn fully_unsafe_input_is_empty() {
        assert_eq!(sanitize_identifier(""), "");
        assert_eq!(sanitize_identifier("'; --"), "");
        assert_eq!(sanitize_identifier("..."), "");
        assert!(SafeIdent::new("()").is_none());
    }

    #[test]
    fn non_ascii_letters_are_removed() {
        assert_eq!(sanitize_identifier("naïve"), "nave");
    }

    #[test]
    fn qualified_table_renders_dotted() {
        let t = QualifiedTable::parse("public", "users").unwrap();
        assert_eq!(t.to_sql(), "public.users");
        assert_eq!(t.to_string(), "public.users");
    }

    #[test]
    fn qualified_table_rejects_empty_parts() {
        let err = QualifiedTable::parse("public", "--").unwrap_err();
        assert!(err.is_validation());
    }
}
