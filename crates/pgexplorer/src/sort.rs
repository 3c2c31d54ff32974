//! ORDER BY compilation.
//!
//! Direction tokens are validated once, when a sort list is parsed from caller
//! input: `asc`/`desc` in any case are accepted and everything else drops the
//! entry. Past that point the direction is a [`SortDirection`] and the compiler
//! has no fallback of its own.

use crate::ident::SafeIdent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Strict, case-insensitive parse of `asc` / `desc`.
    pub fn parse(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("asc") {
            Some(Self::Asc)
        } else if token.eq_ignore_ascii_case("desc") {
            Some(Self::Desc)
        } else {
            None
        }
    }

    /// Lenient parse: anything other than `desc` is ascending.
    pub fn from_token(token: &str) -> Self {
        if token.eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl TryFrom<String> for SortDirection {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid sort direction '{value}'"))
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        })
    }
}

/// A sort as supplied by a caller; the column is still unsanitized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    pub column: String,
    pub direction: SortDirection,
}

impl SortDescriptor {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    pub fn asc(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Asc)
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Desc)
    }

    /// Accept a sort list as a JSON array or a JSON-encoded string.
    ///
    /// Entries without a column or with a direction other than `asc`/`desc`
    /// are dropped.
    pub fn parse_list(input: &Value) -> Vec<Self> {
        match input {
            Value::String(s) => serde_json::from_str::<Value>(s)
                .map(|v| Self::parse_array(&v))
                .unwrap_or_default(),
            other => Self::parse_array(other),
        }
    }

    fn parse_array(input: &Value) -> Vec<Self> {
        let Value::Array(items) = input else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect()
    }
}

/// A sort on a sanitized column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub column: SafeIdent,
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(column: SafeIdent, direction: SortDirection) -> Self {
        Self { column, direction }
    }

    /// `None` when the column sanitizes to nothing.
    pub fn from_descriptor(desc: &SortDescriptor) -> Option<Self> {
        SafeIdent::new(&desc.column).map(|column| Self::new(column, desc.direction))
    }

    pub fn sql(&self) -> String {
        format!("{} {}", self.column, self.direction.sql())
    }
}

pub fn parse_sorts(descriptors: &[SortDescriptor]) -> Vec<Sort> {
    descriptors.iter().filter_map(Sort::from_descriptor).collect()
}

pub fn build_sorts(sorts: &[Sort]) -> String {
    sorts.iter().map(Sort::sql).collect::<Vec<_>>().join(", ")
}

/// Compile descriptors into an ORDER BY fragment (without the keywords).
///
/// Identifiers and direction keywords only, so nothing needs binding.
pub fn compile_sorts(descriptors: &[SortDescriptor]) -> String {
    build_sorts(&parse_sorts(descriptors))
}
