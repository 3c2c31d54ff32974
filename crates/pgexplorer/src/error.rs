//! Error types for pgexplorer

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for pgexplorer operations
pub type ExplorerResult<T> = Result<T, ExplorerError>;

/// Error types for provisioning and query execution
#[derive(Debug, Error)]
pub enum ExplorerError {
    /// Credentials rejected or host unreachable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Driver-reported SQL error, propagated unchanged
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Malformed identifier, template parameter or row payload
    #[error("Validation error: {0}")]
    Validation(String),

    /// Result column that could not be turned into JSON
    #[error("Decode error: {0}")]
    Decode(String),

    /// Unknown named query template
    #[error("Query template not found: {0}")]
    TemplateNotFound(String),

    /// Pool error
    #[error("Pool error: {0}")]
    Pool(String),

    /// TLS connector could not be built
    #[error("TLS error: {0}")]
    Tls(String),

    /// Operation timeout
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Expected row or entity missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl ExplorerError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this error was reported by the database server
    pub fn is_db_error(&self) -> bool {
        matches!(self, Self::Query(e) if e.as_db_error().is_some())
    }

    /// SQLSTATE reported by the server, if any
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Query(e) => e.code().map(|c| c.code()),
            _ => None,
        }
    }

    /// Structured diagnostics for rendering a precise SQL error.
    pub fn diagnostics(&self) -> QueryDiagnostics {
        match self {
            Self::Query(e) => QueryDiagnostics::from_pg_error(e),
            other => QueryDiagnostics::from_message(other.to_string()),
        }
    }
}

impl From<deadpool_postgres::PoolError> for ExplorerError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        use deadpool_postgres::PoolError;
        match err {
            // Surface the driver error itself so callers see the real cause
            PoolError::Backend(e) => Self::Connection(e.to_string()),
            PoolError::Timeout(kind) => Self::Connection(format!("pool timeout ({kind:?})")),
            other => Self::Pool(other.to_string()),
        }
    }
}

/// Driver diagnostics extracted from a failed statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDiagnostics {
    pub message: String,
    pub sql_state: Option<String>,
    /// SQLSTATE class (first two characters), e.g. `42` for syntax/access errors.
    pub code: Option<String>,
    pub detail: Option<String>,
    pub hint: Option<String>,
    /// 1-based character position in the statement.
    pub position: Option<u32>,
}

impl QueryDiagnostics {
    /// Prefer the structured server error; fall back to text markers.
    pub fn from_pg_error(err: &tokio_postgres::Error) -> Self {
        let Some(db) = err.as_db_error() else {
            return Self::from_message(err.to_string());
        };

        let sql_state = db.code().code().to_string();
        let position = db.position().map(|p| match p {
            tokio_postgres::error::ErrorPosition::Original(pos) => *pos,
            tokio_postgres::error::ErrorPosition::Internal { position, .. } => *position,
        });

        let text = err.to_string();
        let fallback = Self::from_message(text.clone());

        Self {
            message: text,
            code: sql_state.get(..2).map(str::to_string),
            sql_state: Some(sql_state),
            detail: db.detail().map(str::to_string).or(fallback.detail),
            hint: db.hint().map(str::to_string).or(fallback.hint),
            position: position.or(fallback.position),
        }
    }

    /// Extract `DETAIL:`, `HINT:` and `Position:` markers from error text.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let markers = markers();

        let capture = |re: &Regex| {
            re.captures(&message)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
        };

        let detail = capture(&markers.detail);
        let hint = capture(&markers.hint);
        let position = capture(&markers.position).and_then(|p| p.parse().ok());
        let sql_state = capture(&markers.sql_state);

        Self {
            code: sql_state.as_deref().and_then(|s| s.get(..2)).map(str::to_string),
            sql_state,
            detail,
            hint,
            position,
            message,
        }
    }
}

struct Markers {
    detail: Regex,
    hint: Regex,
    position: Regex,
    sql_state: Regex,
}

fn markers() -> &'static Markers {
    static MARKERS: OnceLock<Markers> = OnceLock::new();
    MARKERS.get_or_init(|| Markers {
        detail: Regex::new(r"(?i)DETAIL:\s*(.+?)(?:\n|$)").expect("valid regex"),
        hint: Regex::new(r"(?i)HINT:\s*(.+?)(?:\n|$)").expect("valid regex"),
        position: Regex::new(r"(?i)Position:\s*(\d+)").expect("valid regex"),
        sql_state: Regex::new(r"SQLSTATE\[?\s*([0-9A-Z]{5})").expect("valid regex"),
    })
}
