//! # pgexplorer
//!
//! The query layer of a PostgreSQL browser: safe dynamic SQL from untrusted
//! structured input, executed on connections provisioned per request.
//!
//! ## Features
//!
//! - **Allowlist identifiers**: table, schema and column names keep only `[A-Za-z0-9_]`
//! - **Values always bound**: filter values and row payloads never enter SQL text
//! - **Lenient filters**: malformed filter/sort descriptors are dropped, not fatal
//! - **Structured queries**: WHERE / ORDER BY / LIMIT are typed clauses, not text splices
//! - **Scoped connections**: every handle is released on drop, including on error
//! - **Transactional batches**: multi-statement SQL commits or rolls back as a unit
//! - **Safe defaults**: UPDATE and DELETE require a key
//!
//! ## Example
//!
//! ```ignore
//! use pgexplorer::{Explorer, ExplorerConfig, FilterDescriptor, TableDataRequest, TableTarget};
//!
//! let explorer = Explorer::in_memory(ExplorerConfig::default())?;
//! let page = explorer
//!     .table_data(
//!         &profile,
//!         &TableDataRequest::new(TableTarget::new("public", "users"))
//!             .page(2)
//!             .per_page(50)
//!             .filters(vec![FilterDescriptor::new("age", "gt", "18")]),
//!     )
//!     .await?;
//! println!("{} of {}", page.data.len(), page.total);
//!
//! let resp = explorer
//!     .execute_query(&profile, None, "INSERT INTO t VALUES (1); SELECT * FROM t", Some(user_id))
//!     .await;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod explorer;
pub mod filter;
pub mod ident;
pub mod pool;
pub mod profile;
pub mod provision;
pub mod qb;
pub mod query_log;
pub mod row;
pub mod sort;
pub mod split;
pub mod template;
pub mod value;

pub use client::GenericClient;
pub use config::{ExplorerConfig, TemplateDefaults};
pub use error::{ExplorerError, ExplorerResult, QueryDiagnostics};
pub use explorer::{
    AdHocResponse, ColumnInfo, ConnectionMetadata, DatabaseConfig, Explorer, ServerInfo,
    TableDataRequest, TablePage, TableRef, TableTarget,
};
pub use filter::{Filter, FilterDescriptor, FilterOperator, compile_filters};
pub use ident::{QualifiedTable, SafeIdent, sanitize_identifier};
pub use profile::{ConnectionProfile, Credentials, SslMode};
pub use provision::{ConnectionFactory, ConnectionHandle};
pub use query_log::{ExecutorKind, MemoryQueryLog, QueryLogEntry, QueryLogSink};
pub use row::JsonRow;
pub use sort::{Sort, SortDescriptor, SortDirection, compile_sorts};
pub use split::{is_select_like, split_statements};
pub use template::{QueryTemplate, TemplateEngine, TemplateParams};
pub use value::BindValue;

// Re-export qb module for easy access
pub use qb::{BuiltQuery, DeleteQb, InsertQb, SelectQb, SqlQb, UpdateQb};
