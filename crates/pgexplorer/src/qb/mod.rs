//! Structured query builders for browsing and row mutations.
//!
//! Each builder keeps its clauses as typed fields (table, predicates, order,
//! limit, offset, assignments) and composes SQL only when rendered, so clause
//! order is fixed by construction rather than found by searching SQL text.
//!
//! Every statement can be rendered in two placeholder forms:
//! - `$1, $2, ...` for execution
//! - `?` as the canonical form, which is also what query history interpolates
//!
//! # Usage
//!
//! ```ignore
//! use pgexplorer::ident::QualifiedTable;
//! use pgexplorer::qb::{self, SqlQb};
//!
//! let users = QualifiedTable::parse("public", "users")?;
//! let q = qb::select(users).filters(filters).paginate(2, 20);
//! assert_eq!(q.to_sql(), "SELECT * FROM public.users WHERE age > $1 LIMIT 20 OFFSET 20");
//! ```

mod delete;
mod insert;
mod param;
mod select;
mod traits;
mod update;

pub use delete::DeleteQb;
pub use insert::InsertQb;
pub use param::{ParamList, Placeholder};
pub use select::SelectQb;
pub use traits::{BuiltQuery, SqlQb};
pub use update::UpdateQb;

use crate::ident::QualifiedTable;

/// Create a SELECT query builder for the given table.
pub fn select(table: QualifiedTable) -> SelectQb {
    SelectQb::new(table)
}

/// Create a `SELECT COUNT(*)` query builder for the given table.
pub fn count(table: QualifiedTable) -> SelectQb {
    SelectQb::count(table)
}

/// Create an INSERT query builder for the given table.
pub fn insert(table: QualifiedTable) -> InsertQb {
    InsertQb::new(table)
}

/// Create an UPDATE query builder for the given table.
pub fn update(table: QualifiedTable) -> UpdateQb {
    UpdateQb::new(table)
}

/// Create a DELETE query builder for the given table.
///
/// By default, DELETE without WHERE conditions generates `WHERE 1=0` (no-op).
pub fn delete(table: QualifiedTable) -> DeleteQb {
    DeleteQb::new(table)
}
