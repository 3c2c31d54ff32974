//! Trait definitions for query builders.

use crate::error::ExplorerResult;
use crate::qb::param::{ParamList, Placeholder};
use crate::value::{BindValue, interpolate};
use tokio_postgres::types::ToSql;

/// Base trait for all query builders.
pub trait SqlQb: Sync {
    /// Render the statement, pushing bind values onto `params`.
    fn build(&self, params: &mut ParamList) -> String;

    /// Short label used in logs.
    fn tag(&self) -> &'static str;

    /// Validate builder state before execution.
    fn validate(&self) -> ExplorerResult<()> {
        Ok(())
    }

    /// Executable SQL with `$n` placeholders (for debugging).
    fn to_sql(&self) -> String {
        self.build(&mut ParamList::new())
    }

    /// Canonical SQL with `?` placeholders.
    fn to_canonical_sql(&self) -> String {
        self.build(&mut ParamList::with_style(Placeholder::Question))
    }

    /// Validate and render both placeholder forms.
    fn build_query(&self) -> ExplorerResult<BuiltQuery> {
        self.validate()?;
        let mut params = ParamList::new();
        let exec_sql = self.build(&mut params);
        Ok(BuiltQuery {
            exec_sql,
            canonical_sql: self.to_canonical_sql(),
            params: params.into_values(),
            tag: self.tag(),
        })
    }
}

/// A rendered statement ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    /// SQL sent to the server, `$n` placeholders.
    pub exec_sql: String,
    /// Same statement with `?` placeholders.
    pub canonical_sql: String,
    pub params: Vec<BindValue>,
    pub tag: &'static str,
}

impl BuiltQuery {
    /// Get parameters as references for tokio-postgres.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
    }

    /// Statement with values inlined, for query history only.
    pub fn interpolated(&self) -> String {
        interpolate(&self.canonical_sql, &self.params)
    }
}
