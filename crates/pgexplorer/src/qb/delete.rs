//! DELETE query builder.

use crate::error::{ExplorerError, ExplorerResult};
use crate::filter::{Filter, build_filters};
use crate::ident::QualifiedTable;
use crate::qb::param::ParamList;
use crate::qb::traits::SqlQb;

/// DELETE query builder.
///
/// Without predicates it renders `WHERE 1=0` and fails validation, unless
/// [`DeleteQb::allow_delete_all`] was set.
#[derive(Clone, Debug)]
pub struct DeleteQb {
    table: QualifiedTable,
    predicates: Vec<Filter>,
    allow_delete_all: bool,
}

impl DeleteQb {
    pub fn new(table: QualifiedTable) -> Self {
        Self {
            table,
            predicates: Vec::new(),
            allow_delete_all: false,
        }
    }

    /// Allow DELETE without WHERE conditions.
    pub fn allow_delete_all(mut self, allow: bool) -> Self {
        self.allow_delete_all = allow;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.predicates.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.predicates.extend(filters);
        self
    }
}

impl SqlQb for DeleteQb {
    fn build(&self, params: &mut ParamList) -> String {
        let mut sql = String::from("DELETE FROM ");
        self.table.write_sql(&mut sql);

        if self.predicates.is_empty() {
            if !self.allow_delete_all {
                sql.push_str(" WHERE 1=0");
            }
            return sql;
        }

        sql.push_str(" WHERE ");
        sql.push_str(&build_filters(&self.predicates, params));
        sql
    }

    fn tag(&self) -> &'static str {
        "delete"
    }

    fn validate(&self) -> ExplorerResult<()> {
        if self.predicates.is_empty() && !self.allow_delete_all {
            return Err(ExplorerError::validation("DELETE requires a WHERE condition"));
        }
        Ok(())
    }
}
