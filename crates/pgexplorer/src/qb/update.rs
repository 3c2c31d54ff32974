//! UPDATE query builder.

use crate::error::{ExplorerError, ExplorerResult};
use crate::filter::{Filter, build_filters};
use crate::ident::{QualifiedTable, SafeIdent};
use crate::qb::param::ParamList;
use crate::qb::traits::SqlQb;
use crate::value::BindValue;

/// UPDATE query builder. Both SET and WHERE must be non-empty to execute.
#[derive(Clone, Debug)]
pub struct UpdateQb {
    table: QualifiedTable,
    set_fields: Vec<(SafeIdent, BindValue)>,
    predicates: Vec<Filter>,
}

impl UpdateQb {
    pub fn new(table: QualifiedTable) -> Self {
        Self {
            table,
            set_fields: Vec::new(),
            predicates: Vec::new(),
        }
    }

    /// Add SET: column = value
    pub fn set(mut self, column: SafeIdent, value: impl Into<BindValue>) -> Self {
        self.set_fields.push((column, value.into()));
        self
    }

    /// Add WHERE predicate.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.predicates.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.predicates.extend(filters);
        self
    }
}

impl SqlQb for UpdateQb {
    fn build(&self, params: &mut ParamList) -> String {
        let mut sql = String::from("UPDATE ");
        self.table.write_sql(&mut sql);

        let sets: Vec<String> = self
            .set_fields
            .iter()
            .map(|(col, value)| format!("{col} = {}", params.bind(value.clone())))
            .collect();
        sql.push_str(" SET ");
        sql.push_str(&sets.join(", "));

        if self.predicates.is_empty() {
            // Rejected by validate(); rendered as a no-op.
            sql.push_str(" WHERE 1=0");
        } else {
            sql.push_str(" WHERE ");
            sql.push_str(&build_filters(&self.predicates, params));
        }
        sql
    }

    fn tag(&self) -> &'static str {
        "update"
    }

    fn validate(&self) -> ExplorerResult<()> {
        if self.set_fields.is_empty() {
            return Err(ExplorerError::validation("UPDATE requires at least one column to set"));
        }
        if self.predicates.is_empty() {
            return Err(ExplorerError::validation("UPDATE requires a WHERE condition"));
        }
        Ok(())
    }
}
