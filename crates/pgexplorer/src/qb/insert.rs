//! INSERT query builder.

use crate::ident::{QualifiedTable, SafeIdent};
use crate::qb::param::ParamList;
use crate::qb::traits::SqlQb;
use crate::value::BindValue;

/// INSERT query builder for a single row.
#[derive(Clone, Debug)]
pub struct InsertQb {
    table: QualifiedTable,
    columns: Vec<SafeIdent>,
    values: Vec<BindValue>,
}

impl InsertQb {
    pub fn new(table: QualifiedTable) -> Self {
        Self {
            table,
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Set a column value.
    pub fn set(mut self, column: SafeIdent, value: impl Into<BindValue>) -> Self {
        self.columns.push(column);
        self.values.push(value.into());
        self
    }

    pub fn columns(&self) -> &[SafeIdent] {
        &self.columns
    }
}

impl SqlQb for InsertQb {
    fn build(&self, params: &mut ParamList) -> String {
        let mut sql = String::from("INSERT INTO ");
        self.table.write_sql(&mut sql);

        if self.columns.is_empty() {
            sql.push_str(" DEFAULT VALUES");
            return sql;
        }

        let columns: Vec<&str> = self.columns.iter().map(SafeIdent::as_str).collect();
        let placeholders: Vec<String> = self.values.iter().map(|v| params.bind(v.clone())).collect();
        sql.push_str(&format!(
            " ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        ));
        sql
    }

    fn tag(&self) -> &'static str {
        "insert"
    }
}
