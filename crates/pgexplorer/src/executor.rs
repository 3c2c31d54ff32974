//! Statement execution against a provisioned client.
//!
//! [`Executor`] runs statements and emits `pgexplorer.sql` trace events:
//! - [`Executor::execute_single`]: one statement, no transaction
//! - [`Executor::execute_many`]: a batch in one transaction, returning only the
//!   rows of the last SELECT-like statement
//! - [`Executor::fetch_built`] / [`Executor::execute_built`] /
//!   [`Executor::fetch_count`]: run a rendered builder

use crate::client::GenericClient;
use crate::config::ExplorerConfig;
use crate::error::{ExplorerError, ExplorerResult};
use crate::qb::BuiltQuery;
use crate::row::{JsonRow, rows_to_json, simple_rows_to_json, text_projection};
use crate::split::is_select_like;
use crate::value::BindValue;
use tokio_postgres::types::ToSql;

/// Longest prefix of `sql` within `max_bytes` that ends on a char boundary.
pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

fn param_refs(bindings: &[BindValue]) -> Vec<&(dyn ToSql + Sync)> {
    bindings.iter().map(|b| b as &(dyn ToSql + Sync)).collect()
}

/// Runs statements on a client it is handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Executor {
    /// Byte limit for SQL in trace events.
    pub log_sql_max_len: usize,
}

impl Default for Executor {
    fn default() -> Self {
        Self { log_sql_max_len: 500 }
    }
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ExplorerConfig) -> Self {
        Self::new().log_sql_max_len(config.log_sql_max_len)
    }

    /// Set the byte limit for SQL in trace events.
    pub fn log_sql_max_len(mut self, max: usize) -> Self {
        self.log_sql_max_len = max;
        self
    }

    fn trace(&self, tag: &str, sql: &str, param_count: usize) {
        let shown = truncate_sql_bytes(sql, self.log_sql_max_len);
        tracing::debug!(
            target: "pgexplorer.sql",
            tag,
            param_count,
            truncated = shown.len() < sql.len(),
            sql = %shown,
            "executing"
        );
    }

    /// Run an extended-protocol query and decode its rows.
    ///
    /// Columns without a native decoder are re-selected as `text`, so every
    /// value arrives in the server's own text form.
    async fn query_json(
        &self,
        conn: &impl GenericClient,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> ExplorerResult<Vec<JsonRow>> {
        let statement = conn.prepare(sql).await?;
        let columns: Vec<(&str, _)> = statement
            .columns()
            .iter()
            .map(|c| (c.name(), c.type_().clone()))
            .collect();
        let rows = match text_projection(sql, &columns) {
            Some(projected) => {
                self.trace("text_projection", &projected, params.len());
                conn.query(&projected, params).await?
            }
            None => conn.query_prepared(&statement, params).await?,
        };
        rows_to_json(&rows)
    }

    /// Run one statement.
    ///
    /// Without bindings the simple protocol is used, so any statement PostgreSQL
    /// accepts (including utility commands) runs and rows come back as text.
    /// With bindings, `sql` uses `$n` placeholders and rows decode by column type.
    pub async fn execute_single(
        &self,
        client: &impl GenericClient,
        sql: &str,
        bindings: &[BindValue],
    ) -> ExplorerResult<Vec<JsonRow>> {
        self.trace("single", sql, bindings.len());
        if bindings.is_empty() {
            let messages = client.simple_query(sql).await?;
            Ok(simple_rows_to_json(&messages))
        } else {
            self.query_json(client, sql, &param_refs(bindings)).await
        }
    }

    /// Run `statements` in one transaction.
    ///
    /// SELECT-like statements replace the accumulated rows; others contribute none.
    /// On the first failure the transaction is rolled back and that error is
    /// returned unchanged.
    pub async fn execute_many<S: AsRef<str> + Sync>(
        &self,
        client: &mut tokio_postgres::Client,
        statements: &[S],
    ) -> ExplorerResult<Vec<JsonRow>> {
        let tx = client.transaction().await?;
        match self.run_statements(&tx, statements).await {
            Ok(rows) => {
                tx.commit().await?;
                tracing::debug!(statements = statements.len(), "batch committed");
                Ok(rows)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                tracing::debug!(statements = statements.len(), error = %e, "batch rolled back");
                Err(e)
            }
        }
    }

    async fn run_statements<S: AsRef<str> + Sync>(
        &self,
        conn: &impl GenericClient,
        statements: &[S],
    ) -> ExplorerResult<Vec<JsonRow>> {
        let mut last = Vec::new();
        for stmt in statements {
            let stmt = stmt.as_ref();
            if is_select_like(stmt) {
                self.trace("batch_select", stmt, 0);
                last = simple_rows_to_json(&conn.simple_query(stmt).await?);
            } else {
                self.trace("batch", stmt, 0);
                conn.batch_execute(stmt).await?;
            }
        }
        Ok(last)
    }

    /// Run a rendered query and decode every row.
    pub async fn fetch_built(
        &self,
        conn: &impl GenericClient,
        built: &BuiltQuery,
    ) -> ExplorerResult<Vec<JsonRow>> {
        self.trace(built.tag, &built.exec_sql, built.params.len());
        self.query_json(conn, &built.exec_sql, &built.params_ref()).await
    }

    /// Run a rendered mutation and return the affected row count.
    pub async fn execute_built(
        &self,
        conn: &impl GenericClient,
        built: &BuiltQuery,
    ) -> ExplorerResult<u64> {
        self.trace(built.tag, &built.exec_sql, built.params.len());
        conn.execute(&built.exec_sql, &built.params_ref()).await
    }

    /// Run a rendered `COUNT(*) AS count` query.
    pub async fn fetch_count(
        &self,
        conn: &impl GenericClient,
        built: &BuiltQuery,
    ) -> ExplorerResult<i64> {
        self.trace(built.tag, &built.exec_sql, built.params.len());
        let rows = conn.query(&built.exec_sql, &built.params_ref()).await?;
        let row = rows
            .first()
            .ok_or_else(|| ExplorerError::not_found("count query returned no rows"))?;
        Ok(row.try_get::<_, i64>("count")?)
    }
}
