//! Generic client trait for unified database access.

use crate::error::ExplorerResult;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Row, SimpleQueryMessage, Statement};

/// A trait that unifies provisioned clients and transactions.
///
/// Executor functions accept either, so the same code path serves a single
/// statement on a bare connection and every statement of a transactional batch.
pub trait GenericClient: Send + Sync {
    /// Execute an extended-protocol query and return all rows.
    fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = ExplorerResult<Vec<Row>>> + Send;

    /// Prepare a statement; its columns carry the result types.
    fn prepare(&self, sql: &str) -> impl std::future::Future<Output = ExplorerResult<Statement>> + Send;

    /// Execute a prepared statement and return all rows.
    fn query_prepared(
        &self,
        statement: &Statement,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = ExplorerResult<Vec<Row>>> + Send;

    /// Execute a statement and return the number of affected rows.
    fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = ExplorerResult<u64>> + Send;

    /// Run SQL over the simple protocol; rows come back as text.
    fn simple_query(
        &self,
        sql: &str,
    ) -> impl std::future::Future<Output = ExplorerResult<Vec<SimpleQueryMessage>>> + Send;

    /// Run SQL over the simple protocol, discarding any rows.
    fn batch_execute(&self, sql: &str) -> impl std::future::Future<Output = ExplorerResult<()>> + Send;
}

impl GenericClient for tokio_postgres::Client {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> ExplorerResult<Vec<Row>> {
        Ok(tokio_postgres::Client::query(self, sql, params).await?)
    }

    async fn prepare(&self, sql: &str) -> ExplorerResult<Statement> {
        Ok(tokio_postgres::Client::prepare(self, sql).await?)
    }

    async fn query_prepared(
        &self,
        statement: &Statement,
        params: &[&(dyn ToSql + Sync)],
    ) -> ExplorerResult<Vec<Row>> {
        Ok(tokio_postgres::Client::query(self, statement, params).await?)
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> ExplorerResult<u64> {
        Ok(tokio_postgres::Client::execute(self, sql, params).await?)
    }

    async fn simple_query(&self, sql: &str) -> ExplorerResult<Vec<SimpleQueryMessage>> {
        Ok(tokio_postgres::Client::simple_query(self, sql).await?)
    }

    async fn batch_execute(&self, sql: &str) -> ExplorerResult<()> {
        Ok(tokio_postgres::Client::batch_execute(self, sql).await?)
    }
}

impl GenericClient for tokio_postgres::Transaction<'_> {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> ExplorerResult<Vec<Row>> {
        Ok(tokio_postgres::Transaction::query(self, sql, params).await?)
    }

    async fn prepare(&self, sql: &str) -> ExplorerResult<Statement> {
        Ok(tokio_postgres::Transaction::prepare(self, sql).await?)
    }

    async fn query_prepared(
        &self,
        statement: &Statement,
        params: &[&(dyn ToSql + Sync)],
    ) -> ExplorerResult<Vec<Row>> {
        Ok(tokio_postgres::Transaction::query(self, statement, params).await?)
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> ExplorerResult<u64> {
        Ok(tokio_postgres::Transaction::execute(self, sql, params).await?)
    }

    async fn simple_query(&self, sql: &str) -> ExplorerResult<Vec<SimpleQueryMessage>> {
        Ok(tokio_postgres::Transaction::simple_query(self, sql).await?)
    }

    async fn batch_execute(&self, sql: &str) -> ExplorerResult<()> {
        Ok(tokio_postgres::Transaction::batch_execute(self, sql).await?)
    }
}

// ===== deadpool-postgres support =====

impl GenericClient for deadpool_postgres::Client {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> ExplorerResult<Vec<Row>> {
        // Delegate to the deref target (ClientWrapper -> tokio_postgres::Client).
        GenericClient::query(&***self, sql, params).await
    }

    async fn prepare(&self, sql: &str) -> ExplorerResult<Statement> {
        GenericClient::prepare(&***self, sql).await
    }

    async fn query_prepared(
        &self,
        statement: &Statement,
        params: &[&(dyn ToSql + Sync)],
    ) -> ExplorerResult<Vec<Row>> {
        GenericClient::query_prepared(&***self, statement, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> ExplorerResult<u64> {
        GenericClient::execute(&***self, sql, params).await
    }

    async fn simple_query(&self, sql: &str) -> ExplorerResult<Vec<SimpleQueryMessage>> {
        GenericClient::simple_query(&***self, sql).await
    }

    async fn batch_execute(&self, sql: &str) -> ExplorerResult<()> {
        GenericClient::batch_execute(&***self, sql).await
    }
}

impl GenericClient for deadpool_postgres::Transaction<'_> {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> ExplorerResult<Vec<Row>> {
        GenericClient::query(&**self, sql, params).await
    }

    async fn prepare(&self, sql: &str) -> ExplorerResult<Statement> {
        GenericClient::prepare(&**self, sql).await
    }

    async fn query_prepared(
        &self,
        statement: &Statement,
        params: &[&(dyn ToSql + Sync)],
    ) -> ExplorerResult<Vec<Row>> {
        GenericClient::query_prepared(&**self, statement, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> ExplorerResult<u64> {
        GenericClient::execute(&**self, sql, params).await
    }

    async fn simple_query(&self, sql: &str) -> ExplorerResult<Vec<SimpleQueryMessage>> {
        GenericClient::simple_query(&**self, sql).await
    }

    async fn batch_execute(&self, sql: &str) -> ExplorerResult<()> {
        GenericClient::batch_execute(&**self, sql).await
    }
}
