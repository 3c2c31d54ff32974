//! The browsing service.
//!
//! Every operation provisions a handle for the profile, runs, and releases the
//! handle before returning, including on error. Successful ad-hoc and mutating
//! executions are mirrored to the query log.

use crate::client::GenericClient;
use crate::config::ExplorerConfig;
use crate::error::{ExplorerError, ExplorerResult};
use crate::executor::Executor;
use crate::filter::{Filter, FilterDescriptor, parse_filters};
use crate::ident::{QualifiedTable, SafeIdent};
use crate::profile::{ConnectionProfile, Credentials};
use crate::provision::ConnectionFactory;
use crate::qb::{BuiltQuery, SqlQb};
use crate::query_log::{MemoryQueryLog, QueryLogEntry, QueryLogSink};
use crate::row::JsonRow;
use crate::sort::{SortDescriptor, parse_sorts};
use crate::split::split_statements;
use crate::template::{self, TemplateEngine, TemplateParams};
use crate::value::BindValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio_postgres::Row;

/// A table on a profile's server, optionally in another database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableTarget {
    #[serde(default)]
    pub database: Option<String>,
    /// Falls back to the configured default schema.
    #[serde(default)]
    pub schema: Option<String>,
    pub table: String,
}

impl TableTarget {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: None,
            schema: Some(schema.into()),
            table: table.into(),
        }
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    fn qualified(&self, config: &ExplorerConfig) -> ExplorerResult<QualifiedTable> {
        let schema = self
            .schema
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&config.default_schema);
        QualifiedTable::parse(schema, &self.table)
    }
}

fn lenient_filters<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<FilterDescriptor>, D::Error> {
    Ok(FilterDescriptor::parse_list(&Value::deserialize(d)?))
}

fn lenient_sorts<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<SortDescriptor>, D::Error> {
    Ok(SortDescriptor::parse_list(&Value::deserialize(d)?))
}

fn first_page() -> i64 {
    1
}

/// A page request for table browsing.
///
/// `filters` and `sorts` accept a JSON array or a JSON-encoded string;
/// malformed entries are dropped.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDataRequest {
    #[serde(flatten)]
    pub target: TableTarget,
    /// 1-based.
    #[serde(default = "first_page")]
    pub page: i64,
    #[serde(default)]
    pub per_page: Option<i64>,
    #[serde(default, deserialize_with = "lenient_filters")]
    pub filters: Vec<FilterDescriptor>,
    #[serde(default, deserialize_with = "lenient_sorts")]
    pub sorts: Vec<SortDescriptor>,
}

impl TableDataRequest {
    pub fn new(target: TableTarget) -> Self {
        Self {
            target,
            page: 1,
            ..Self::default()
        }
    }

    pub fn page(mut self, page: i64) -> Self {
        self.page = page;
        self
    }

    pub fn per_page(mut self, per_page: i64) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn filters(mut self, filters: Vec<FilterDescriptor>) -> Self {
        self.filters = filters;
        self
    }

    pub fn sorts(mut self, sorts: Vec<SortDescriptor>) -> Self {
        self.sorts = sorts;
        self
    }
}

/// One page of rows plus the filtered total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePage {
    pub data: Vec<JsonRow>,
    pub total: i64,
}

/// Result of ad-hoc SQL, with driver diagnostics on failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdHocResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<JsonRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    pub multi_statement: bool,
    pub statements_count: usize,
}

impl AdHocResponse {
    fn success(data: Vec<JsonRow>, statements_count: usize) -> Self {
        Self {
            success: true,
            data: Some(data),
            multi_statement: statements_count > 1,
            statements_count,
            ..Self::default()
        }
    }

    fn failure(err: &ExplorerError, statements_count: usize) -> Self {
        let diag = err.diagnostics();
        Self {
            success: false,
            error: Some(diag.message),
            sql_state: diag.sql_state,
            code: diag.code,
            detail: diag.detail,
            hint: diag.hint,
            position: diag.position,
            multi_statement: statements_count > 1,
            statements_count,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRef {
    pub table_schema: String,
    pub table_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub column_default: Option<String>,
    pub is_primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub server_version: String,
    pub max_connections: String,
    pub shared_buffers: String,
    pub work_mem: String,
    pub timezone: String,
    pub database_size: String,
    pub active_connections: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub datname: String,
    pub encoding: String,
    pub collation: String,
}

/// Server facts gathered by [`Explorer::refresh_metadata`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionMetadata {
    pub database: String,
    pub version: Option<String>,
    pub server: Option<ServerInfo>,
    pub database_config: Option<DatabaseConfig>,
    pub last_updated: DateTime<Utc>,
}

impl ConnectionMetadata {
    /// Overwrite these keys in `metadata`, keeping any others.
    pub fn merge_into(&self, metadata: &mut Map<String, Value>) -> ExplorerResult<()> {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => {
                metadata.extend(fields);
                Ok(())
            }
            Ok(_) => Err(ExplorerError::Other("metadata did not serialize to an object".into())),
            Err(e) => Err(ExplorerError::Other(format!("failed to serialize metadata: {e}"))),
        }
    }
}

const LIST_DATABASES: &str =
    "SELECT datname::text AS datname FROM pg_database WHERE datistemplate = false ORDER BY datname";

const LIST_SCHEMAS: &str = "SELECT schema_name::text AS schema_name FROM information_schema.schemata ORDER BY schema_name";

const LIST_TABLES: &str = "SELECT table_schema::text AS table_schema, table_name::text AS table_name \
     FROM information_schema.tables \
     WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
     ORDER BY table_schema, table_name";

const LIST_COLUMNS: &str = r#"
SELECT
    c.column_name::text AS column_name,
    c.data_type::text AS data_type,
    c.is_nullable::text = 'YES' AS is_nullable,
    c.column_default::text AS column_default,
    EXISTS (
        SELECT 1
        FROM pg_constraint con
        JOIN pg_class rel ON rel.oid = con.conrelid
        JOIN pg_namespace nsp ON nsp.oid = rel.relnamespace
        JOIN pg_attribute att ON att.attrelid = rel.oid AND att.attnum = ANY(con.conkey)
        WHERE con.contype = 'p'
          AND rel.relname::text = $1::text
          AND nsp.nspname::text = $2::text
          AND att.attname::text = c.column_name::text
    ) AS is_primary_key
FROM information_schema.columns c
WHERE c.table_name::text = $1::text
  AND c.table_schema::text = $2::text
ORDER BY c.ordinal_position
"#;

const SERVER_VERSION: &str = "SELECT version() AS version";

const SERVER_INFO: &str = r#"
SELECT
    current_setting('server_version') AS server_version,
    current_setting('max_connections') AS max_connections,
    current_setting('shared_buffers') AS shared_buffers,
    current_setting('work_mem') AS work_mem,
    current_setting('timezone') AS timezone,
    pg_size_pretty(pg_database_size(current_database())) AS database_size,
    (SELECT count(*) FROM pg_stat_activity) AS active_connections
"#;

const DATABASE_CONFIG: &str = r#"
SELECT
    datname::text AS datname,
    pg_encoding_to_char(encoding)::text AS encoding,
    datcollate::text AS collation
FROM pg_database
WHERE datname = current_database()
"#;

fn strings(rows: &[Row], column: &str) -> ExplorerResult<Vec<String>> {
    rows.iter()
        .map(|r| r.try_get::<_, String>(column).map_err(ExplorerError::from))
        .collect()
}

/// "Query on public.users with filters and sorting"
fn browse_description(table: &QualifiedTable, filtered: bool, sorted: bool) -> String {
    let mut out = format!("Query on {table}");
    match (filtered, sorted) {
        (true, true) => out.push_str(" with filters and sorting"),
        (true, false) => out.push_str(" with filters"),
        (false, true) => out.push_str(" with sorting"),
        (false, false) => {}
    }
    out
}

fn key_filters(key: &Map<String, Value>) -> ExplorerResult<Vec<Filter>> {
    key.iter()
        .map(|(col, v)| Ok(Filter::key(SafeIdent::parse(col, "key column")?, BindValue::from_json(v))))
        .collect()
}

fn assignments(values: &Map<String, Value>) -> ExplorerResult<Vec<(SafeIdent, BindValue)>> {
    values
        .iter()
        .map(|(col, v)| Ok((SafeIdent::parse(col, "column")?, BindValue::from_json_empty_as_null(v))))
        .collect()
}

/// PostgreSQL browsing and query service.
#[derive(Debug)]
pub struct Explorer<L: QueryLogSink = MemoryQueryLog> {
    factory: ConnectionFactory,
    templates: TemplateEngine,
    executor: Executor,
    log: L,
}

impl Explorer<MemoryQueryLog> {
    /// An explorer with an in-memory query log holding `history_limit` entries per connection.
    pub fn in_memory(config: ExplorerConfig) -> ExplorerResult<Self> {
        let log = MemoryQueryLog::with_capacity(config.history_limit);
        Self::new(config, log)
    }
}

impl<L: QueryLogSink> Explorer<L> {
    pub fn new(config: ExplorerConfig, log: L) -> ExplorerResult<Self> {
        config.validate()?;
        let templates = TemplateEngine::from_config(&config)?;
        let executor = Executor::from_config(&config);
        Ok(Self {
            factory: ConnectionFactory::new(config),
            templates,
            executor,
            log,
        })
    }

    pub fn config(&self) -> &ExplorerConfig {
        self.factory.config()
    }

    pub fn factory(&self) -> &ConnectionFactory {
        &self.factory
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn query_log(&self) -> &L {
        &self.log
    }

    /// Sink failures never fail an operation whose SQL already ran.
    async fn record(&self, entry: QueryLogEntry) {
        let connection_id = entry.connection_id;
        if let Err(e) = self.log.record(entry).await {
            tracing::warn!(connection_id, error = %e, "failed to record query log entry");
        }
    }

    pub async fn test_connection(&self, credentials: &Credentials) -> bool {
        self.factory.test_connection(credentials).await
    }

    pub async fn try_test_connection(&self, credentials: &Credentials) -> ExplorerResult<()> {
        self.factory.try_test_connection(credentials).await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(connection_id = profile.id))]
    pub async fn list_databases(&self, profile: &ConnectionProfile) -> ExplorerResult<Vec<String>> {
        let handle = self.factory.acquire(profile, None).await?;
        let rows = handle.client().query(LIST_DATABASES, &[]).await?;
        strings(&rows, "datname")
    }

    #[tracing::instrument(level = "debug", skip_all, fields(connection_id = profile.id))]
    pub async fn list_schemas(
        &self,
        profile: &ConnectionProfile,
        database: Option<&str>,
    ) -> ExplorerResult<Vec<String>> {
        let handle = self.factory.acquire(profile, database).await?;
        let rows = handle.client().query(LIST_SCHEMAS, &[]).await?;
        strings(&rows, "schema_name")
    }

    /// User tables, excluding `pg_catalog` and `information_schema`.
    #[tracing::instrument(level = "debug", skip_all, fields(connection_id = profile.id))]
    pub async fn list_tables(
        &self,
        profile: &ConnectionProfile,
        database: Option<&str>,
    ) -> ExplorerResult<Vec<TableRef>> {
        let handle = self.factory.acquire(profile, database).await?;
        let rows = handle.client().query(LIST_TABLES, &[]).await?;
        rows.iter()
            .map(|r| {
                Ok(TableRef {
                    table_schema: r.try_get("table_schema")?,
                    table_name: r.try_get("table_name")?,
                })
            })
            .collect()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(connection_id = profile.id))]
    pub async fn list_columns(
        &self,
        profile: &ConnectionProfile,
        target: &TableTarget,
    ) -> ExplorerResult<Vec<ColumnInfo>> {
        let table = target.qualified(self.config())?;
        let handle = self.factory.acquire(profile, target.database.as_deref()).await?;
        let name = BindValue::text(table.table.as_str());
        let schema = BindValue::text(table.schema.as_str());
        let rows = handle.client().query(LIST_COLUMNS, &[&name, &schema]).await?;
        rows.iter()
            .map(|r| {
                Ok(ColumnInfo {
                    column_name: r.try_get("column_name")?,
                    data_type: r.try_get("data_type")?,
                    is_nullable: r.try_get("is_nullable")?,
                    column_default: r.try_get("column_default")?,
                    is_primary_key: r.try_get("is_primary_key")?,
                })
            })
            .collect()
    }

    /// One page of a table plus the total under the same filters.
    ///
    /// A `system` log entry is written only when filters or sorts were applied.
    #[tracing::instrument(level = "debug", skip_all, fields(connection_id = profile.id))]
    pub async fn table_data(
        &self,
        profile: &ConnectionProfile,
        request: &TableDataRequest,
    ) -> ExplorerResult<TablePage> {
        let table = request.target.qualified(self.config())?;
        let per_page = self.config().per_page(request.per_page);
        let offset = (request.page.max(1) - 1).saturating_mul(per_page);

        let filters = parse_filters(&request.filters);
        let sorts = parse_sorts(&request.sorts);
        let params = TemplateParams::new(table.clone()).limit(per_page).offset(offset);

        let select = self.templates.select(template::TABLE_DATA, &params, &filters, &sorts)?;
        let data_query = select.build_query()?;
        let count_query = select.to_count().build_query()?;

        let handle = self.factory.acquire(profile, request.target.database.as_deref()).await?;
        let data = self.executor.fetch_built(handle.client(), &data_query).await?;
        let total = self.executor.fetch_count(handle.client(), &count_query).await?;
        handle.release();

        if !filters.is_empty() || !sorts.is_empty() {
            let entry = QueryLogEntry::system(profile.id, data_query.interpolated())
                .tag(browse_description(&table, !filters.is_empty(), !sorts.is_empty()));
            self.record(entry).await;
        }
        Ok(TablePage { data, total })
    }

    #[tracing::instrument(level = "debug", skip_all, fields(connection_id = profile.id))]
    pub async fn table_count(
        &self,
        profile: &ConnectionProfile,
        target: &TableTarget,
        filters: &[FilterDescriptor],
    ) -> ExplorerResult<i64> {
        let params = TemplateParams::new(target.qualified(self.config())?);
        let query =
            self.templates
                .render(template::TABLE_COUNT, &params, &parse_filters(filters), &[])?;
        let handle = self.factory.acquire(profile, target.database.as_deref()).await?;
        self.executor.fetch_count(handle.client(), &query).await
    }

    async fn run_statements(
        &self,
        profile: &ConnectionProfile,
        database: Option<&str>,
        statements: &[String],
    ) -> ExplorerResult<Vec<JsonRow>> {
        match statements {
            [] => Err(ExplorerError::validation("no SQL statements to execute")),
            [single] => {
                let handle = self.factory.acquire(profile, database).await?;
                self.executor.execute_single(handle.client(), single, &[]).await
            }
            many => {
                let mut handle = self.factory.acquire(profile, database).await?;
                self.executor.execute_many(handle.client_mut(), many).await
            }
        }
    }

    /// Run raw SQL: one statement directly, several in a transaction.
    ///
    /// Returns the rows of the last SELECT-like statement.
    #[tracing::instrument(level = "debug", skip_all, fields(connection_id = profile.id))]
    pub async fn run_sql(
        &self,
        profile: &ConnectionProfile,
        database: Option<&str>,
        sql: &str,
    ) -> ExplorerResult<Vec<JsonRow>> {
        self.run_statements(profile, database, &split_statements(sql)).await
    }

    /// [`Explorer::run_sql`] for the SQL editor: errors become diagnostics and
    /// successes are logged as `user` entries.
    #[tracing::instrument(level = "debug", skip_all, fields(connection_id = profile.id))]
    pub async fn execute_query(
        &self,
        profile: &ConnectionProfile,
        database: Option<&str>,
        sql: &str,
        executor_id: Option<i64>,
    ) -> AdHocResponse {
        let statements = split_statements(sql);
        match self.run_statements(profile, database, &statements).await {
            Ok(data) => {
                self.record(QueryLogEntry::user(profile.id, sql.trim(), executor_id).tag("ad-hoc"))
                    .await;
                AdHocResponse::success(data, statements.len())
            }
            Err(e) => {
                tracing::debug!(error = %e, "ad-hoc query failed");
                AdHocResponse::failure(&e, statements.len())
            }
        }
    }

    async fn run_mutation(
        &self,
        profile: &ConnectionProfile,
        database: Option<&str>,
        query: BuiltQuery,
        executor_id: Option<i64>,
    ) -> ExplorerResult<u64> {
        let handle = self.factory.acquire(profile, database).await?;
        let affected = self.executor.execute_built(handle.client(), &query).await?;
        handle.release();

        let entry = QueryLogEntry::user(profile.id, query.interpolated(), executor_id).tag(query.tag);
        self.record(entry).await;
        Ok(affected)
    }

    /// Insert one row; `""` values are stored as NULL.
    #[tracing::instrument(level = "debug", skip_all, fields(connection_id = profile.id))]
    pub async fn insert_row(
        &self,
        profile: &ConnectionProfile,
        target: &TableTarget,
        values: &Map<String, Value>,
        executor_id: Option<i64>,
    ) -> ExplorerResult<u64> {
        let mut params = TemplateParams::new(target.qualified(self.config())?);
        params.assignments = assignments(values)?;
        let query = self.templates.render(template::INSERT_ROW, &params, &[], &[])?;
        self.run_mutation(profile, target.database.as_deref(), query, executor_id)
            .await
    }

    /// Update rows matching every `key` column; a null key value matches `IS NULL`.
    #[tracing::instrument(level = "debug", skip_all, fields(connection_id = profile.id))]
    pub async fn update_row(
        &self,
        profile: &ConnectionProfile,
        target: &TableTarget,
        set: &Map<String, Value>,
        key: &Map<String, Value>,
        executor_id: Option<i64>,
    ) -> ExplorerResult<u64> {
        let mut params = TemplateParams::new(target.qualified(self.config())?);
        params.assignments = assignments(set)?;
        let query = self
            .templates
            .render(template::UPDATE_ROW, &params, &key_filters(key)?, &[])?;
        self.run_mutation(profile, target.database.as_deref(), query, executor_id)
            .await
    }

    /// Delete rows matching every `key` column.
    #[tracing::instrument(level = "debug", skip_all, fields(connection_id = profile.id))]
    pub async fn delete_row(
        &self,
        profile: &ConnectionProfile,
        target: &TableTarget,
        key: &Map<String, Value>,
        executor_id: Option<i64>,
    ) -> ExplorerResult<u64> {
        let params = TemplateParams::new(target.qualified(self.config())?);
        let query = self
            .templates
            .render(template::DELETE_ROW, &params, &key_filters(key)?, &[])?;
        self.run_mutation(profile, target.database.as_deref(), query, executor_id)
            .await
    }

    /// Render a named template from string parameters and run it.
    #[tracing::instrument(level = "debug", skip_all, fields(connection_id = profile.id, template = name))]
    pub async fn execute_stored_query(
        &self,
        profile: &ConnectionProfile,
        database: Option<&str>,
        name: &str,
        params: &HashMap<String, String>,
    ) -> ExplorerResult<Vec<JsonRow>> {
        let query = self.templates.render_map(name, params, &[], &[])?;
        let handle = self.factory.acquire(profile, database).await?;
        let rows = self.executor.fetch_built(handle.client(), &query).await?;
        handle.release();

        self.record(QueryLogEntry::system(profile.id, query.interpolated()).tag(name))
            .await;
        Ok(rows)
    }

    /// Gather server facts and merge them into `profile.metadata`.
    #[tracing::instrument(level = "debug", skip_all, fields(connection_id = profile.id))]
    pub async fn refresh_metadata(
        &self,
        profile: &mut ConnectionProfile,
        database: Option<&str>,
    ) -> ExplorerResult<ConnectionMetadata> {
        let handle = self.factory.acquire(profile, database).await?;
        let client = handle.client();

        let version = client
            .query(SERVER_VERSION, &[])
            .await?
            .first()
            .map(|r| r.try_get::<_, String>("version"))
            .transpose()?;

        let server = client
            .query(SERVER_INFO, &[])
            .await?
            .first()
            .map(|r| -> ExplorerResult<ServerInfo> {
                Ok(ServerInfo {
                    server_version: r.try_get("server_version")?,
                    max_connections: r.try_get("max_connections")?,
                    shared_buffers: r.try_get("shared_buffers")?,
                    work_mem: r.try_get("work_mem")?,
                    timezone: r.try_get("timezone")?,
                    database_size: r.try_get("database_size")?,
                    active_connections: r.try_get("active_connections")?,
                })
            })
            .transpose()?;

        let database_config = client
            .query(DATABASE_CONFIG, &[])
            .await?
            .first()
            .map(|r| -> ExplorerResult<DatabaseConfig> {
                Ok(DatabaseConfig {
                    datname: r.try_get("datname")?,
                    encoding: r.try_get("encoding")?,
                    collation: r.try_get("collation")?,
                })
            })
            .transpose()?;
        handle.release();

        let metadata = ConnectionMetadata {
            database: database
                .filter(|db| !db.is_empty())
                .unwrap_or(profile.database())
                .to_string(),
            version,
            server,
            database_config,
            last_updated: Utc::now(),
        };
        metadata.merge_into(&mut profile.metadata)?;
        Ok(metadata)
    }

    /// Newest-first history for a connection, capped at `history_limit`.
    pub async fn query_history(&self, connection_id: i64) -> ExplorerResult<Vec<QueryLogEntry>> {
        self.log.recent(connection_id, self.config().history_limit).await
    }

    /// Drop a deleted connection's history.
    pub async fn forget_connection(&self, connection_id: i64) -> ExplorerResult<usize> {
        self.log.purge_connection(connection_id).await
    }
}
