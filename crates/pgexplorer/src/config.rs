//! Explorer configuration.
//!
//! Loaded from TOML or built in code:
//!
//! ```toml
//! connect_timeout_ms = 5000
//! statement_timeout_ms = 30000
//! default_per_page = 50
//!
//! [templates.table_data]
//! default_filters = [{ column = "deleted_at", operator = "is_null" }]
//! default_order = [{ column = "id", direction = "desc" }]
//! ```

use crate::error::{ExplorerError, ExplorerResult};
use crate::filter::{Filter, FilterDescriptor};
use crate::sort::SortDescriptor;
use crate::template;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Runtime settings for provisioning, paging and query history.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExplorerConfig {
    /// TCP connect + startup ceiling for every provisioned handle.
    pub connect_timeout_ms: u64,
    /// Server-side `statement_timeout`; unset means no ceiling.
    pub statement_timeout_ms: Option<u64>,
    /// How long to wait for a pooled connection.
    pub pool_wait_timeout_ms: Option<u64>,
    pub default_per_page: i64,
    pub max_per_page: i64,
    /// Entries returned by query history.
    pub history_limit: usize,
    /// SQL longer than this is truncated in tracing output.
    pub log_sql_max_len: usize,
    pub default_schema: String,
    /// Per-template defaults, keyed by template name.
    pub templates: BTreeMap<String, TemplateDefaults>,
}

/// Default predicates and ordering baked into a named template.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplateDefaults {
    pub default_filters: Vec<FilterDescriptor>,
    pub default_order: Vec<SortDescriptor>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            statement_timeout_ms: None,
            pool_wait_timeout_ms: None,
            default_per_page: 20,
            max_per_page: 1000,
            history_limit: 50,
            log_sql_max_len: 500,
            default_schema: "public".to_string(),
            templates: BTreeMap::new(),
        }
    }
}

impl ExplorerConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> ExplorerResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ExplorerError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw).map_err(|e| match e {
            ExplorerError::Config(msg) => {
                ExplorerError::Config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(raw: &str) -> ExplorerResult<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| ExplorerError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ExplorerResult<()> {
        if self.connect_timeout_ms == 0 {
            return Err(ExplorerError::Config("connect_timeout_ms must be positive".into()));
        }
        if self.statement_timeout_ms == Some(0) {
            return Err(ExplorerError::Config(
                "statement_timeout_ms must be positive (omit it to disable)".into(),
            ));
        }
        if self.max_per_page < 1 {
            return Err(ExplorerError::Config("max_per_page must be at least 1".into()));
        }
        if self.default_per_page < 1 || self.default_per_page > self.max_per_page {
            return Err(ExplorerError::Config(format!(
                "default_per_page must be between 1 and max_per_page ({})",
                self.max_per_page
            )));
        }
        if crate::ident::sanitize_identifier(&self.default_schema) != self.default_schema
            || self.default_schema.is_empty()
        {
            return Err(ExplorerError::Config(format!(
                "default_schema '{}' is not a plain identifier",
                self.default_schema
            )));
        }

        for (name, defaults) in &self.templates {
            if !template::BUILTIN_NAMES.contains(&name.as_str()) {
                return Err(ExplorerError::Config(format!("unknown template: {name}")));
            }
            for desc in &defaults.default_filters {
                if Filter::from_descriptor(desc).is_none() {
                    return Err(ExplorerError::Config(format!(
                        "templates.{name}: invalid default filter on column '{}' with operator '{}'",
                        desc.column, desc.operator
                    )));
                }
            }
            for sort in &defaults.default_order {
                if crate::ident::SafeIdent::new(&sort.column).is_none() {
                    return Err(ExplorerError::Config(format!(
                        "templates.{name}: invalid default order column '{}'",
                        sort.column
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }

    pub fn pool_wait_timeout(&self) -> Option<Duration> {
        self.pool_wait_timeout_ms.map(Duration::from_millis)
    }

    /// Clamp a requested page size to `[1, max_per_page]`; `None` uses the default.
    pub fn per_page(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.default_per_page)
            .clamp(1, self.max_per_page)
    }

    /// Set the connect timeout.
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    /// Set a server-side statement timeout ceiling.
    pub fn statement_timeout_ms(mut self, ms: u64) -> Self {
        self.statement_timeout_ms = Some(ms);
        self
    }

    pub fn pool_wait_timeout_ms(mut self, ms: u64) -> Self {
        self.pool_wait_timeout_ms = Some(ms);
        self
    }

    pub fn default_per_page(mut self, n: i64) -> Self {
        self.default_per_page = n;
        self
    }

    pub fn max_per_page(mut self, n: i64) -> Self {
        self.max_per_page = n;
        self
    }

    pub fn history_limit(mut self, n: usize) -> Self {
        self.history_limit = n;
        self
    }

    pub fn log_sql_max_len(mut self, n: usize) -> Self {
        self.log_sql_max_len = n;
        self
    }

    pub fn default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = schema.into();
        self
    }

    /// Attach default filters/order to a named template.
    pub fn template_defaults(mut self, name: impl Into<String>, defaults: TemplateDefaults) -> Self {
        self.templates.insert(name.into(), defaults);
        self
    }
}
