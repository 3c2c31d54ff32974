//! Named query templates.
//!
//! A template names one of the default operations (`table_data`, `insert_row`, ...)
//! and documents its placeholders. Rendering composes the matching [`qb`](crate::qb)
//! builder rather than substituting text, so:
//! - template default predicates are ANDed with caller predicates
//! - a caller ORDER BY replaces the template default ORDER BY
//! - WHERE precedes ORDER BY, which precedes LIMIT

use crate::config::ExplorerConfig;
use crate::error::{ExplorerError, ExplorerResult};
use crate::filter::{Filter, parse_filters};
use crate::ident::{QualifiedTable, SafeIdent};
use crate::qb::{self, BuiltQuery, SelectQb, SqlQb};
use crate::sort::{Sort, parse_sorts};
use crate::value::BindValue;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub const TABLE_DATA: &str = "table_data";
pub const TABLE_DATA_WITH_FILTER: &str = "table_data_with_filter";
pub const TABLE_COUNT: &str = "table_count";
pub const TABLE_COUNT_WITH_FILTER: &str = "table_count_with_filter";
pub const INSERT_ROW: &str = "insert_row";
pub const UPDATE_ROW: &str = "update_row";
pub const DELETE_ROW: &str = "delete_row";

pub const BUILTIN_NAMES: [&str; 7] = [
    TABLE_DATA,
    TABLE_DATA_WITH_FILTER,
    TABLE_COUNT,
    TABLE_COUNT_WITH_FILTER,
    INSERT_ROW,
    UPDATE_ROW,
    DELETE_ROW,
];

/// Statement shape a template renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Select,
    Count,
    Insert,
    Update,
    Delete,
}

/// A named default operation.
#[derive(Debug, Clone)]
pub struct QueryTemplate {
    pub name: &'static str,
    pub description: &'static str,
    /// Declared placeholder names; documentation only.
    pub parameters: &'static [&'static str],
    /// Textual form of the template, for display.
    pub sql: &'static str,
    pub kind: TemplateKind,
    pub default_filters: Vec<Filter>,
    pub default_order: Vec<Sort>,
}

impl QueryTemplate {
    fn builtin(
        name: &'static str,
        kind: TemplateKind,
        description: &'static str,
        parameters: &'static [&'static str],
        sql: &'static str,
    ) -> Self {
        Self {
            name,
            description,
            parameters,
            sql,
            kind,
            default_filters: Vec::new(),
            default_order: Vec::new(),
        }
    }
}

fn builtins() -> Vec<QueryTemplate> {
    use TemplateKind::*;
    vec![
        QueryTemplate::builtin(
            TABLE_DATA,
            Select,
            "Get data from a table with pagination",
            &["schema", "table", "limit", "offset", "where"],
            "SELECT * FROM :schema.:table LIMIT :limit OFFSET :offset",
        ),
        QueryTemplate::builtin(
            TABLE_DATA_WITH_FILTER,
            Select,
            "Get data from a table with filters and pagination",
            &["schema", "table", "where", "limit", "offset"],
            "SELECT * FROM :schema.:table WHERE :where LIMIT :limit OFFSET :offset",
        ),
        QueryTemplate::builtin(
            TABLE_COUNT,
            Count,
            "Count rows in a table",
            &["schema", "table", "where"],
            "SELECT COUNT(*) AS count FROM :schema.:table",
        ),
        QueryTemplate::builtin(
            TABLE_COUNT_WITH_FILTER,
            Count,
            "Count rows in a table with filters",
            &["schema", "table", "where"],
            "SELECT COUNT(*) AS count FROM :schema.:table WHERE :where",
        ),
        QueryTemplate::builtin(
            INSERT_ROW,
            Insert,
            "Insert a row into a table",
            &["schema", "table", "columns", "values"],
            "INSERT INTO :schema.:table (:columns) VALUES (:values)",
        ),
        QueryTemplate::builtin(
            UPDATE_ROW,
            Update,
            "Update a row in a table",
            &["schema", "table", "columns", "values", "where"],
            "UPDATE :schema.:table SET :set_clause WHERE :where_clause",
        ),
        QueryTemplate::builtin(
            DELETE_ROW,
            Delete,
            "Delete a row from a table",
            &["schema", "table", "where"],
            "DELETE FROM :schema.:table WHERE :where_clause",
        ),
    ]
}

/// Validated values for a template's placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateParams {
    pub table: QualifiedTable,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// Column/value pairs for `insert_row` and `update_row`.
    pub assignments: Vec<(SafeIdent, BindValue)>,
}

impl TemplateParams {
    pub fn new(table: QualifiedTable) -> Self {
        Self {
            table,
            limit: None,
            offset: None,
            assignments: Vec::new(),
        }
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(n);
        self
    }

    pub fn assign(mut self, column: SafeIdent, value: impl Into<BindValue>) -> Self {
        self.assignments.push((column, value.into()));
        self
    }

    /// Build from a string map.
    ///
    /// Recognised keys: `schema`, `table` (required, sanitized, non-empty),
    /// `limit`, `offset` (non-negative integers), `columns` (comma-separated) and
    /// `values` (a JSON array, or comma-separated text) of equal length. Any other
    /// key is rejected, including raw SQL clauses such as `where_clause`.
    pub fn from_map(map: &HashMap<String, String>) -> ExplorerResult<Self> {
        const KNOWN: [&str; 6] = ["schema", "table", "limit", "offset", "columns", "values"];
        if let Some(unknown) = map.keys().find(|k| !KNOWN.contains(&k.as_str())) {
            return Err(ExplorerError::validation(format!(
                "unsupported template parameter '{unknown}'"
            )));
        }

        let required = |key: &str| {
            map.get(key)
                .ok_or_else(|| ExplorerError::validation(format!("missing template parameter '{key}'")))
        };
        let table = QualifiedTable::parse(required("schema")?, required("table")?)?;

        let mut params = Self::new(table);
        params.limit = map.get("limit").map(|v| non_negative("limit", v)).transpose()?;
        params.offset = map.get("offset").map(|v| non_negative("offset", v)).transpose()?;

        match (map.get("columns"), map.get("values")) {
            (None, None) => {}
            (Some(columns), Some(values)) => {
                let columns = columns
                    .split(',')
                    .map(|c| SafeIdent::parse(c, "column"))
                    .collect::<ExplorerResult<Vec<_>>>()?;
                let values = parse_values(values);
                if columns.len() != values.len() {
                    return Err(ExplorerError::validation(format!(
                        "{} columns but {} values",
                        columns.len(),
                        values.len()
                    )));
                }
                params.assignments = columns.into_iter().zip(values).collect();
            }
            _ => {
                return Err(ExplorerError::validation(
                    "template parameters 'columns' and 'values' must be given together",
                ));
            }
        }
        Ok(params)
    }
}

fn non_negative(key: &str, raw: &str) -> ExplorerResult<i64> {
    match raw.trim().parse::<i64>() {
        Ok(n) if n >= 0 => Ok(n),
        _ => Err(ExplorerError::validation(format!(
            "template parameter '{key}' must be a non-negative integer, got '{raw}'"
        ))),
    }
}

fn parse_values(raw: &str) -> Vec<BindValue> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items.iter().map(BindValue::from_json_empty_as_null).collect(),
        _ => raw
            .split(',')
            .map(|v| match v.trim() {
                "" => BindValue::Null,
                v => BindValue::text(v),
            })
            .collect(),
    }
}

/// Registry of named templates.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    templates: BTreeMap<&'static str, QueryTemplate>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// The built-in templates without defaults.
    pub fn new() -> Self {
        Self {
            templates: builtins().into_iter().map(|t| (t.name, t)).collect(),
        }
    }

    /// Built-in templates with the default filters/order from `config`.
    pub fn from_config(config: &ExplorerConfig) -> ExplorerResult<Self> {
        let mut engine = Self::new();
        for (name, defaults) in &config.templates {
            let template = engine
                .templates
                .get_mut(name.as_str())
                .ok_or_else(|| ExplorerError::TemplateNotFound(name.clone()))?;
            template.default_filters = parse_filters(&defaults.default_filters);
            template.default_order = parse_sorts(&defaults.default_order);
        }
        Ok(engine)
    }

    pub fn get(&self, name: &str) -> ExplorerResult<&QueryTemplate> {
        self.templates
            .get(name)
            .ok_or_else(|| ExplorerError::TemplateNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.templates.keys().copied()
    }

    pub fn templates(&self) -> impl Iterator<Item = &QueryTemplate> {
        self.templates.values()
    }

    /// The SELECT (or COUNT) builder for a read template.
    pub fn select(
        &self,
        name: &str,
        params: &TemplateParams,
        filters: &[Filter],
        order: &[Sort],
    ) -> ExplorerResult<SelectQb> {
        let template = self.get(name)?;
        let predicates = template.default_filters.iter().chain(filters).cloned();

        match template.kind {
            TemplateKind::Select => {
                let limit = params.limit.ok_or_else(|| {
                    ExplorerError::validation(format!("template '{name}' requires 'limit'"))
                })?;
                Ok(qb::select(params.table.clone())
                    .filters(predicates)
                    .replace_order(template.default_order.iter().cloned())
                    .replace_order(order.iter().cloned())
                    .limit(limit)
                    .offset(params.offset.unwrap_or(0)))
            }
            TemplateKind::Count => Ok(qb::count(params.table.clone()).filters(predicates)),
            _ => Err(ExplorerError::validation(format!(
                "template '{name}' does not produce rows"
            ))),
        }
    }

    /// Render a template with caller predicates and ordering.
    pub fn render(
        &self,
        name: &str,
        params: &TemplateParams,
        filters: &[Filter],
        order: &[Sort],
    ) -> ExplorerResult<BuiltQuery> {
        let template = self.get(name)?;
        let predicates = template.default_filters.iter().chain(filters).cloned();
        let table = params.table.clone();

        match template.kind {
            TemplateKind::Select | TemplateKind::Count => {
                self.select(name, params, filters, order)?.build_query()
            }
            TemplateKind::Insert => {
                if predicates.count() > 0 {
                    return Err(ExplorerError::validation(format!(
                        "template '{name}' does not take filters"
                    )));
                }
                params
                    .assignments
                    .iter()
                    .fold(qb::insert(table), |q, (col, value)| q.set(col.clone(), value.clone()))
                    .build_query()
            }
            TemplateKind::Update => params
                .assignments
                .iter()
                .fold(qb::update(table), |q, (col, value)| q.set(col.clone(), value.clone()))
                .filters(predicates)
                .build_query(),
            TemplateKind::Delete => qb::delete(table).filters(predicates).build_query(),
        }
    }

    /// [`TemplateEngine::render`] with parameters from a string map.
    pub fn render_map(
        &self,
        name: &str,
        params: &HashMap<String, String>,
        filters: &[Filter],
        order: &[Sort],
    ) -> ExplorerResult<BuiltQuery> {
        self.get(name)?;
        self.render(name, &TemplateParams::from_map(params)?, filters, order)
    }
}
