//! Filter compilation for table browsing.
//!
//! User filters arrive as loose `{column, operator, value?}` descriptors. Each is
//! converted into a [`Filter`], a tagged union whose variants carry exactly the
//! operands their operator needs. Descriptors that cannot be converted (unknown
//! operator, unusable column, wrong value shape) are dropped rather than
//! defaulted: an under-filtered page is preferred over a failed one.
//!
//! Values never reach SQL text. The only literals ever inlined are the `TRUE`,
//! `FALSE` and `NULL` keywords of the `is` / `is_not` operators.
//!
//! # Example
//! ```ignore
//! use pgexplorer::filter::{compile_filters, FilterDescriptor};
//!
//! let (sql, bindings) = compile_filters(&[FilterDescriptor::new("age", "gt", "18")]);
//! assert_eq!(sql, "age > ?");
//! ```

use crate::ident::SafeIdent;
use crate::qb::{ParamList, Placeholder};
use crate::value::BindValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The closed set of filter operators accepted from callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    Is,
    IsNot,
    Between,
    NotBetween,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 16] = [
        Self::Eq,
        Self::Neq,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::Like,
        Self::Ilike,
        Self::Is,
        Self::IsNot,
        Self::Between,
        Self::NotBetween,
        Self::In,
        Self::NotIn,
        Self::IsNull,
        Self::IsNotNull,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Like => "like",
            Self::Ilike => "ilike",
            Self::Is => "is",
            Self::IsNot => "is_not",
            Self::Between => "between",
            Self::NotBetween => "not_between",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::IsNull => "is_null",
            Self::IsNotNull => "is_not_null",
        }
    }

    /// Exact, case-sensitive lookup.
    pub fn parse(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == token)
    }
}

impl FromStr for FilterOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown filter operator '{s}'"))
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filter as supplied by a caller, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    pub column: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl FilterDescriptor {
    pub fn new(column: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator: operator.into(),
            value: Some(value.into()),
        }
    }

    /// Descriptor for operators that take no value (`is_null`, `is_not_null`).
    pub fn unary(column: impl Into<String>, operator: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            operator: operator.into(),
            value: None,
        }
    }

    /// Accept a filter list either as a JSON array or as a JSON-encoded string.
    ///
    /// Unparseable input yields an empty list and malformed elements are skipped.
    pub fn parse_list(input: &Value) -> Vec<Self> {
        match input {
            Value::String(s) => serde_json::from_str::<Value>(s)
                .map(|v| Self::parse_array(&v))
                .unwrap_or_default(),
            other => Self::parse_array(other),
        }
    }

    fn parse_array(input: &Value) -> Vec<Self> {
        let Value::Array(items) = input else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect()
    }

    /// Validate and convert into a typed [`Filter`].
    pub fn to_filter(&self) -> Option<Filter> {
        Filter::from_descriptor(self)
    }
}

/// Scalar comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

/// Keyword literal allowed on the right of `IS` / `IS NOT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruthLiteral {
    True,
    False,
    Null,
}

impl TruthLiteral {
    /// Case-insensitive exact match on `TRUE`, `FALSE` or `NULL`.
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "TRUE" => Some(Self::True),
            "FALSE" => Some(Self::False),
            "NULL" => Some(Self::Null),
            _ => None,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Self::True => "TRUE",
            Self::False => "FALSE",
            Self::Null => "NULL",
        }
    }
}

/// A validated filter, shaped by operator arity.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `col IS [NOT] NULL`
    Null { column: SafeIdent, negated: bool },
    /// `col <op> ?`
    Compare {
        column: SafeIdent,
        op: CompareOp,
        value: BindValue,
    },
    /// `CAST(col AS TEXT) [I]LIKE ?`, the bound pattern already wrapped in `%`.
    Pattern {
        column: SafeIdent,
        case_insensitive: bool,
        pattern: BindValue,
    },
    /// `col IS [NOT] TRUE|FALSE|NULL`
    Truth {
        column: SafeIdent,
        negated: bool,
        literal: TruthLiteral,
    },
    /// `col [NOT ]BETWEEN ? AND ?`
    Range {
        column: SafeIdent,
        negated: bool,
        low: BindValue,
        high: BindValue,
    },
    /// `col [NOT ]IN (?, ...)` with at least one value.
    Set {
        column: SafeIdent,
        negated: bool,
        values: Vec<BindValue>,
    },
}

impl Filter {
    /// Convert a raw descriptor, or `None` when it is unusable.
    pub fn from_descriptor(desc: &FilterDescriptor) -> Option<Self> {
        let op = FilterOperator::parse(&desc.operator)?;
        let column = SafeIdent::new(&desc.column)?;
        let value = desc.value.as_ref().filter(|v| !v.is_null());

        let filter = match op {
            FilterOperator::IsNull | FilterOperator::IsNotNull => Self::Null {
                column,
                negated: op == FilterOperator::IsNotNull,
            },
            FilterOperator::Eq
            | FilterOperator::Neq
            | FilterOperator::Gt
            | FilterOperator::Gte
            | FilterOperator::Lt
            | FilterOperator::Lte => Self::Compare {
                column,
                op: compare_op(op)?,
                value: BindValue::from(scalar_text(value?)?),
            },
            FilterOperator::Like | FilterOperator::Ilike => Self::Pattern {
                column,
                case_insensitive: op == FilterOperator::Ilike,
                pattern: BindValue::from(format!("%{}%", scalar_text(value?)?)),
            },
            FilterOperator::Is | FilterOperator::IsNot => {
                let negated = op == FilterOperator::IsNot;
                let text = scalar_text(value?)?;
                match TruthLiteral::parse(&text) {
                    Some(literal) => Self::Truth {
                        column,
                        negated,
                        literal,
                    },
                    None => Self::Compare {
                        column,
                        op: if negated { CompareOp::Neq } else { CompareOp::Eq },
                        value: BindValue::from(text),
                    },
                }
            }
            FilterOperator::Between | FilterOperator::NotBetween => {
                let Value::Array(items) = value? else {
                    return None;
                };
                let [low, high] = items.as_slice() else {
                    return None;
                };
                Self::Range {
                    column,
                    negated: op == FilterOperator::NotBetween,
                    low: BindValue::from(scalar_text(low)?),
                    high: BindValue::from(scalar_text(high)?),
                }
            }
            FilterOperator::In | FilterOperator::NotIn => {
                let values = set_values(value?)?;
                Self::Set {
                    column,
                    negated: op == FilterOperator::NotIn,
                    values,
                }
            }
        };
        Some(filter)
    }

    /// Equality on a key column; a `NULL` key matches with `IS NULL`.
    pub fn key(column: SafeIdent, value: BindValue) -> Self {
        if value.is_null() {
            Self::Null {
                column,
                negated: false,
            }
        } else {
            Self::Compare {
                column,
                op: CompareOp::Eq,
                value,
            }
        }
    }

    pub fn column(&self) -> &SafeIdent {
        match self {
            Self::Null { column, .. }
            | Self::Compare { column, .. }
            | Self::Pattern { column, .. }
            | Self::Truth { column, .. }
            | Self::Range { column, .. }
            | Self::Set { column, .. } => column,
        }
    }

    /// Render the predicate, pushing its values onto `params`.
    pub fn build(&self, params: &mut ParamList) -> String {
        match self {
            Self::Null { column, negated } => {
                let not = if *negated { " NOT" } else { "" };
                format!("{column} IS{not} NULL")
            }
            Self::Compare { column, op, value } => {
                format!("{} {} {}", column, op.sql(), params.bind(value.clone()))
            }
            Self::Pattern {
                column,
                case_insensitive,
                pattern,
            } => {
                let op = if *case_insensitive { "ILIKE" } else { "LIKE" };
                format!("CAST({column} AS TEXT) {op} {}", params.bind(pattern.clone()))
            }
            Self::Truth {
                column,
                negated,
                literal,
            } => {
                let not = if *negated { " NOT" } else { "" };
                format!("{column} IS{not} {}", literal.sql())
            }
            Self::Range {
                column,
                negated,
                low,
                high,
            } => {
                let op = if *negated { "NOT BETWEEN" } else { "BETWEEN" };
                let low = params.bind(low.clone());
                let high = params.bind(high.clone());
                format!("{column} {op} {low} AND {high}")
            }
            Self::Set {
                column,
                negated,
                values,
            } => {
                let op = if *negated { "NOT IN" } else { "IN" };
                let placeholders: Vec<String> =
                    values.iter().map(|v| params.bind(v.clone())).collect();
                format!("{column} {op} ({})", placeholders.join(", "))
            }
        }
    }
}

fn compare_op(op: FilterOperator) -> Option<CompareOp> {
    Some(match op {
        FilterOperator::Eq => CompareOp::Eq,
        FilterOperator::Neq => CompareOp::Neq,
        FilterOperator::Gt => CompareOp::Gt,
        FilterOperator::Gte => CompareOp::Gte,
        FilterOperator::Lt => CompareOp::Lt,
        FilterOperator::Lte => CompareOp::Lte,
        _ => return None,
    })
}

/// Text of a non-null scalar; arrays, objects and null are rejected.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Values for `in` / `not_in`: a JSON array of scalars or a comma-separated string.
fn set_values(value: &Value) -> Option<Vec<BindValue>> {
    let values: Vec<BindValue> = match value {
        Value::Array(items) => items
            .iter()
            .map(|item| scalar_text(item).map(BindValue::from))
            .collect::<Option<_>>()?,
        scalar => scalar_text(scalar)?
            .split(',')
            .map(str::trim)
            .filter(|piece| !piece.is_empty())
            .map(BindValue::from)
            .collect(),
    };
    (!values.is_empty()).then_some(values)
}

/// Convert descriptors, silently dropping the invalid ones.
pub fn parse_filters(descriptors: &[FilterDescriptor]) -> Vec<Filter> {
    descriptors.iter().filter_map(Filter::from_descriptor).collect()
}

/// Render filters joined with ` AND `.
pub fn build_filters(filters: &[Filter], params: &mut ParamList) -> String {
    filters
        .iter()
        .map(|f| f.build(params))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Compile descriptors into a `?`-placeholder WHERE fragment and its bindings.
///
/// Returns an empty fragment and no bindings when nothing survives validation.
pub fn compile_filters(descriptors: &[FilterDescriptor]) -> (String, Vec<BindValue>) {
    let filters = parse_filters(descriptors);
    let mut params = ParamList::with_style(Placeholder::Question);
    let sql = build_filters(&filters, &mut params);
    (sql, params.into_values())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(values: &[&str]) -> Vec<BindValue> {
        values.iter().map(|v| BindValue::text(*v)).collect()
    }

    fn expect(sql: &str, values: &[&str]) -> (String, Vec<BindValue>) {
        (sql.to_string(), text(values))
    }

    fn compile_one(column: &str, op: &str, value: Value) -> (String, Vec<BindValue>) {
        compile_filters(&[FilterDescriptor::new(column, op, value)])
    }

    #[test]
    fn comparison_operators() {
        assert_eq!(compile_one("age", "gt", json!("18")), expect("age > ?", &["18"]));
        let cases = [
            ("eq", "="),
            ("neq", "<>"),
            ("gt", ">"),
            ("gte", ">="),
            ("lt", "<"),
            ("lte", "<="),
        ];
        for (op, sql_op) in cases {
            let (sql, bindings) = compile_one("n", op, json!(5));
            assert_eq!(sql, format!("n {sql_op} ?"));
            assert_eq!(bindings, text(&["5"]));
        }
    }

    #[test]
    fn like_wraps_pattern_and_casts() {
        assert_eq!(
            compile_one("name", "like", json!("ali")),
            expect("CAST(name AS TEXT) LIKE ?", &["%ali%"])
        );
        assert_eq!(
            compile_one("id", "ilike", json!(42)),
            expect("CAST(id AS TEXT) ILIKE ?", &["%42%"])
        );
    }

    #[test]
    fn is_literals_inline_keywords() {
        assert_eq!(compile_one("active", "is", json!("true")), expect("active IS TRUE", &[]));
        assert_eq!(compile_one("active", "is_not", json!("False")), expect("active IS NOT FALSE", &[]));
        assert_eq!(compile_one("x", "is", json!("null")), expect("x IS NULL", &[]));
        assert_eq!(compile_one("active", "is", json!(true)), expect("active IS TRUE", &[]));
    }

    #[test]
    fn is_falls_back_to_equality() {
        assert_eq!(compile_one("status", "is", json!("open")), expect("status = ?", &["open"]));
        assert_eq!(compile_one("status", "is_not", json!("open")), expect("status <> ?", &["open"]));
        // Not an exact keyword match.
        assert_eq!(compile_one("s", "is", json!("truely")), expect("s = ?", &["truely"]));
    }

    #[test]
    fn between_requires_two_values() {
        assert_eq!(
            compile_one("x", "between", json!(["1", "9"])),
            expect("x BETWEEN ? AND ?", &["1", "9"])
        );
        assert_eq!(
            compile_one("x", "not_between", json!([1, 9])),
            expect("x NOT BETWEEN ? AND ?", &["1", "9"])
        );
        assert_eq!(compile_one("x", "between", json!(["1"])), expect("", &[]));
        assert_eq!(compile_one("x", "between", json!(["1", "2", "3"])), expect("", &[]));
        assert_eq!(compile_one("x", "between", json!("1,2")), expect("", &[]));
    }

    #[test]
    fn in_accepts_array_or_comma_string() {
        let expected = ("name IN (?, ?)".to_string(), text(&["a", "b"]));
        assert_eq!(compile_one("name", "in", json!(["a", "b"])), expected);
        assert_eq!(compile_one("name", "in", json!("a,b")), expected);
        assert_eq!(compile_one("name", "in", json!(" a , b ,")), expected);
        assert_eq!(
            compile_one("id", "not_in", json!([1, 2, 3])),
            expect("id NOT IN (?, ?, ?)", &["1", "2", "3"])
        );
    }

    #[test]
    fn in_with_nothing_usable_is_dropped() {
        assert_eq!(compile_one("name", "in", json!([])), expect("", &[]));
        assert_eq!(compile_one("name", "in", json!(" , ,")), expect("", &[]));
        assert_eq!(compile_one("name", "in", json!([["nested"]])), expect("", &[]));
    }

    #[test]
    fn null_checks_take_no_value() {
        let filters = [
            FilterDescriptor::unary("deleted_at", "is_null"),
            FilterDescriptor::unary("email", "is_not_null"),
        ];
        assert_eq!(
            compile_filters(&filters),
            expect("deleted_at IS NULL AND email IS NOT NULL", &[])
        );
    }

    #[test]
    fn one_arg_operators_need_a_value() {
        for op in ["eq", "like", "is", "gt"] {
            assert_eq!(compile_filters(&[FilterDescriptor::unary("x", op)]), expect("", &[]));
            assert_eq!(compile_one("x", op, Value::Null), expect("", &[]));
            assert_eq!(compile_one("x", op, json!([1])), expect("", &[]));
        }
    }

    #[test]
    fn unknown_operator_is_dropped() {
        assert_eq!(compile_one("x", "contains", json!("a")), expect("", &[]));
        assert_eq!(compile_one("x", "EQ", json!("a")), expect("", &[]));
        assert_eq!(compile_one("x", "", json!("a")), expect("", &[]));
    }

    #[test]
    fn unsafe_column_is_sanitized_or_dropped() {
        assert_eq!(
            compile_one("na'me; --", "eq", json!("x")),
            expect("name = ?", &["x"])
        );
        assert_eq!(compile_one("'; --", "eq", json!("x")), expect("", &[]));
    }

    #[test]
    fn values_never_reach_sql_text() {
        let (sql, bindings) = compile_one("name", "eq", json!("x'; DROP TABLE users; --"));
        assert_eq!(sql, "name = ?");
        assert_eq!(bindings, text(&["x'; DROP TABLE users; --"]));
    }

    #[test]
    fn mixed_list_keeps_order_and_joins_with_and() {
        let filters = vec![
            FilterDescriptor::new("age", "gte", "21"),
            FilterDescriptor::new("bogus", "nope", "1"),
            FilterDescriptor::new("city", "in", json!(["Oslo", "Rome"])),
            FilterDescriptor::new("x", "between", json!([1])),
            FilterDescriptor::new("name", "ilike", "an"),
        ];
        let (sql, bindings) = compile_filters(&filters);
        assert_eq!(sql, "age >= ? AND city IN (?, ?) AND CAST(name AS TEXT) ILIKE ?");
        assert_eq!(bindings, text(&["21", "Oslo", "Rome", "%an%"]));
    }

    #[test]
    fn dollar_rendering_numbers_sequentially() {
        let filters = parse_filters(&[
            FilterDescriptor::new("a", "eq", "1"),
            FilterDescriptor::new("b", "between", json!([2, 3])),
        ]);
        let mut params = ParamList::new();
        assert_eq!(build_filters(&filters, &mut params), "a = $1 AND b BETWEEN $2 AND $3");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn key_filter_handles_null() {
        let col = SafeIdent::new("id").unwrap();
        let mut params = ParamList::with_style(Placeholder::Question);
        assert_eq!(Filter::key(col.clone(), BindValue::Null).build(&mut params), "id IS NULL");
        assert_eq!(Filter::key(col, BindValue::text("7")).build(&mut params), "id = ?");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn parse_list_accepts_string_and_array() {
        let raw = r#"[{"column":"age","operator":"gt","value":"18"},{"column":"x"},{"column":"d","operator":"is_null"}]"#;
        let from_string = FilterDescriptor::parse_list(&Value::String(raw.into()));
        let from_array = FilterDescriptor::parse_list(&serde_json::from_str(raw).unwrap());
        assert_eq!(from_string, from_array);
        assert_eq!(from_string.len(), 2);
        assert_eq!(from_string[1].value, None);

        assert!(FilterDescriptor::parse_list(&json!("not json")).is_empty());
        assert!(FilterDescriptor::parse_list(&json!({"column": "a"})).is_empty());
    }

    #[test]
    fn operator_allowlist_round_trips() {
        assert_eq!(FilterOperator::ALL.len(), 16);
        for op in FilterOperator::ALL {
            assert_eq!(op.as_str().parse::<FilterOperator>(), Ok(op));
        }
    }
}
