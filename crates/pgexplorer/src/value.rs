//! Bind values for dynamically built statements.
//!
//! User-supplied filter values and row payloads arrive as JSON. They are bound
//! as text-format parameters so the server infers and parses the target type
//! from the statement, the same way an untyped string parameter is handled by
//! `psql`'s `\bind`.

use bytes::BytesMut;
use serde_json::Value;
use std::error::Error;
use std::fmt;
use tokio_postgres::types::{Format, IsNull, ToSql, Type};

/// A single bind parameter: SQL `NULL` or a text literal the server parses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindValue {
    Null,
    Text(String),
}

impl BindValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Null => None,
            Self::Text(s) => Some(s),
        }
    }

    /// Convert a JSON value.
    ///
    /// Strings are taken verbatim, numbers and booleans use their JSON text,
    /// arrays and objects are bound as their JSON encoding.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::String(s) => Self::Text(s.clone()),
            Value::Bool(b) => Self::Text(b.to_string()),
            Value::Number(n) => Self::Text(n.to_string()),
            other => Self::Text(other.to_string()),
        }
    }

    /// Row payloads treat an empty string as "no value".
    pub fn from_json_empty_as_null(value: &Value) -> Self {
        match value {
            Value::String(s) if s.is_empty() => Self::Null,
            other => Self::from_json(other),
        }
    }

    /// SQL literal used when rendering statements for humans.
    pub fn to_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

impl fmt::Display for BindValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_literal())
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&Value> for BindValue {
    fn from(value: &Value) -> Self {
        Self::from_json(value)
    }
}

impl From<Value> for BindValue {
    fn from(value: Value) -> Self {
        Self::from_json(&value)
    }
}

impl<T: Into<BindValue>> From<Option<T>> for BindValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

macro_rules! impl_from_display {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for BindValue {
                fn from(value: $ty) -> Self {
                    Self::Text(value.to_string())
                }
            }
        )*
    };
}

impl_from_display!(bool, i16, i32, i64, u32, u64, f32, f64);

impl ToSql for BindValue {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            Self::Null => Ok(IsNull::Yes),
            Self::Text(s) => {
                out.extend_from_slice(s.as_bytes());
                Ok(IsNull::No)
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    tokio_postgres::types::to_sql_checked!();
}

/// Inline `values` into `?`-style SQL for query history and logs.
///
/// Never use the result for execution. Placeholders are consumed left to right
/// in one pass, so a `?` inside an inlined value is left alone. Extra
/// placeholders stay as `?`.
pub fn interpolate(sql: &str, values: &[BindValue]) -> String {
    let mut out = String::with_capacity(sql.len() + values.len() * 8);
    let mut values = values.iter();
    for ch in sql.chars() {
        if ch == '?' {
            match values.next() {
                Some(v) => out.push_str(&v.to_literal()),
                None => out.push('?'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_conversion() {
        assert_eq!(BindValue::from_json(&json!(null)), BindValue::Null);
        assert_eq!(BindValue::from_json(&json!("18")), BindValue::text("18"));
        assert_eq!(BindValue::from_json(&json!(18)), BindValue::text("18"));
        assert_eq!(BindValue::from_json(&json!(1.5)), BindValue::text("1.5"));
        assert_eq!(BindValue::from_json(&json!(true)), BindValue::text("true"));
        assert_eq!(
            BindValue::from_json(&json!({"a": 1})),
            BindValue::text(r#"{"a":1}"#)
        );
    }

    #[test]
    fn empty_string_as_null() {
        assert_eq!(BindValue::from_json_empty_as_null(&json!("")), BindValue::Null);
        assert_eq!(
            BindValue::from_json_empty_as_null(&json!(" ")),
            BindValue::text(" ")
        );
    }

    #[test]
    fn literal_escapes_quotes() {
        assert_eq!(BindValue::text("O'Brien").to_literal(), "'O''Brien'");
        assert_eq!(BindValue::Null.to_literal(), "NULL");
        assert_eq!(BindValue::from(Some(5i64)).to_literal(), "'5'");
        assert_eq!(BindValue::from(None::<i64>), BindValue::Null);
    }

    #[test]
    fn interpolate_inlines_in_order() {
        let sql = "INSERT INTO public.t (a, b, c) VALUES (?, ?, ?)";
        let out = interpolate(
            sql,
            &[BindValue::text("x"), BindValue::Null, BindValue::text("it's")],
        );
        assert_eq!(out, "INSERT INTO public.t (a, b, c) VALUES ('x', NULL, 'it''s')");
    }

    #[test]
    fn interpolate_does_not_rescan_values() {
        let out = interpolate("a = ? AND b = ?", &[BindValue::text("?"), BindValue::text("2")]);
        assert_eq!(out, "a = '?' AND b = '2'");
    }

    #[test]
    fn interpolate_leaves_extra_placeholders() {
        assert_eq!(interpolate("a = ? AND b = ?", &[BindValue::text("1")]), "a = '1' AND b = ?");
    }

    #[test]
    fn binds_as_text_format() {
        let v = BindValue::text("42");
        assert!(matches!(v.encode_format(&Type::INT4), Format::Text));
        assert!(<BindValue as ToSql>::accepts(&Type::TIMESTAMPTZ));

        let mut buf = BytesMut::new();
        assert!(matches!(v.to_sql(&Type::INT4, &mut buf), Ok(IsNull::No)));
        assert_eq!(&buf[..], b"42");

        let mut buf = BytesMut::new();
        assert!(matches!(BindValue::Null.to_sql(&Type::INT4, &mut buf), Ok(IsNull::Yes)));
        assert!(buf.is_empty());
    }
}
