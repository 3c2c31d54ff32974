//! Row decoding to JSON objects.
//!
//! Browsing a foreign database means result column types are not known at
//! compile time, so rows are decoded by the column's type name into
//! `serde_json::Value`s. Types without a decoder here are cast to `text` on the
//! server before they reach [`row_to_json`] (see [`text_projection`]).

use crate::error::{ExplorerError, ExplorerResult};
use crate::ident::quote_ident;
use serde_json::{Map, Value, json};
use std::fmt::Write as _;
use std::net::IpAddr;
use tokio_postgres::types::{Date, FromSql, Timestamp, Type};
use tokio_postgres::{Row, SimpleQueryMessage};

/// One result row keyed by column name.
pub type JsonRow = Map<String, Value>;

/// Whether [`row_to_json`] decodes this type itself.
///
/// `numeric` is deliberately absent: its text form is exact at any precision.
pub fn decodes_natively(ty: &Type) -> bool {
    matches!(
        ty.name(),
        "bool"
            | "int2"
            | "int4"
            | "int8"
            | "oid"
            | "float4"
            | "float8"
            | "text"
            | "varchar"
            | "bpchar"
            | "name"
            | "citext"
            | "unknown"
            | "json"
            | "jsonb"
            | "uuid"
            | "date"
            | "time"
            | "timestamp"
            | "timestamptz"
            | "bytea"
            | "inet"
            | "cidr"
            | "macaddr"
            | "point"
            | "box"
            | "path"
            | "bit"
            | "varbit"
            | "_text"
            | "_varchar"
            | "_bpchar"
            | "_name"
            | "_int2"
            | "_int4"
            | "_int8"
            | "_float4"
            | "_float8"
            | "_bool"
    )
}

/// Wrap `sql` so every column without a native decoder comes back as `text`.
///
/// `columns` are the statement's result columns as reported by `prepare`.
/// Returns `None` when no cast is needed. Output columns keep their names and
/// order; the CTE renames them positionally so duplicate names stay legal.
pub fn text_projection(sql: &str, columns: &[(&str, Type)]) -> Option<String> {
    if columns.iter().all(|(_, ty)| decodes_natively(ty)) {
        return None;
    }
    let inner = sql.trim().trim_end_matches(';');
    let aliases: Vec<String> = (0..columns.len()).map(|i| format!("c{i}")).collect();
    let select: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, (name, ty))| {
            let cast = if decodes_natively(ty) { "" } else { "::text" };
            format!("c{i}{cast} AS {}", quote_ident(name))
        })
        .collect();
    Some(format!(
        "WITH src({}) AS ({inner}) SELECT {} FROM src",
        aliases.join(", "),
        select.join(", ")
    ))
}

/// Decode an extended-protocol row.
pub fn row_to_json(row: &Row) -> ExplorerResult<JsonRow> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| Ok((col.name().to_string(), column_to_json(row, idx, col.type_())?)))
        .collect()
}

pub fn rows_to_json(rows: &[Row]) -> ExplorerResult<Vec<JsonRow>> {
    rows.iter().map(row_to_json).collect()
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> ExplorerResult<Option<T>> {
    Ok(row.try_get::<_, Option<T>>(idx)?)
}

fn decode<'a, T: FromSql<'a>>(row: &'a Row, idx: usize, f: impl FnOnce(T) -> Value) -> ExplorerResult<Value> {
    Ok(get::<T>(row, idx)?.map(f).unwrap_or(Value::Null))
}

fn array<'a, T: FromSql<'a>>(row: &'a Row, idx: usize, f: impl Fn(T) -> Value) -> ExplorerResult<Value> {
    decode::<Vec<Option<T>>>(row, idx, |items| {
        Value::Array(items.into_iter().map(|v| v.map(&f).unwrap_or(Value::Null)).collect())
    })
}

fn column_to_json(row: &Row, idx: usize, ty: &Type) -> ExplorerResult<Value> {
    match ty.name() {
        "bool" => decode::<bool>(row, idx, Value::Bool),
        "int2" => decode::<i16>(row, idx, Value::from),
        "int4" => decode::<i32>(row, idx, Value::from),
        "int8" => decode::<i64>(row, idx, Value::from),
        "oid" => decode::<u32>(row, idx, Value::from),
        "float4" => decode::<f32>(row, idx, |v| float_json(f64::from(v))),
        "float8" => decode::<f64>(row, idx, float_json),
        "text" | "varchar" | "bpchar" | "name" | "citext" | "unknown" => {
            decode::<String>(row, idx, Value::String)
        }
        "json" | "jsonb" => decode::<Value>(row, idx, |v| v),
        "uuid" => decode::<uuid::Uuid>(row, idx, |u| Value::String(u.to_string())),
        "date" => decode::<Date<chrono::NaiveDate>>(row, idx, |d| match d {
            Date::PosInfinity => infinity(true),
            Date::NegInfinity => infinity(false),
            Date::Value(d) => Value::String(d.to_string()),
        }),
        "time" => decode::<chrono::NaiveTime>(row, idx, |t| Value::String(t.to_string())),
        "timestamp" => decode::<Timestamp<chrono::NaiveDateTime>>(row, idx, |t| {
            timestamp_json(t, |v| v.to_string())
        }),
        "timestamptz" => decode::<Timestamp<chrono::DateTime<chrono::Utc>>>(row, idx, |t| {
            timestamp_json(t, |v| v.to_rfc3339())
        }),
        "bytea" => decode::<Vec<u8>>(row, idx, |b| Value::String(hex(&b))),
        "inet" => decode::<cidr::IpInet>(row, idx, |inet| {
            Value::String(inet_text(inet.address(), inet.network_length()))
        }),
        "cidr" => decode::<cidr::IpCidr>(row, idx, |net| {
            Value::String(format!("{}/{}", net.first_address(), net.network_length()))
        }),
        "macaddr" => decode::<eui48::MacAddress>(row, idx, |mac| {
            let octets: Vec<String> = mac.as_bytes().iter().map(|b| format!("{b:02x}")).collect();
            Value::String(octets.join(":"))
        }),
        "point" => decode::<geo_types::Point<f64>>(row, idx, |p| point_json(p.x(), p.y())),
        "box" => decode::<geo_types::Rect<f64>>(row, idx, |r| {
            json!({
                "min": point_json(r.min().x, r.min().y),
                "max": point_json(r.max().x, r.max().y),
            })
        }),
        "path" => decode::<geo_types::LineString<f64>>(row, idx, |line| {
            Value::Array(line.0.iter().map(|c| point_json(c.x, c.y)).collect())
        }),
        "bit" | "varbit" => decode::<bit_vec::BitVec>(row, idx, |bits| {
            Value::String(bits.iter().map(|b| if b { '1' } else { '0' }).collect())
        }),
        "_text" | "_varchar" | "_bpchar" | "_name" => array::<String>(row, idx, Value::String),
        "_int2" => array::<i16>(row, idx, Value::from),
        "_int4" => array::<i32>(row, idx, Value::from),
        "_int8" => array::<i64>(row, idx, Value::from),
        "_float4" => array::<f32>(row, idx, |v| float_json(f64::from(v))),
        "_float8" => array::<f64>(row, idx, float_json),
        "_bool" => array::<bool>(row, idx, Value::Bool),
        other => Err(ExplorerError::Decode(format!(
            "column {} has type {other} with no JSON decoding; cast it to text",
            row.columns()[idx].name()
        ))),
    }
}

fn infinity(positive: bool) -> Value {
    Value::String(if positive { "infinity" } else { "-infinity" }.to_string())
}

fn timestamp_json<T>(ts: Timestamp<T>, render: impl FnOnce(T) -> String) -> Value {
    match ts {
        Timestamp::PosInfinity => infinity(true),
        Timestamp::NegInfinity => infinity(false),
        Timestamp::Value(v) => Value::String(render(v)),
    }
}

/// `inet` output: the prefix length is shown only when it is not a host address.
fn inet_text(addr: IpAddr, prefix: u8) -> String {
    let host_len = if addr.is_ipv4() { 32 } else { 128 };
    if prefix == host_len {
        addr.to_string()
    } else {
        format!("{addr}/{prefix}")
    }
}

fn point_json(x: f64, y: f64) -> Value {
    json!({ "x": float_json(x), "y": float_json(y) })
}

/// Non-finite floats have no JSON number form.
fn float_json(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(v.to_string()))
}

/// PostgreSQL's `bytea` hex output format.
pub(crate) fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Decode simple-protocol output; every value is text or null.
///
/// When the SQL held several statements, rows of all of them are returned in order.
pub fn simple_rows_to_json(messages: &[SimpleQueryMessage]) -> Vec<JsonRow> {
    messages
        .iter()
        .filter_map(|msg| match msg {
            SimpleQueryMessage::Row(row) => Some(
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        let value = row
                            .get(idx)
                            .map(|s| Value::String(s.to_string()))
                            .unwrap_or(Value::Null);
                        (col.name().to_string(), value)
                    })
                    .collect(),
            ),
            _ => None,
        })
        .collect()
}
