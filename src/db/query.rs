//! Query runner and catalog listings

use crate::config::PgSettings;
use crate::db::connection::{close_with, connect};
use crate::error::{Result, TabulatorError};
use crate::reshape::table::scalar_series;
use crate::reshape::Scalar;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use polars::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgConnection, PgRow, PgValueFormat};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row, TypeInfo, ValueRef};
use std::time::Instant;
use tracing::{debug, info};

const TABLES_SQL: &str =
    "SELECT tablename, tableowner FROM pg_catalog.pg_tables WHERE schemaname = 'public'";
const CONNECTIONS_SQL: &str =
    "SELECT datname, pid, usename FROM pg_stat_activity WHERE pid <> pg_backend_pid()";
const DATABASES_SQL: &str = "SELECT datname FROM pg_database WHERE datistemplate = false";

/// Rows returned by a query, as JSON objects keyed by column name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    /// Column names in select-list order. Empty when the query returned no rows.
    pub columns: Vec<String>,

    pub rows: Vec<Map<String, Value>>,

    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Values of one column, `Null` where a row lacks it.
    pub fn column(&self, name: &str) -> Vec<&Value> {
        self.rows
            .iter()
            .map(|row| row.get(name).unwrap_or(&Value::Null))
            .collect()
    }

    /// Rows as JSON objects, ready for `TableReshaper::to_table`.
    pub fn into_records(self) -> Vec<Value> {
        self.rows.into_iter().map(Value::Object).collect()
    }

    /// Build a polars `DataFrame` with one column per result column.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let series = self
            .columns
            .iter()
            .map(|name| {
                let values: Vec<Option<Scalar>> = self
                    .column(name)
                    .into_iter()
                    .map(|v| Some(Scalar::from_json(v).unwrap_or_else(|| Scalar::Text(v.to_string()))))
                    .collect();
                scalar_series(name, &values)
            })
            .collect::<Vec<_>>();

        Ok(DataFrame::new(series)?)
    }
}

/// Run `sql` and collect every row.
pub async fn run_query(sql: &str, settings: &PgSettings) -> Result<QueryResult> {
    info!("Running query on {}", settings.dbname);
    debug!("SQL: {}", sql);

    let mut conn = connect(settings).await?;
    let result = fetch(&mut conn, sqlx::query(sql)).await;
    close_with(conn, result).await
}

/// Tables in the `public` schema, optionally only those owned by `owner`.
pub async fn show_tables(settings: &PgSettings, owner: Option<&str>) -> Result<QueryResult> {
    let mut conn = connect(settings).await?;
    let result = match owner {
        Some(owner) => {
            let sql = format!("{} AND tableowner = $1", TABLES_SQL);
            fetch(&mut conn, sqlx::query(&sql).bind(owner)).await
        }
        None => fetch(&mut conn, sqlx::query(TABLES_SQL)).await,
    };
    close_with(conn, result).await
}

/// Other sessions on the server, optionally only those connected to `db`.
pub async fn show_connections(settings: &PgSettings, db: Option<&str>) -> Result<QueryResult> {
    let mut conn = connect(settings).await?;
    let result = match db {
        Some(db) => {
            let sql = format!("{} AND datname = $1", CONNECTIONS_SQL);
            fetch(&mut conn, sqlx::query(&sql).bind(db)).await
        }
        None => fetch(&mut conn, sqlx::query(CONNECTIONS_SQL)).await,
    };
    close_with(conn, result).await
}

/// User-created (non-template) databases.
pub async fn show_databases(settings: &PgSettings) -> Result<QueryResult> {
    let mut conn = connect(settings).await?;
    let result = fetch(&mut conn, sqlx::query(DATABASES_SQL)).await;
    close_with(conn, result).await
}

/// Terminate every other session connected to `db` and return how many were
/// terminated. A database that does not exist is not an error.
pub async fn clear_connections(db: &str, settings: &PgSettings) -> Result<usize> {
    let mut conn = connect(settings).await?;
    let result = terminate_backends(&mut conn, db).await;
    close_with(conn, result).await
}

async fn terminate_backends(conn: &mut PgConnection, db: &str) -> Result<usize> {
    let exists: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM pg_database WHERE datname = $1")
        .bind(db)
        .fetch_optional(&mut *conn)
        .await?;
    if exists.is_none() {
        debug!("Database {} does not exist, nothing to clear", db);
        return Ok(0);
    }

    let pids: Vec<(i32,)> = sqlx::query_as(
        "SELECT pid FROM pg_stat_activity WHERE pid <> pg_backend_pid() AND datname = $1",
    )
    .bind(db)
    .fetch_all(&mut *conn)
    .await?;

    let mut terminated = 0;
    for (pid,) in pids {
        let (ok,): (bool,) = sqlx::query_as("SELECT pg_terminate_backend($1)")
            .bind(pid)
            .fetch_one(&mut *conn)
            .await?;
        if ok {
            terminated += 1;
        }
    }

    info!("Terminated {} connection(s) to {}", terminated, db);
    Ok(terminated)
}

async fn fetch(conn: &mut PgConnection, query: Query<'_, Postgres, PgArguments>) -> Result<QueryResult> {
    let start = Instant::now();
    let rows = query.fetch_all(&mut *conn).await?;

    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    let rows = rows.iter().map(row_to_json).collect::<Result<Vec<_>>>()?;

    let execution_time_ms = start.elapsed().as_millis() as u64;
    debug!("Fetched {} rows in {}ms", rows.len(), execution_time_ms);

    Ok(QueryResult {
        columns,
        rows,
        execution_time_ms,
    })
}

fn row_to_json(row: &PgRow) -> Result<Map<String, Value>> {
    let mut obj = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let is_null = row.try_get_raw(idx)?.is_null();
        let value = if is_null {
            Value::Null
        } else {
            decode_column(row, idx, column.name(), column.type_info().name())?
        };
        obj.insert(column.name().to_string(), value);
    }
    Ok(obj)
}

fn decode_column(row: &PgRow, idx: usize, column: &str, type_name: &str) -> Result<Value> {
    let value = match type_name {
        "BOOL" => Value::Bool(row.try_get::<bool, _>(idx)?),
        "INT2" => Value::from(row.try_get::<i16, _>(idx)?),
        "INT4" => Value::from(row.try_get::<i32, _>(idx)?),
        "INT8" => Value::from(row.try_get::<i64, _>(idx)?),
        "OID" => Value::from(row.try_get::<sqlx::postgres::types::Oid, _>(idx)?.0),
        "FLOAT4" => float_value(row.try_get::<f32, _>(idx)? as f64),
        "FLOAT8" => float_value(row.try_get::<f64, _>(idx)?),
        "NUMERIC" => decimal_value(row.try_get::<Decimal, _>(idx)?),
        "TEXT" | "VARCHAR" | "NAME" | "BPCHAR" | "CHAR" | "UNKNOWN" => {
            Value::String(row.try_get::<String, _>(idx)?)
        }
        "DATE" => Value::String(row.try_get::<NaiveDate, _>(idx)?.to_string()),
        "TIME" => Value::String(row.try_get::<NaiveTime, _>(idx)?.to_string()),
        "TIMESTAMP" => Value::String(row.try_get::<NaiveDateTime, _>(idx)?.to_string()),
        "TIMESTAMPTZ" => Value::String(row.try_get::<DateTime<Utc>, _>(idx)?.to_rfc3339()),
        "UUID" => Value::String(row.try_get::<uuid::Uuid, _>(idx)?.to_string()),
        "JSON" | "JSONB" => row.try_get::<Value, _>(idx)?,
        "BOOL[]" => array_value(row.try_get::<Vec<Option<bool>>, _>(idx)?, Value::Bool),
        "INT2[]" => array_value(row.try_get::<Vec<Option<i16>>, _>(idx)?, Value::from),
        "INT4[]" => array_value(row.try_get::<Vec<Option<i32>>, _>(idx)?, Value::from),
        "INT8[]" => array_value(row.try_get::<Vec<Option<i64>>, _>(idx)?, Value::from),
        "FLOAT8[]" => array_value(row.try_get::<Vec<Option<f64>>, _>(idx)?, float_value),
        "NUMERIC[]" => array_value(row.try_get::<Vec<Option<Decimal>>, _>(idx)?, decimal_value),
        "TEXT[]" | "VARCHAR[]" | "NAME[]" | "BPCHAR[]" => {
            array_value(row.try_get::<Vec<Option<String>>, _>(idx)?, Value::String)
        }
        other => {
            let raw = row.try_get_raw(idx)?;
            let text = match raw.format() {
                PgValueFormat::Text => raw.as_str().ok().map(str::to_string),
                PgValueFormat::Binary => raw.as_bytes().ok().and_then(printable_text),
            };
            match text {
                Some(text) => {
                    debug!("Column {} ({}) decoded as text", column, other);
                    Value::String(text)
                }
                None => {
                    return Err(TabulatorError::UnsupportedColumnType {
                        column: column.to_string(),
                        type_name: other.to_string(),
                    })
                }
            }
        }
    };
    Ok(value)
}

/// Whole decimals that fit become integers, the rest floats.
fn decimal_value(d: Decimal) -> Value {
    if d.fract().is_zero() {
        if let Some(i) = d.to_i64() {
            return Value::from(i);
        }
    }
    match d.to_f64() {
        Some(f) => float_value(f),
        None => Value::String(d.to_string()),
    }
}

fn array_value<T>(items: Vec<Option<T>>, f: impl Fn(T) -> Value) -> Value {
    Value::Array(items.into_iter().map(|item| item.map(&f).unwrap_or(Value::Null)).collect())
}

/// Binary payloads that are printable UTF-8 (enum labels, citext, xml).
fn printable_text(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?;
    text.chars()
        .all(|c| !c.is_control() || c.is_whitespace())
        .then(|| text.to_string())
}

fn float_value(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> QueryResult {
        let rows = vec![
            json!({"tablename": "movie", "tableowner": "test", "rows": 10}),
            json!({"tablename": "book", "tableowner": "admin", "rows": null}),
        ];
        QueryResult {
            columns: vec!["tablename".to_string(), "tableowner".to_string(), "rows".to_string()],
            rows: rows
                .into_iter()
                .map(|v| v.as_object().cloned().unwrap())
                .collect(),
            execution_time_ms: 3,
        }
    }

    #[test]
    fn test_column_access() {
        let result = sample();
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.column("tablename"), vec![&json!("movie"), &json!("book")]);
        assert_eq!(result.column("missing"), vec![&Value::Null, &Value::Null]);
    }

    #[test]
    fn test_into_records_feeds_reshaper() {
        let records = sample().into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["tablename"], json!("movie"));
    }

    #[test]
    fn test_to_dataframe_keeps_column_order() {
        let df = sample().to_dataframe().unwrap();
        assert_eq!(df.get_column_names(), vec!["tablename", "tableowner", "rows"]);
        let counts = df.column("rows").unwrap().i64().unwrap();
        assert_eq!(counts.get(0), Some(10));
        assert_eq!(counts.get(1), None);
    }

    #[test]
    fn test_empty_result_to_dataframe() {
        let df = QueryResult::default().to_dataframe().unwrap();
        assert_eq!(df.shape(), (0, 0));
    }

    #[test]
    fn test_decimal_value() {
        assert_eq!(decimal_value(Decimal::new(42, 0)), json!(42));
        assert_eq!(decimal_value(Decimal::new(4200, 2)), json!(42));
        assert_eq!(decimal_value(Decimal::new(1225, 2)), json!(12.25));
        assert_eq!(decimal_value(Decimal::new(-5, 1)), json!(-0.5));
    }

    #[test]
    fn test_array_value_keeps_nulls() {
        let genres = vec![Some("Drama".to_string()), None, Some("Comedy".to_string())];
        assert_eq!(array_value(genres, Value::String), json!(["Drama", null, "Comedy"]));
        assert_eq!(array_value(vec![Some(1i32), Some(2)], Value::from), json!([1, 2]));
        assert_eq!(array_value(Vec::<Option<i64>>::new(), Value::from), json!([]));
    }

    #[test]
    fn test_printable_text_fallback() {
        assert_eq!(printable_text(b"happy"), Some("happy".to_string()));
        assert_eq!(printable_text(b"line one\nline two"), Some("line one\nline two".to_string()));
        assert_eq!(printable_text(&[0x00, 0x01, 0x02, 0x03]), None);
        assert_eq!(printable_text(&[0xff, 0xfe]), None);
    }
}
