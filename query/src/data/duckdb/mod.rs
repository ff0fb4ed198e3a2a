//! DuckDB executor
//!
//! Local analytics backend. Uses a single shared connection protected by a
//! mutex; queries run on the blocking pool under a timeout.

pub mod schema;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat};
use duckdb::types::{TimeUnit, Value as DbValue};
use duckdb::{Connection, params_from_iter};
use parking_lot::Mutex;
use serde_json::Value;

use super::error::DataError;
use super::traits::{ExecuteOptions, QueryExecutor, Row, ensure_backend};
use crate::compiler::CompiledQuery;
use crate::sql::{Backend, ParamValue};
use crate::views::SchemaVersion;

const BACKEND: &str = "duckdb";

/// Days between 0001-01-01 and 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub struct DuckdbExecutor {
    conn: Arc<Mutex<Connection>>,
}

impl DuckdbExecutor {
    /// Open (or create) a database file and apply both layouts
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(&schema::full_schema())?;
        tracing::debug!(path = %path.as_ref().display(), "DuckDB executor initialized");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, DataError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&schema::full_schema())?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Re-apply the DDL for one layout (idempotent)
    pub fn apply_schema(&self, version: SchemaVersion) -> Result<(), DataError> {
        self.conn.lock().execute_batch(&schema::schema_for(version))?;
        Ok(())
    }

    /// Run raw statements, used for seeding
    pub fn execute_batch(&self, sql: &str) -> Result<(), DataError> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }
}

#[async_trait]
impl QueryExecutor for DuckdbExecutor {
    fn backend(&self) -> Backend {
        Backend::Duckdb
    }

    async fn execute(
        &self,
        query: &CompiledQuery,
        options: &ExecuteOptions,
    ) -> Result<Vec<Row>, DataError> {
        ensure_backend(Backend::Duckdb, query)?;

        let conn = Arc::clone(&self.conn);
        let sql = query.sql.clone();
        let columns = query.columns.clone();
        let values: Vec<DbValue> = query.ordered_params().into_iter().map(to_db_value).collect();

        let task = tokio::task::spawn_blocking(move || run(&conn, &sql, values, &columns));
        let rows = tokio::time::timeout(options.timeout, task)
            .await
            .map_err(|_| {
                tracing::warn!(
                    view = %query.view,
                    "DuckDB query timed out after {}s",
                    options.timeout.as_secs()
                );
                DataError::timeout(BACKEND, options.timeout.as_secs())
            })?
            .map_err(|e| {
                tracing::error!(error = %e, "DuckDB query task failed");
                DataError::join(BACKEND, e)
            })??;

        tracing::debug!(
            view = %query.view,
            sql_len = query.sql.len(),
            params = query.params.len(),
            rows = rows.len(),
            "DuckDB query completed"
        );
        Ok(rows)
    }
}

fn run(
    conn: &Mutex<Connection>,
    sql: &str,
    values: Vec<DbValue>,
    columns: &[String],
) -> Result<Vec<Row>, DataError> {
    let conn = conn.lock();
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(values))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (idx, name) in columns.iter().enumerate() {
            let cell: DbValue = row.get(idx)?;
            record.insert(name.clone(), to_json(cell));
        }
        out.push(record);
    }
    Ok(out)
}

fn to_db_value(value: &ParamValue) -> DbValue {
    match value {
        ParamValue::String(s) => DbValue::Text(s.clone()),
        ParamValue::Int(i) => DbValue::BigInt(*i),
        ParamValue::Float(f) => DbValue::Double(*f),
        ParamValue::Bool(b) => DbValue::Boolean(*b),
        ParamValue::DateTime(dt) => DbValue::Timestamp(TimeUnit::Microsecond, dt.timestamp_micros()),
    }
}

fn float(f: f64) -> Value {
    serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)
}

fn to_json(value: DbValue) -> Value {
    match value {
        DbValue::Null => Value::Null,
        DbValue::Boolean(b) => Value::Bool(b),
        DbValue::TinyInt(i) => i.into(),
        DbValue::SmallInt(i) => i.into(),
        DbValue::Int(i) => i.into(),
        DbValue::BigInt(i) => i.into(),
        DbValue::HugeInt(i) => i64::try_from(i).map_or_else(|_| float(i as f64), Value::from),
        DbValue::UTinyInt(i) => i.into(),
        DbValue::USmallInt(i) => i.into(),
        DbValue::UInt(i) => i.into(),
        DbValue::UBigInt(i) => i.into(),
        DbValue::Float(f) => float(f64::from(f)),
        DbValue::Double(f) => float(f),
        DbValue::Decimal(d) => d.to_string().parse::<f64>().map_or(Value::Null, float),
        DbValue::Text(s) | DbValue::Enum(s) => Value::String(s),
        DbValue::Timestamp(unit, raw) => DateTime::from_timestamp_micros(unit.to_micros(raw))
            .map_or(Value::Null, |dt| {
                Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            }),
        DbValue::Date32(days) => NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
            .map_or(Value::Null, |d| Value::String(d.to_string())),
        DbValue::List(items) | DbValue::Array(items) => {
            Value::Array(items.into_iter().map(to_json).collect())
        }
        DbValue::Map(map) => Value::Object(
            map.keys()
                .zip(map.values())
                .map(|(k, v)| {
                    let key = match to_json(k.clone()) {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (key, to_json(v.clone()))
                })
                .collect(),
        ),
        DbValue::Struct(fields) => Value::Object(
            fields
                .keys()
                .zip(fields.values())
                .map(|(k, v)| (k.clone(), to_json(v.clone())))
                .collect(),
        ),
        other => Value::String(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::compiler::{DeclarativeQuery, QueryCompiler};
    use crate::scope::ProjectScope;
    use crate::views::{Aggregation, ViewRegistry};

    fn seeded() -> DuckdbExecutor {
        let executor = DuckdbExecutor::in_memory().unwrap();
        executor
            .execute_batch(
                "INSERT INTO traces (project_id, id, timestamp, name) VALUES
                    ('p1', 't1', TIMESTAMP '2024-01-01 10:00:00', 'chat'),
                    ('p1', 't2', TIMESTAMP '2024-01-01 11:00:00', 'chat'),
                    ('p1', 't3', TIMESTAMP '2024-01-01 12:00:00', 'search'),
                    ('p2', 't4', TIMESTAMP '2024-01-01 12:00:00', 'chat');",
            )
            .unwrap();
        executor
    }

    fn compile(backend: Backend) -> CompiledQuery {
        let q = DeclarativeQuery::new(
            "traces",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        )
        .dimension("name")
        .metric("count", Aggregation::Count);
        QueryCompiler::new(Arc::new(ViewRegistry::builtin()), backend)
            .build(&q, &ProjectScope::new("p1"), SchemaVersion::V1, false)
            .unwrap()
    }

    #[tokio::test]
    async fn test_execute_binds_params_in_order() {
        let executor = seeded();
        let rows = executor
            .execute(&compile(Backend::Duckdb), &ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "chat");
        assert_eq!(rows[0]["count_count"], 2);
        assert_eq!(rows[1]["name"], "search");
        assert_eq!(rows[1]["count_count"], 1);
    }

    #[tokio::test]
    async fn test_rejects_other_dialect() {
        let executor = seeded();
        let err = executor
            .execute(
                &compile(Backend::Clickhouse),
                &ExecuteOptions::with_timeout(Duration::from_secs(5)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::BackendMismatch { .. }));
    }

    #[test]
    fn test_timestamp_to_json() {
        let micros = Utc
            .with_ymd_and_hms(2024, 1, 1, 10, 0, 0)
            .unwrap()
            .timestamp_micros();
        assert_eq!(
            to_json(DbValue::Timestamp(TimeUnit::Microsecond, micros)),
            Value::String("2024-01-01T10:00:00.000Z".into())
        );
        assert_eq!(
            to_json(DbValue::Date32(0)),
            Value::String("1970-01-01".into())
        );
    }
}
