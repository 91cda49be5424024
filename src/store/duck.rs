use chrono::{DateTime, NaiveDateTime};
use duckdb::{
    params_from_iter,
    types::{TimeUnit, Value as DuckValue},
    Connection, ToSql,
};
use std::path::Path;
use tracing::debug;

use super::{QueryResult, Store, Value};
use crate::error::Result;

/// DuckDB-backed [`Store`] owning one connection.
pub struct DuckStore {
    conn: Connection,
}

impl DuckStore {
    /// Open a DuckDB database on disk at `path`, creating the file if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened duckdb");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }
}

fn to_duck(v: &Value) -> DuckValue {
    match v {
        Value::Null => DuckValue::Null,
        Value::Int(i) => DuckValue::BigInt(*i),
        Value::Float(f) => DuckValue::Double(*f),
        Value::Text(s) => DuckValue::Text(s.clone()),
        Value::Bool(b) => DuckValue::Boolean(*b),
        Value::Timestamp(t) => {
            DuckValue::Timestamp(TimeUnit::Microsecond, t.and_utc().timestamp_micros())
        }
    }
}

fn micros_to_naive(micros: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_micros(micros).map(|dt| dt.naive_utc())
}

fn from_duck(v: DuckValue) -> Value {
    match v {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => Value::Int(i as i64),
        DuckValue::SmallInt(i) => Value::Int(i as i64),
        DuckValue::Int(i) => Value::Int(i as i64),
        DuckValue::BigInt(i) => Value::Int(i),
        DuckValue::UTinyInt(i) => Value::Int(i as i64),
        DuckValue::USmallInt(i) => Value::Int(i as i64),
        DuckValue::UInt(i) => Value::Int(i as i64),
        DuckValue::UBigInt(i) => Value::Int(i as i64),
        DuckValue::Float(f) => Value::Float(f as f64),
        DuckValue::Double(f) => Value::Float(f),
        DuckValue::Text(s) => Value::Text(s),
        DuckValue::Timestamp(unit, raw) => {
            let micros = match unit {
                TimeUnit::Second => raw.saturating_mul(1_000_000),
                TimeUnit::Millisecond => raw.saturating_mul(1_000),
                TimeUnit::Microsecond => raw,
                TimeUnit::Nanosecond => raw / 1_000,
            };
            micros_to_naive(micros).map(Value::Timestamp).unwrap_or(Value::Null)
        }
        other => Value::Text(format!("{other:?}")),
    }
}

impl Store for DuckStore {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let n = stmt.execute(params_from_iter(params.iter().map(to_duck)))?;
        Ok(n)
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter().map(to_duck)))?;
        let columns: Vec<String> = rows
            .as_ref()
            .map(|s| s.column_names())
            .unwrap_or_default();

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                cells.push(from_duck(row.get::<_, DuckValue>(i)?));
            }
            out.push(cells);
        }
        Ok(QueryResult { columns, rows: out })
    }

    fn begin(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN TRANSACTION;")?;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT;")?;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK;")?;
        Ok(())
    }

    fn append(&self, table: &str, rows: &[Vec<Value>]) -> Result<usize> {
        let mut appender = self.conn.appender(table)?;
        for row in rows {
            let values: Vec<DuckValue> = row.iter().map(to_duck).collect();
            let params: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
            appender.append_row(params.as_slice())?;
        }
        appender.flush()?;
        debug!(table, rows = rows.len(), "appended");
        Ok(rows.len())
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT count(*) FROM information_schema.tables WHERE lower(table_name) = lower(?)",
            [name],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn table_lookup_is_case_insensitive() -> anyhow::Result<()> {
        let store = DuckStore::open_in_memory()?;
        assert!(!store.table_exists("hd2023")?);
        store.execute_batch("CREATE TABLE HD2023 (unitid VARCHAR);")?;
        assert!(store.table_exists("hd2023")?);
        Ok(())
    }

    #[test]
    fn appender_writes_rows_in_column_order() -> anyhow::Result<()> {
        let store = DuckStore::open_in_memory()?;
        store.execute_batch("CREATE TABLE ef1990a (unitid VARCHAR, line VARCHAR);")?;
        let rows = vec![
            vec![Value::from("1"), Value::from("29")],
            vec![Value::from("2"), Value::Null],
        ];
        assert_eq!(store.append("ef1990a", &rows)?, 2);
        assert_eq!(store.append("ef1990a", &[])?, 0);
        let out = store.query("SELECT unitid, line FROM ef1990a ORDER BY unitid", &[])?;
        assert_eq!(out.rows[0], vec![Value::Text("1".into()), Value::Text("29".into())]);
        assert!(out.rows[1][1].is_null());
        Ok(())
    }

    #[test]
    fn values_round_trip_through_duckdb() -> anyhow::Result<()> {
        let store = DuckStore::open_in_memory()?;
        store.execute_batch(
            "CREATE TABLE v (i BIGINT, f DOUBLE, t VARCHAR, b BOOLEAN, ts TIMESTAMP, n DOUBLE);",
        )?;
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        let n = store.execute(
            "INSERT INTO v VALUES (?, ?, ?, ?, ?, ?)",
            &[
                Value::Int(7),
                Value::Float(1.5),
                Value::from("x"),
                Value::Bool(true),
                Value::Timestamp(ts),
                Value::Null,
            ],
        )?;
        assert_eq!(n, 1);
        let out = store.query("SELECT * FROM v", &[])?;
        assert_eq!(out.columns, vec!["i", "f", "t", "b", "ts", "n"]);
        assert_eq!(
            out.rows[0],
            vec![
                Value::Int(7),
                Value::Float(1.5),
                Value::Text("x".into()),
                Value::Bool(true),
                Value::Timestamp(ts),
                Value::Null,
            ]
        );
        Ok(())
    }
}
