//! Transactional store contract and its DuckDB implementation.

pub mod duck;
pub mod schema;

use chrono::NaiveDateTime;
use std::fmt;
use tracing::warn;

use crate::error::Result;

pub use duck::DuckStore;
pub use schema::init_schema;

/// A bound parameter or a fetched cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Timestamp(t) => write!(f, "{t}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// First cell of the first row.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.first())
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Execute/fetch/commit/rollback over one exclusively owned connection.
pub trait Store {
    /// Rows affected.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize>;
    /// Several parameterless statements.
    fn execute_batch(&self, sql: &str) -> Result<()>;
    fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;
    fn begin(&self) -> Result<()>;
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;
    fn table_exists(&self, name: &str) -> Result<bool>;

    /// Bulk-append full rows, in column order, to an existing table.
    fn append(&self, table: &str, rows: &[Vec<Value>]) -> Result<usize> {
        let Some(width) = rows.first().map(Vec::len) else {
            return Ok(0);
        };
        let sql = format!("INSERT INTO {table} VALUES ({})", vec!["?"; width].join(", "));
        let mut n = 0;
        for row in rows {
            n += self.execute(&sql, row)?;
        }
        Ok(n)
    }
}

/// Open transaction; rolled back on drop unless committed.
pub struct Transaction<'s, S: Store + ?Sized> {
    store: &'s S,
    open: bool,
}

impl<'s, S: Store + ?Sized> Transaction<'s, S> {
    pub fn begin(store: &'s S) -> Result<Self> {
        store.begin()?;
        Ok(Self { store, open: true })
    }

    pub fn store(&self) -> &'s S {
        self.store
    }

    /// On failure the guard stays open and rolls back when dropped.
    pub fn commit(mut self) -> Result<()> {
        self.store.commit()?;
        self.open = false;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.open = false;
        self.store.rollback()
    }
}

impl<S: Store + ?Sized> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.store.rollback() {
                warn!(error = %e, "rollback on drop failed");
            }
        }
    }
}

/// `INSERT .. ON CONFLICT (key) DO UPDATE` over a fixed column list.
#[derive(Debug, Clone)]
pub struct Upsert {
    pub table: String,
    pub columns: Vec<String>,
    pub key: Vec<String>,
}

impl Upsert {
    pub fn new(table: &str, columns: &[&str], key: &[&str]) -> Self {
        Self {
            table: table.to_string(),
            columns: columns.iter().map(|s| s.to_string()).collect(),
            key: key.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn sql(&self) -> String {
        let placeholders = vec!["?"; self.columns.len()].join(", ");
        let updates: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !self.key.contains(c))
            .map(|c| format!("{c} = EXCLUDED.{c}"))
            .collect();
        let action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
            self.table,
            self.columns.join(", "),
            placeholders,
            self.key.join(", "),
            action
        )
    }

    /// Upsert every row; returns the summed affected count.
    pub fn execute<S: Store + ?Sized>(&self, store: &S, rows: &[Vec<Value>]) -> Result<usize> {
        let sql = self.sql();
        let mut affected = 0;
        for row in rows {
            affected += store.execute(&sql, row)?;
        }
        Ok(affected)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::error::LoadError;

    /// DuckDB store whose `execute` fails whenever `fault` says so.
    pub struct FaultyStore {
        pub inner: DuckStore,
        fault: Box<dyn Fn(&str, &[Value]) -> bool>,
    }

    impl FaultyStore {
        pub fn new(fault: impl Fn(&str, &[Value]) -> bool + 'static) -> Result<Self> {
            let inner = DuckStore::open_in_memory()?;
            init_schema(&inner)?;
            Ok(Self {
                inner,
                fault: Box::new(fault),
            })
        }
    }

    impl Store for FaultyStore {
        fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
            if (self.fault)(sql, params) {
                return Err(LoadError::Persistence(format!("injected failure: {sql}")));
            }
            self.inner.execute(sql, params)
        }
        fn execute_batch(&self, sql: &str) -> Result<()> {
            self.inner.execute_batch(sql)
        }
        fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
            self.inner.query(sql, params)
        }
        fn begin(&self) -> Result<()> {
            self.inner.begin()
        }
        fn commit(&self) -> Result<()> {
            self.inner.commit()
        }
        fn rollback(&self) -> Result<()> {
            self.inner.rollback()
        }
        fn table_exists(&self, name: &str) -> Result<bool> {
            self.inner.table_exists(name)
        }
    }
}
