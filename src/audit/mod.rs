//! Audit Tracker: run → table-entry log in `etl_run` / `etl_table_log`.
//!
//! Audit rows are written outside any data transaction, so they commit
//! eagerly. Both guards close themselves as `failed` when dropped open.

pub mod status;

use chrono::{NaiveDateTime, Utc};
use serde_json::Value as Json;
use tracing::{debug, error, info, warn};

use crate::error::{LoadError, Result};
use crate::store::{Store, Value};

pub use status::Status;

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn drop_reason() -> &'static str {
    if std::thread::panicking() {
        "aborted by panic"
    } else {
        "dropped before completion"
    }
}

/// Entry point for opening runs against one store.
pub struct AuditTracker<'s, S: Store + ?Sized> {
    store: &'s S,
}

impl<'s, S: Store + ?Sized> AuditTracker<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Insert a `running` run row and return its guard.
    pub fn start_run(&self, operation_kind: &str, year: Option<i32>, metadata: &Json) -> Result<RunGuard<'s, S>> {
        let out = self.store.query(
            "INSERT INTO etl_run (operation_kind, year, status, metadata, started_at)
             VALUES (?, ?, ?, ?, ?) RETURNING id",
            &[
                operation_kind.into(),
                year.into(),
                Status::Running.as_str().into(),
                metadata.to_string().into(),
                now().into(),
            ],
        )?;
        let id = out
            .scalar()
            .and_then(Value::as_i64)
            .ok_or_else(|| LoadError::Persistence("etl_run insert returned no id".into()))?;
        info!(run_id = id, operation_kind, ?year, "run started");
        Ok(RunGuard {
            store: self.store,
            id,
            open: true,
        })
    }

    pub fn run_status(&self, run_id: i64) -> Result<Option<Status>> {
        let out = self
            .store
            .query("SELECT status FROM etl_run WHERE id = ?", &[run_id.into()])?;
        Ok(out.scalar().and_then(Value::as_str).and_then(Status::from_str))
    }

    pub fn entries(&self, run_id: i64) -> Result<Vec<TableLog>> {
        let out = self.store.query(
            "SELECT table_name, source_table, operation_kind, status, rows_affected, error
             FROM etl_table_log WHERE run_id = ? ORDER BY id",
            &[run_id.into()],
        )?;
        Ok(out
            .rows
            .into_iter()
            .map(|r| TableLog {
                table_name: r[0].as_str().unwrap_or_default().to_string(),
                source_table: r[1].as_str().map(str::to_string),
                operation_kind: r[2].as_str().unwrap_or_default().to_string(),
                status: r[3].as_str().and_then(Status::from_str).unwrap_or(Status::Running),
                rows_affected: r[4].as_i64(),
                error: r[5].as_str().map(str::to_string),
            })
            .collect())
    }
}

/// One `etl_table_log` row, as read back.
#[derive(Debug, Clone, PartialEq)]
pub struct TableLog {
    pub table_name: String,
    pub source_table: Option<String>,
    pub operation_kind: String,
    pub status: Status,
    pub rows_affected: Option<i64>,
    pub error: Option<String>,
}

/// An open `etl_run` row.
pub struct RunGuard<'s, S: Store + ?Sized> {
    store: &'s S,
    id: i64,
    open: bool,
}

impl<'s, S: Store + ?Sized> RunGuard<'s, S> {
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Open a `running` table entry under this run.
    pub fn begin_table(
        &self,
        table_name: &str,
        source_table: Option<&str>,
        operation_kind: &str,
    ) -> Result<TableEntry<'s, S>> {
        let out = self.store.query(
            "INSERT INTO etl_table_log
                 (run_id, table_name, source_table, operation_kind, status, started_at)
             VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
            &[
                self.id.into(),
                table_name.into(),
                source_table.into(),
                operation_kind.into(),
                Status::Running.as_str().into(),
                now().into(),
            ],
        )?;
        let id = out
            .scalar()
            .and_then(Value::as_i64)
            .ok_or_else(|| LoadError::Persistence("etl_table_log insert returned no id".into()))?;
        debug!(run_id = self.id, entry_id = id, table_name, "table entry started");
        Ok(TableEntry {
            store: self.store,
            id,
            table_name: table_name.to_string(),
            open: true,
        })
    }

    /// Run `work`, closing a fresh table entry with its outcome. The work's
    /// error is returned after the entry is marked failed.
    pub fn track<F>(&self, table_name: &str, source_table: Option<&str>, operation_kind: &str, work: F) -> Result<usize>
    where
        F: FnOnce() -> Result<usize>,
    {
        let entry = self.begin_table(table_name, source_table, operation_kind)?;
        match work() {
            Ok(rows) => {
                entry.complete(rows)?;
                Ok(rows)
            }
            Err(e) => {
                entry.fail(&e.to_string())?;
                Err(e)
            }
        }
    }

    /// If the update fails the guard stays open, and dropping it retries
    /// as `failed`.
    pub fn complete(mut self) -> Result<()> {
        self.close(Status::Completed, None)?;
        self.open = false;
        Ok(())
    }

    pub fn fail(mut self, error: &str) -> Result<()> {
        self.close(Status::Failed, Some(error))?;
        self.open = false;
        Ok(())
    }

    fn close(&self, status: Status, error: Option<&str>) -> Result<()> {
        self.store.execute(
            "UPDATE etl_run SET status = ?, completed_at = ?, error = ? WHERE id = ?",
            &[status.as_str().into(), now().into(), error.into(), self.id.into()],
        )?;
        info!(run_id = self.id, status = status.as_str(), "run finished");
        Ok(())
    }
}

impl<S: Store + ?Sized> Drop for RunGuard<'_, S> {
    fn drop(&mut self) {
        if self.open {
            warn!(run_id = self.id, "run closed implicitly");
            if let Err(e) = self.close(Status::Failed, Some(drop_reason())) {
                error!(run_id = self.id, error = %e, "could not close run");
            }
        }
    }
}

/// An open `etl_table_log` row.
pub struct TableEntry<'s, S: Store + ?Sized> {
    store: &'s S,
    id: i64,
    table_name: String,
    open: bool,
}

impl<S: Store + ?Sized> TableEntry<'_, S> {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn complete(mut self, rows_affected: usize) -> Result<()> {
        self.close(Status::Completed, Some(rows_affected as i64), None)?;
        self.open = false;
        Ok(())
    }

    pub fn fail(mut self, error: &str) -> Result<()> {
        self.close(Status::Failed, None, Some(error))?;
        self.open = false;
        Ok(())
    }

    fn close(&self, status: Status, rows: Option<i64>, error: Option<&str>) -> Result<()> {
        self.store.execute(
            "UPDATE etl_table_log
             SET status = ?, rows_affected = ?, completed_at = ?, error = ?
             WHERE id = ?",
            &[status.as_str().into(), rows.into(), now().into(), error.into(), self.id.into()],
        )?;
        debug!(entry_id = self.id, table_name = %self.table_name, status = status.as_str(), ?rows, "table entry closed");
        Ok(())
    }
}

impl<S: Store + ?Sized> Drop for TableEntry<'_, S> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.close(Status::Failed, None, Some(drop_reason())) {
                error!(entry_id = self.id, error = %e, "could not close table entry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{init_schema, testutil::FaultyStore, DuckStore, Transaction};
    use serde_json::json;
    use std::cell::Cell;

    fn store() -> DuckStore {
        let store = DuckStore::open_in_memory().unwrap();
        init_schema(&store).unwrap();
        store
    }

    #[test]
    fn completed_entry_inside_failed_run() -> anyhow::Result<()> {
        let store = store();
        let audit = AuditTracker::new(&store);
        let run = audit.start_run("transform", Some(2023), &json!({"year": 2023}))?;
        let run_id = run.id();

        run.begin_table("institution", Some("hd2023"), "upsert")?.complete(12)?;
        run.begin_table("survey_fact", Some("adm2023"), "upsert")?
            .fail("field `applicants` unresolved")?;
        run.fail("1 survey failed")?;

        assert_eq!(audit.run_status(run_id)?, Some(Status::Failed));
        let entries = audit.entries(run_id)?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, Status::Completed);
        assert_eq!(entries[0].rows_affected, Some(12));
        assert_eq!(entries[1].status, Status::Failed);
        assert!(entries[1].error.as_deref().unwrap().contains("applicants"));
        Ok(())
    }

    #[test]
    fn dropped_guards_close_as_failed() -> anyhow::Result<()> {
        let store = store();
        let audit = AuditTracker::new(&store);
        let run_id = {
            let run = audit.start_run("transform", Some(1999), &json!({}))?;
            let _entry = run.begin_table("survey_fact", None, "upsert")?;
            run.id()
        };
        assert_eq!(audit.run_status(run_id)?, Some(Status::Failed));
        let entries = audit.entries(run_id)?;
        assert_eq!(entries[0].status, Status::Failed);
        assert_eq!(entries[0].error.as_deref(), Some("dropped before completion"));
        Ok(())
    }

    #[test]
    fn entry_survives_rolled_back_data_write() -> anyhow::Result<()> {
        let store = store();
        let audit = AuditTracker::new(&store);
        let run = audit.start_run("transform", Some(2020), &json!({}))?;
        let result = run.track("institution", Some("hd2020"), "upsert", || {
            let tx = Transaction::begin(&store)?;
            tx.store().execute(
                "INSERT INTO institution (unitid, name) VALUES (?, ?)",
                &[Value::Int(1), "A".into()],
            )?;
            Err(LoadError::Persistence("constraint violated".into()))
        });
        assert!(result.is_err());
        run.complete()?;

        let n = store.query("SELECT count(*) FROM institution", &[])?;
        assert_eq!(n.scalar().and_then(Value::as_i64), Some(0));
        let open = store.query("SELECT count(*) FROM etl_table_log WHERE status = 'running'", &[])?;
        assert_eq!(open.scalar().and_then(Value::as_i64), Some(0));
        Ok(())
    }

    #[test]
    fn failed_status_update_is_retried_on_drop() -> anyhow::Result<()> {
        // the first close of each kind fails; the retry from drop goes through
        let seen = Cell::new((false, false));
        let store = FaultyStore::new(move |sql, params| {
            let (entry_done, run_done) = seen.get();
            let completing = params.first() == Some(&Value::from("completed"));
            if sql.starts_with("UPDATE etl_table_log") && completing && !entry_done {
                seen.set((true, run_done));
                return true;
            }
            if sql.starts_with("UPDATE etl_run") && completing && !run_done {
                seen.set((entry_done, true));
                return true;
            }
            false
        })?;
        let audit = AuditTracker::new(&store);
        let run = audit.start_run("transform", Some(2010), &json!({}))?;
        let run_id = run.id();

        let entry = run.begin_table("survey_fact", Some("efa2010"), "upsert")?;
        assert!(entry.complete(5).is_err());
        assert!(run.complete().is_err());

        assert_eq!(audit.run_status(run_id)?, Some(Status::Failed));
        let entries = audit.entries(run_id)?;
        assert_eq!(entries[0].status, Status::Failed);
        assert_eq!(entries[0].error.as_deref(), Some("dropped before completion"));
        Ok(())
    }

    #[test]
    fn panicking_work_still_closes_the_entry() -> anyhow::Result<()> {
        let store = store();
        let audit = AuditTracker::new(&store);
        let run = audit.start_run("transform", Some(2001), &json!({}))?;
        let run_id = run.id();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _entry = run.begin_table("survey_fact", None, "upsert").unwrap();
            panic!("boom");
        }));
        assert!(outcome.is_err());
        run.complete()?;
        let entries = audit.entries(run_id)?;
        assert_eq!(entries[0].status, Status::Failed);
        assert_eq!(entries[0].error.as_deref(), Some("aborted by panic"));
        Ok(())
    }
}
