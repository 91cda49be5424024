//! Raw staging: copy each survey's archive, as-is, into an all-`VARCHAR`
//! table named for the survey and year.

use serde_json::json;
use std::collections::HashSet;
use tracing::{error, info, instrument, warn};

use super::catalog::{quote_ident, ArchiveDirectory, SourceCatalog};
use super::summary::{Outcome, SurveyReport, YearSummary};
use super::surveys::Survey;
use super::Orchestrator;
use crate::archive::SourceTable;
use crate::audit::{AuditTracker, RunGuard, Status};
use crate::error::{LoadError, Result};
use crate::store::{Store, Transaction, Value};

/// Header names made unique (`line`, `line_2`, ...) and never blank.
fn column_names(headers: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let base = if h.is_empty() { format!("column_{}", i + 1) } else { h.clone() };
            let mut name = base.clone();
            let mut n = 1;
            while !seen.insert(name.clone()) {
                n += 1;
                name = format!("{base}_{n}");
            }
            name
        })
        .collect()
}

/// Replace `target` with the table's rows. Returns rows inserted.
pub fn stage_table<S: Store + ?Sized>(store: &S, target: &str, table: &SourceTable) -> Result<usize> {
    let columns = column_names(&table.headers);
    if columns.is_empty() {
        return Err(LoadError::archive(&table.name, "no header row"));
    }
    let defs: Vec<String> = columns
        .iter()
        .map(|c| format!("{} VARCHAR", quote_ident(c)))
        .collect();
    let target_q = quote_ident(target);

    let tx = Transaction::begin(store)?;
    let s = tx.store();
    s.execute_batch(&format!(
        "DROP TABLE IF EXISTS {target_q}; CREATE TABLE {target_q} ({});",
        defs.join(", ")
    ))?;
    let rows: Vec<Vec<Value>> = table
        .rows
        .iter()
        .map(|row| {
            (0..columns.len())
                .map(|i| match row.get(i) {
                    Some(cell) if !cell.is_empty() => Value::Text(cell.clone()),
                    _ => Value::Null,
                })
                .collect()
        })
        .collect();
    let n = s.append(target, &rows)?;
    tx.commit()?;
    Ok(n)
}

impl<'s, S: Store + ?Sized> Orchestrator<'s, S> {
    /// Stage every survey archive present for `year` under an audit run.
    /// A bad archive fails its own survey only.
    #[instrument(level = "info", skip(self, archives), fields(root = %archives.root().display()))]
    pub fn stage_year(&self, archives: &mut ArchiveDirectory, year: i32) -> Result<YearSummary> {
        let audit = AuditTracker::new(self.store());
        let metadata = json!({
            "source": "NCES IPEDS",
            "year": year,
            "stage": "raw_load",
            "catalog": archives.describe(),
        });
        let run = audit.start_run("raw_load", Some(year), &metadata)?;
        let run_id = run.id();

        let reports: Vec<SurveyReport> = self
            .surveys()
            .iter()
            .map(|survey| self.stage_survey(&run, archives, survey.as_ref(), year))
            .collect();

        let failed: Vec<&str> = reports
            .iter()
            .filter(|r| r.status == Outcome::Failed)
            .map(|r| r.survey.as_str())
            .collect();
        let run_status = if failed.is_empty() {
            run.complete()?;
            Status::Completed
        } else {
            run.fail(&format!("{} survey(s) failed: {}", failed.len(), failed.join(", ")))?;
            Status::Failed
        };
        Ok(YearSummary {
            year,
            operation: "raw_load".into(),
            run_id,
            run_status,
            surveys: reports,
        })
    }

    fn stage_survey(
        &self,
        run: &RunGuard<'s, S>,
        archives: &mut ArchiveDirectory,
        survey: &dyn Survey,
        year: i32,
    ) -> SurveyReport {
        let name = survey.name();
        let located = match archives.locate(survey, year) {
            Ok(Some(l)) => l,
            Ok(None) => return SurveyReport::skipped(name),
            Err(e) => {
                warn!(survey = name, year, error = %e, "archive lookup failed");
                return SurveyReport::failed(name, None, e);
            }
        };
        let Some(target) = survey.tables(year).into_iter().next() else {
            return SurveyReport::skipped(name);
        };
        let entry = match run.begin_table(&target, Some(&located), "load") {
            Ok(entry) => entry,
            Err(e) => {
                warn!(survey = name, table = %target, error = %e, "could not open table entry");
                return SurveyReport::failed(name, Some(&located), e);
            }
        };

        let staged = archives
            .read(&located)
            .and_then(|t| stage_table(self.store(), &target, &t));
        match staged {
            Ok(rows) => match entry.complete(rows) {
                Ok(()) => {
                    info!(survey = name, table = %target, rows, "staged");
                    SurveyReport::loaded(name, &located, rows)
                }
                Err(e) => {
                    warn!(survey = name, table = %target, error = %e, "could not close table entry");
                    SurveyReport::failed(name, Some(&located), e)
                }
            },
            Err(LoadError::SourceAbsent(what)) => {
                info!(survey = name, year, source = %what, "archive vanished; skipped");
                if let Err(e) = entry.complete(0) {
                    warn!(survey = name, error = %e, "could not close table entry");
                }
                SurveyReport::skipped(name)
            }
            Err(e) => {
                error!(survey = name, source = %located, error = %e, "staging failed");
                if let Err(close) = entry.fail(&e.to_string()) {
                    warn!(survey = name, error = %close, "could not close table entry");
                }
                SurveyReport::failed(name, Some(&located), e)
            }
        }
    }
}
