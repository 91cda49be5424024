//! Load Orchestrator: discovery → extraction → normalization → upsert, per
//! survey and year, bracketed by the audit log.

pub mod catalog;
pub mod stage;
pub mod summary;
pub mod surveys;

use chrono::Utc;
use serde_json::json;
use std::collections::HashSet;
use tracing::{error, info, instrument, warn};

use crate::audit::{AuditTracker, RunGuard, Status};
use crate::error::{LoadError, Result};
use crate::resolve::AliasTable;
use crate::store::{init_schema, Store, Transaction, Upsert, Value};
use crate::unpivot::NormalizedFact;

pub use catalog::{ArchiveDirectory, SourceCatalog, StagedTables};
pub use summary::{Outcome, SurveyReport, YearSummary};
pub use surveys::{catalogue, Institution, Output, Survey};

const INSTITUTION_COLUMNS: &[&str] = &[
    "unitid", "name", "city", "state", "zip", "latitude", "longitude", "sector", "control",
    "level", "hbcu", "tribal", "updated_at",
];

const FACT_COLUMNS: &[&str] = &[
    "survey", "unitid", "year", "scope", "category", "subgroup", "metric", "value",
];

/// Drives every survey for a year against one store.
pub struct Orchestrator<'s, S: Store + ?Sized> {
    store: &'s S,
    aliases: AliasTable,
    surveys: Vec<Box<dyn Survey>>,
}

impl<'s, S: Store + ?Sized> Orchestrator<'s, S> {
    /// The full survey catalogue, schema created if missing.
    pub fn new(store: &'s S, aliases: AliasTable) -> Result<Self> {
        Self::with_surveys(store, aliases, catalogue()?)
    }

    pub fn with_surveys(store: &'s S, aliases: AliasTable, surveys: Vec<Box<dyn Survey>>) -> Result<Self> {
        init_schema(store)?;
        Ok(Self {
            store,
            aliases,
            surveys,
        })
    }

    pub fn store(&self) -> &'s S {
        self.store
    }

    pub fn surveys(&self) -> &[Box<dyn Survey>] {
        &self.surveys
    }

    /// Transform every survey for `year`. Survey failures are isolated and
    /// reported; only a failure to write the run itself is an error.
    #[instrument(level = "info", skip(self, catalog), fields(catalog = %catalog.describe()))]
    pub fn run_year<C: SourceCatalog + ?Sized>(&self, catalog: &mut C, year: i32) -> Result<YearSummary> {
        let audit = AuditTracker::new(self.store);
        let metadata = json!({
            "source": "NCES IPEDS",
            "year": year,
            "stage": "transform",
            "catalog": catalog.describe(),
        });
        let run = audit.start_run("transform", Some(year), &metadata)?;
        let run_id = run.id();

        let reports: Vec<SurveyReport> = self
            .surveys
            .iter()
            .map(|survey| self.run_survey(&run, catalog, survey.as_ref(), year))
            .collect();

        let run_status = finish_run(run, &reports)?;
        let summary = YearSummary {
            year,
            operation: "transform".into(),
            run_id,
            run_status,
            surveys: reports,
        };
        info!(year, rows = summary.total_rows(), status = run_status.as_str(), "year transformed");
        Ok(summary)
    }

    /// Years are independent; each gets its own run.
    pub fn run_all<C: SourceCatalog + ?Sized>(&self, catalog: &mut C, years: &[i32]) -> Result<Vec<YearSummary>> {
        years.iter().map(|&y| self.run_year(catalog, y)).collect()
    }

    fn run_survey<C: SourceCatalog + ?Sized>(
        &self,
        run: &RunGuard<'s, S>,
        catalog: &mut C,
        survey: &dyn Survey,
        year: i32,
    ) -> SurveyReport {
        let name = survey.name();
        let located = match catalog.locate(survey, year) {
            Ok(Some(l)) => l,
            Ok(None) => {
                info!(survey = name, year, "no source for year; skipped");
                return SurveyReport::skipped(name);
            }
            Err(e) => {
                error!(survey = name, year, error = %e, "source lookup failed");
                return SurveyReport::failed(name, None, e);
            }
        };

        let entry = match run.begin_table(name, Some(&located), "transform") {
            Ok(entry) => entry,
            Err(e) => return SurveyReport::failed(name, Some(&located), e),
        };

        match self.load_survey(catalog, survey, &located, year) {
            Ok(rows) => match entry.complete(rows) {
                Ok(()) => {
                    info!(survey = name, year, rows, "survey loaded");
                    SurveyReport::loaded(name, &located, rows)
                }
                Err(e) => SurveyReport::failed(name, Some(&located), e),
            },
            Err(LoadError::SourceAbsent(what)) => {
                info!(survey = name, year, source = %what, "source vanished; skipped");
                if let Err(e) = entry.complete(0) {
                    warn!(survey = name, error = %e, "could not close table entry");
                }
                SurveyReport::skipped(name)
            }
            Err(e) => {
                error!(survey = name, year, source = %located, error = %e, "survey failed");
                if let Err(close) = entry.fail(&e.to_string()) {
                    warn!(survey = name, error = %close, "could not close table entry");
                }
                SurveyReport::failed(name, Some(&located), e)
            }
        }
    }

    /// Extract, normalize and upsert one survey inside its own transaction.
    fn load_survey<C: SourceCatalog + ?Sized>(
        &self,
        catalog: &mut C,
        survey: &dyn Survey,
        located: &str,
        year: i32,
    ) -> Result<usize> {
        let table = catalog.read(located)?;
        let output = survey.transform(&table, year, &self.aliases)?;

        let tx = Transaction::begin(self.store)?;
        let rows = match output {
            Output::Institutions(v) => upsert_institutions(tx.store(), &v, year)?,
            Output::Facts(f) => upsert_facts(tx.store(), survey.name(), f, year)?,
        };
        tx.commit()?;
        Ok(rows)
    }
}

fn finish_run<S: Store + ?Sized>(run: RunGuard<'_, S>, reports: &[SurveyReport]) -> Result<Status> {
    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| r.status == Outcome::Failed)
        .map(|r| r.survey.as_str())
        .collect();
    if failed.is_empty() {
        run.complete()?;
        Ok(Status::Completed)
    } else {
        run.fail(&format!("{} survey(s) failed: {}", failed.len(), failed.join(", ")))?;
        Ok(Status::Failed)
    }
}

/// Upsert entities and record them in the year's roster. Returns the
/// institution rows affected.
fn upsert_institutions<S: Store + ?Sized>(store: &S, rows: &[Institution], year: i32) -> Result<usize> {
    let now = Utc::now().naive_utc();
    let values: Vec<Vec<Value>> = rows
        .iter()
        .map(|i| {
            vec![
                i.unitid.into(),
                i.name.as_str().into(),
                i.city.clone().into(),
                i.state.clone().into(),
                i.zip.clone().into(),
                i.latitude.into(),
                i.longitude.into(),
                i.sector.into(),
                i.control.into(),
                i.level.into(),
                i.hbcu.into(),
                i.tribal.into(),
                now.into(),
            ]
        })
        .collect();
    let n = Upsert::new("institution", INSTITUTION_COLUMNS, &["unitid"]).execute(store, &values)?;

    let roster: Vec<Vec<Value>> = rows
        .iter()
        .map(|i| vec![i.unitid.into(), year.into()])
        .collect();
    Upsert::new("institution_year", &["unitid", "year"], &["unitid", "year"]).execute(store, &roster)?;
    Ok(n)
}

/// Entities in the directory roster for `year`.
pub fn roster<S: Store + ?Sized>(store: &S, year: i32) -> Result<HashSet<i64>> {
    let out = store.query(
        "SELECT unitid FROM institution_year WHERE year = ?",
        &[year.into()],
    )?;
    Ok(out.rows.iter().filter_map(|r| r.first().and_then(Value::as_i64)).collect())
}

/// Gate facts on the roster, drop repeated keys, upsert the rest, then
/// retract facts of this survey and year that the source no longer reports.
fn upsert_facts<S: Store + ?Sized>(
    store: &S,
    survey: &str,
    facts: Vec<NormalizedFact>,
    year: i32,
) -> Result<usize> {
    let roster = roster(store, year)?;
    let produced = facts.len();

    let mut seen = HashSet::new();
    let mut outside = 0usize;
    let mut repeated = 0usize;
    let mut values = Vec::with_capacity(produced);
    for f in &facts {
        if !roster.contains(&f.entity_id) {
            outside += 1;
            continue;
        }
        if !seen.insert(f.key()) {
            repeated += 1;
            continue;
        }
        values.push(vec![
            survey.into(),
            f.entity_id.into(),
            f.year.into(),
            f.scope.as_str().into(),
            f.category.as_str().into(),
            f.subgroup.as_str().into(),
            f.metric.as_str().into(),
            f.value.into(),
        ]);
    }
    if repeated > 0 {
        warn!(survey, year, repeated, "repeated fact keys dropped");
    }
    info!(survey, year, produced, outside_roster = outside, "facts gated");

    let n = Upsert::new(
        "survey_fact",
        FACT_COLUMNS,
        &["survey", "unitid", "year", "scope", "category", "subgroup", "metric"],
    )
    .execute(store, &values)?;

    let retracted = retract_stale(store, survey, year, &seen)?;
    if retracted > 0 {
        info!(survey, year, retracted, "stale facts removed");
    }
    Ok(n)
}

type FactKey<'a> = (i64, i32, &'a str, &'a str, &'a str, &'a str);

fn retract_stale<S: Store + ?Sized>(
    store: &S,
    survey: &str,
    year: i32,
    current: &HashSet<FactKey<'_>>,
) -> Result<usize> {
    let existing = store.query(
        "SELECT unitid, scope, category, subgroup, metric FROM survey_fact
         WHERE survey = ? AND year = ?",
        &[survey.into(), year.into()],
    )?;
    let mut removed = 0;
    for row in &existing.rows {
        let text = |i: usize| row.get(i).and_then(Value::as_str).unwrap_or_default();
        let Some(unitid) = row.first().and_then(Value::as_i64) else {
            continue;
        };
        if current.contains(&(unitid, year, text(1), text(2), text(3), text(4))) {
            continue;
        }
        removed += store.execute(
            "DELETE FROM survey_fact WHERE survey = ? AND unitid = ? AND year = ?
             AND scope = ? AND category = ? AND subgroup = ? AND metric = ?",
            &[
                survey.into(),
                unitid.into(),
                year.into(),
                text(1).into(),
                text(2).into(),
                text(3).into(),
                text(4).into(),
            ],
        )?;
    }
    Ok(removed)
}
