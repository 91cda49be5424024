use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

use super::{expand_all, Output, Survey};
use crate::archive::SourceTable;
use crate::error::Result;
use crate::resolve::{Accessor, AliasTable, Columns};

/// One institution as reported in a directory file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Institution {
    pub unitid: i64,
    pub name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub sector: Option<i64>,
    pub control: Option<i64>,
    pub level: Option<i64>,
    pub hbcu: Option<i64>,
    pub tribal: Option<i64>,
}

/// Institutional directory: HD files, `FA..HD` and `IC` in early eras.
pub struct DirectorySurvey;

const ARCHIVES: &[&str] = &["HD{year}.zip", "FA{year}HD.zip", "IC{year}.zip"];
const TABLES: &[&str] = &["hd{year}", "fahd{year}", "ic{year}"];

impl Survey for DirectorySurvey {
    fn name(&self) -> &str {
        "directory"
    }

    fn archives(&self, year: i32) -> Vec<String> {
        expand_all(ARCHIVES, year)
    }

    fn tables(&self, year: i32) -> Vec<String> {
        expand_all(TABLES, year)
    }

    /// Only id and name are required; every other attribute is best-effort.
    fn transform(&self, table: &SourceTable, year: i32, aliases: &AliasTable) -> Result<Output> {
        let cols = Columns::new(table, aliases);
        let id = cols.required("institution id")?;
        let name = cols.required("institution name")?;
        let city = cols.optional("city");
        let state = cols.optional("state");
        let zip = cols.optional("zip");
        let latitude = cols.optional("latitude");
        let longitude = cols.optional("longitude");
        let sector = cols.optional("sector");
        let control = cols.optional("control");
        let level = cols.optional("level");
        let hbcu = cols.optional("hbcu");
        let tribal = cols.optional("tribal");

        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(table.row_count());
        for row in &table.rows {
            let Some(unitid) = id.int(row) else { continue };
            let Some(inst_name) = name.text(row) else { continue };
            if !seen.insert(unitid) {
                continue;
            }
            let text = |acc: &Option<Accessor>| {
                acc.as_ref().and_then(|a| a.text(row)).map(str::to_string)
            };
            let num = |acc: &Option<Accessor>| acc.as_ref().and_then(|a| a.number(row));
            let int = |acc: &Option<Accessor>| acc.as_ref().and_then(|a| a.int(row));
            out.push(Institution {
                unitid,
                name: inst_name.to_string(),
                city: text(&city),
                state: text(&state),
                zip: text(&zip),
                latitude: num(&latitude),
                longitude: num(&longitude),
                sector: int(&sector),
                control: int(&control),
                level: int(&level),
                hbcu: int(&hbcu),
                tribal: int(&tribal),
            });
        }
        debug!(year, rows = out.len(), "directory transformed");
        Ok(Output::Institutions(out))
    }
}
