//! Year-parameterized survey definitions.
//!
//! Every fact survey is declarative: archive and staged-table name
//! templates plus one or more era plans. A plan filters and routes wide rows
//! into branches, and each branch unpivots through its own [`UnpivotSpec`].

pub mod admissions;
pub mod completions;
pub mod directory;
pub mod enrollment;
pub mod financial_aid;
pub mod graduation;

use tracing::{debug, warn};

use crate::archive::SourceTable;
use crate::code;
use crate::error::{LoadError, Result};
use crate::resolve::{clean_str, parse_number, Accessor, AliasTable, Columns};
use crate::unpivot::{BoundSpec, NormalizedFact, UnpivotSpec};

pub use directory::{DirectorySurvey, Institution};

/// What a survey transform hands to the orchestrator.
#[derive(Debug, Clone)]
pub enum Output {
    /// Entity rows; these define the year's roster.
    Institutions(Vec<Institution>),
    /// Facts, gated by the year's roster before upsert.
    Facts(Vec<NormalizedFact>),
}

impl Output {
    pub fn len(&self) -> usize {
        match self {
            Output::Institutions(v) => v.len(),
            Output::Facts(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait Survey {
    fn name(&self) -> &str;
    /// Archive file names for `year`, tried in order.
    fn archives(&self, year: i32) -> Vec<String>;
    /// Staged raw-table names for `year`, tried in order. The first is the
    /// staging target.
    fn tables(&self, year: i32) -> Vec<String>;
    fn transform(&self, table: &SourceTable, year: i32, aliases: &AliasTable) -> Result<Output>;
}

/// Expand `{year}` and the academic-year span `{span}` (`2023` → `2223`).
pub fn expand(template: &str, year: i32) -> String {
    let span = format!("{:02}{:02}", (year - 1).rem_euclid(100), year.rem_euclid(100));
    template
        .replace("{year}", &year.to_string())
        .replace("{span}", &span)
}

fn expand_all(templates: &[&str], year: i32) -> Vec<String> {
    templates.iter().map(|t| expand(t, year)).collect()
}

/// Compare a cell against a declared value: case-insensitive text, or equal
/// numbers (`"8"` matches `"8.0"`).
fn same_value(cell: &str, wanted: &str) -> bool {
    let cell = clean_str(cell);
    if cell.eq_ignore_ascii_case(wanted) {
        return true;
    }
    matches!((parse_number(cell), parse_number(wanted)), (Some(a), Some(b)) if a == b)
}

/// Row predicate: the field's value is one of `values`.
#[derive(Debug, Clone)]
pub struct Condition {
    pub field: String,
    pub values: Vec<String>,
    /// An optional condition is ignored when its field does not resolve.
    pub required: bool,
}

impl Condition {
    pub fn equals(field: &str, values: &[&str]) -> Self {
        Self {
            field: field.to_string(),
            values: values.iter().map(|s| s.to_string()).collect(),
            required: true,
        }
    }

    pub fn if_present(field: &str, values: &[&str]) -> Self {
        Self {
            required: false,
            ..Self::equals(field, values)
        }
    }
}

/// Table-level preference: keep only rows carrying the best-ranked value
/// present anywhere in the table. Ignored when the field has no column.
#[derive(Debug, Clone)]
pub struct Preference {
    pub field: String,
    pub order: Vec<String>,
}

/// One component of a row-derived scope.
#[derive(Debug, Clone)]
pub enum ScopePart {
    Text(String),
    /// Classification code, normalized.
    Code(String),
}

#[derive(Debug, Clone)]
pub struct Branch {
    pub when: Vec<Condition>,
    pub scope: String,
    pub spec: UnpivotSpec,
}

/// One era's way of reading a survey.
#[derive(Debug, Clone)]
pub struct Plan {
    pub label: &'static str,
    pub prefer: Option<Preference>,
    pub filters: Vec<Condition>,
    pub scope: Vec<ScopePart>,
    pub branches: Vec<Branch>,
}

impl Plan {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            prefer: None,
            filters: Vec::new(),
            scope: Vec::new(),
            branches: Vec::new(),
        }
    }

    pub fn prefer(mut self, field: &str, order: &[&str]) -> Self {
        self.prefer = Some(Preference {
            field: field.to_string(),
            order: order.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn filter(mut self, cond: Condition) -> Self {
        self.filters.push(cond);
        self
    }

    pub fn scope_part(mut self, part: ScopePart) -> Self {
        self.scope.push(part);
        self
    }

    pub fn branch(mut self, when: Vec<Condition>, scope: &str, spec: UnpivotSpec) -> Self {
        self.branches.push(Branch {
            when,
            scope: scope.to_string(),
            spec,
        });
        self
    }

    /// Bind against a table; unresolved fields are reported in the order
    /// id, filters, scope, branch conditions, branch triples.
    pub fn bind<'p>(&'p self, cols: &Columns<'_>) -> Result<BoundPlan<'p>> {
        let id = cols.required("institution id")?;
        let prefer = self
            .prefer
            .as_ref()
            .and_then(|p| cols.optional(&p.field).map(|acc| (acc, p)));

        let mut filters = Vec::new();
        for cond in &self.filters {
            match (cols.optional(&cond.field), cond.required) {
                (Some(acc), _) => filters.push((acc, cond)),
                (None, true) => {
                    return Err(LoadError::unresolved(cond.field.as_str(), cols.table().name.as_str()))
                }
                (None, false) => {}
            }
        }

        let mut scope = Vec::new();
        for part in &self.scope {
            let (field, is_code) = match part {
                ScopePart::Text(f) => (f, false),
                ScopePart::Code(f) => (f, true),
            };
            scope.push((cols.required(field)?, is_code));
        }

        let mut branches = Vec::new();
        for branch in &self.branches {
            let mut when = Vec::new();
            for cond in &branch.when {
                when.push((cols.required(&cond.field)?, cond));
            }
            branches.push((when, branch.scope.as_str(), branch.spec.bind(cols)?));
        }

        Ok(BoundPlan {
            id,
            prefer,
            filters,
            scope,
            branches,
        })
    }
}

type BoundCondition<'p> = (Accessor, &'p Condition);

fn holds(row: &[String], (acc, cond): &BoundCondition<'_>) -> bool {
    acc.text(row)
        .is_some_and(|v| cond.values.iter().any(|w| same_value(v, w)))
}

pub struct BoundPlan<'p> {
    id: Accessor,
    prefer: Option<(Accessor, &'p Preference)>,
    filters: Vec<BoundCondition<'p>>,
    scope: Vec<(Accessor, bool)>,
    branches: Vec<(Vec<BoundCondition<'p>>, &'p str, BoundSpec<'p>)>,
}

impl BoundPlan<'_> {
    fn rank(&self, row: &[String]) -> Option<usize> {
        let (acc, pref) = self.prefer.as_ref()?;
        let v = acc.text(row)?;
        pref.order.iter().position(|w| same_value(v, w))
    }

    fn row_scope(&self, row: &[String], branch_scope: &str) -> Option<String> {
        let mut parts: Vec<String> = Vec::new();
        if !branch_scope.is_empty() {
            parts.push(branch_scope.to_string());
        }
        for (acc, is_code) in &self.scope {
            let raw = acc.text(row)?;
            if *is_code {
                match code::normalize(raw) {
                    Ok(c) => parts.push(c.normalized),
                    Err(_) => parts.push(raw.to_string()),
                }
            } else {
                parts.push(raw.to_string());
            }
        }
        Some(parts.join("/"))
    }

    /// Facts for every qualifying row of `table`.
    pub fn facts(&self, table: &SourceTable, year: i32) -> Vec<NormalizedFact> {
        let keyed: Vec<(i64, &Vec<String>)> = table
            .rows
            .iter()
            .filter(|row| self.filters.iter().all(|c| holds(row, c)))
            .filter_map(|row| self.id.int(row).map(|id| (id, row)))
            .collect();

        // One preferred value for the whole table; with none present, no row qualifies.
        let best: Option<Option<usize>> = self
            .prefer
            .as_ref()
            .map(|_| keyed.iter().filter_map(|(_, row)| self.rank(row)).min());

        let mut out = Vec::new();
        for (id, row) in keyed {
            if let Some(best) = best {
                if best.is_none() || self.rank(row) != best {
                    continue;
                }
            }
            for (when, branch_scope, spec) in &self.branches {
                if !when.iter().all(|c| holds(row, c)) {
                    continue;
                }
                if let Some(scope) = self.row_scope(row, branch_scope) {
                    out.extend(spec.unpivot(row, id, year, &scope));
                }
            }
        }
        out
    }
}

/// A survey made only of declared plans.
pub struct FactSurvey {
    name: &'static str,
    archives: &'static [&'static str],
    tables: &'static [&'static str],
    plans: Vec<Plan>,
}

impl FactSurvey {
    pub fn new(
        name: &'static str,
        archives: &'static [&'static str],
        tables: &'static [&'static str],
        plans: Vec<Plan>,
    ) -> Self {
        Self {
            name,
            archives,
            tables,
            plans,
        }
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }
}

impl Survey for FactSurvey {
    fn name(&self) -> &str {
        self.name
    }

    fn archives(&self, year: i32) -> Vec<String> {
        expand_all(self.archives, year)
    }

    fn tables(&self, year: i32) -> Vec<String> {
        expand_all(self.tables, year)
    }

    /// The first plan that binds wins; otherwise the first plan's error.
    fn transform(&self, table: &SourceTable, year: i32, aliases: &AliasTable) -> Result<Output> {
        let cols = Columns::new(table, aliases);
        let mut first_err = None;
        for plan in &self.plans {
            match plan.bind(&cols) {
                Ok(bound) => {
                    debug!(survey = self.name, plan = plan.label, year, "plan selected");
                    return Ok(Output::Facts(bound.facts(table, year)));
                }
                Err(e) => {
                    debug!(survey = self.name, plan = plan.label, error = %e, "plan does not bind");
                    first_err.get_or_insert(e);
                }
            }
        }
        let err = first_err
            .unwrap_or_else(|| LoadError::Config(format!("survey `{}` has no plans", self.name)));
        warn!(survey = self.name, year, error = %err, "no plan matches");
        Err(err)
    }
}

/// Every survey, in processing order. The directory comes first: later
/// surveys are gated on its roster.
pub fn catalogue() -> Result<Vec<Box<dyn Survey>>> {
    Ok(vec![
        Box::new(DirectorySurvey),
        Box::new(admissions::survey()?),
        Box::new(enrollment::survey()?),
        Box::new(completions::survey()?),
        Box::new(graduation::survey()?),
        Box::new(graduation::pell_survey()?),
        Box::new(financial_aid::survey()?),
    ])
}

#[cfg(test)]
pub(crate) mod testutil {
    use crate::archive::SourceTable;
    use encoding_rs::UTF_8;

    pub fn table(name: &str, headers: &[&str], rows: &[&[&str]]) -> SourceTable {
        SourceTable {
            name: name.into(),
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
            encoding: UTF_8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::table;
    use super::*;
    use crate::unpivot::{Triple, ValueSource};

    fn single(metric: &str, column: &str) -> UnpivotSpec {
        UnpivotSpec::new(
            vec![Triple::new("total", "total", metric, ValueSource::column(column))],
            true,
        )
        .unwrap()
    }

    #[test]
    fn academic_year_span() {
        assert_eq!(expand("SFA{span}.zip", 2023), "SFA2223.zip");
        assert_eq!(expand("SFA{span}.zip", 2000), "SFA9900.zip");
        assert_eq!(expand("sfa{year}", 2001), "sfa2001");
    }

    #[test]
    fn cell_matching_is_numeric_aware() {
        assert!(same_value(" 8 ", "8"));
        assert!(same_value("8.0", "8"));
        assert!(same_value("18a", "18A"));
        assert!(!same_value("", "8"));
    }

    fn historic_plan() -> Plan {
        Plan::new("historic")
            .prefer("line", &["29", "1"])
            .branch(vec![], "all", single("headcount", "total"))
    }

    fn values(plan: &Plan, t: &SourceTable) -> Vec<(i64, Option<f64>)> {
        let aliases = AliasTable::builtin();
        let cols = Columns::new(t, &aliases);
        plan.bind(&cols)
            .unwrap()
            .facts(t, 1990)
            .iter()
            .map(|f| (f.entity_id, f.value))
            .collect()
    }

    #[test]
    fn preferred_value_is_chosen_once_per_table() {
        let t = table(
            "ef1990a",
            &["unitid", "line", "total"],
            &[
                &["1", "1", "10"],
                &["1", "29", "99"],
                &["2", "1", "20"],
                &["3", "7", "30"],
            ],
        );
        assert_eq!(values(&historic_plan(), &t), vec![(1, Some(99.0))]);
    }

    #[test]
    fn fallback_value_used_only_when_preferred_is_absent() {
        let t = table(
            "ef1986a",
            &["unitid", "line", "total"],
            &[&["1", "1", "10"], &["2", "1", "20"], &["3", "7", "30"]],
        );
        assert_eq!(values(&historic_plan(), &t), vec![(1, Some(10.0)), (2, Some(20.0))]);

        let t = table("ef1986a", &["unitid", "line", "total"], &[&["1", "7", "10"]]);
        assert!(values(&historic_plan(), &t).is_empty());
    }

    #[test]
    fn preference_without_its_column_keeps_every_row() {
        let t = table("ef1984a", &["unitid", "total"], &[&["1", "10"], &["2", "20"]]);
        assert_eq!(values(&historic_plan(), &t), vec![(1, Some(10.0)), (2, Some(20.0))]);
    }

    #[test]
    fn branches_route_rows_and_optional_filters_drop_out() {
        let plan = Plan::new("modern")
            .filter(Condition::if_present("majornum", &["1"]))
            .branch(vec![Condition::equals("kind", &["8"])], "a", single("cohort", "v"))
            .branch(vec![Condition::equals("kind", &["12"])], "a", single("done", "v"));
        let t = table(
            "gr2023",
            &["unitid", "kind", "v"],
            &[&["1", "8", "10"], &["1", "12", "6"], &["1", "99", "1"]],
        );
        let aliases = AliasTable::builtin();
        let cols = Columns::new(&t, &aliases);
        let facts = plan.bind(&cols).unwrap().facts(&t, 2023);
        let metrics: Vec<&str> = facts.iter().map(|f| f.metric.as_str()).collect();
        assert_eq!(metrics, vec!["cohort", "done"]);
    }

    #[test]
    fn code_scope_parts_are_normalized() {
        let plan = Plan::new("modern")
            .scope_part(ScopePart::Code("cipcode".into()))
            .scope_part(ScopePart::Text("awlevel".into()))
            .branch(vec![], "", single("awards", "ctotalt"));
        let t = table(
            "c2023_a",
            &["unitid", "cipcode", "awlevel", "ctotalt"],
            &[&["1", "1.1", "5", "3"]],
        );
        let aliases = AliasTable::builtin();
        let cols = Columns::new(&t, &aliases);
        let facts = plan.bind(&cols).unwrap().facts(&t, 2023);
        assert_eq!(facts[0].scope, "01.1000/5");
    }

    #[test]
    fn first_plan_error_is_reported_when_none_bind() {
        let survey = FactSurvey::new(
            "enrollment",
            &["EF{year}A.zip"],
            &["efa{year}"],
            vec![
                Plan::new("modern").branch(vec![], "all", single("headcount", "eftotlt")),
                Plan::new("historic").branch(vec![], "all", single("headcount", "efrace15")),
            ],
        );
        let t = table("ef1985", &["unitid"], &[]);
        match survey.transform(&t, 1985, &AliasTable::builtin()) {
            Err(LoadError::FieldUnresolved { field, .. }) => assert_eq!(field, "eftotlt"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
