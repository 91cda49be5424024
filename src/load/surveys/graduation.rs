use super::{Condition, FactSurvey, Plan};
use crate::error::Result;
use crate::unpivot::{race_gender_grid, Triple, UnpivotSpec, ValueSource};

/// Modern `grtype` → metric for the bachelor's cohort.
const MODERN: &[(&str, &str)] = &[
    ("8", "cohort"),
    ("12", "completers_150pct"),
    ("16", "transfer_out"),
];

/// Historic (`grtype`, `line`) → metric.
const HISTORIC: &[(&str, &str, &str)] = &[("6", "10", "cohort"), ("12", "18A", "completers_150pct")];

/// `psgrtype` → Pell status.
const PELL: &[(&str, &str)] = &[
    ("1", "total"),
    ("2", "pell"),
    ("3", "non_pell_loan"),
    ("4", "neither"),
];

const COHORT: &str = "bachelor";

/// GR files: one row per cohort type, unpivoted by race and gender; early
/// files carry a single total per line.
pub fn survey() -> Result<FactSurvey> {
    let mut modern = Plan::new("race_gender");
    for (grtype, metric) in MODERN {
        modern = modern.branch(
            vec![Condition::equals("cohort type", &[*grtype])],
            COHORT,
            UnpivotSpec::new(race_gender_grid("gr", "totl", metric), true)?,
        );
    }

    let mut historic = Plan::new("historic_total");
    for (grtype, line, metric) in HISTORIC {
        historic = historic.branch(
            vec![
                Condition::equals("cohort type", &[*grtype]),
                Condition::equals("graduation line", &[*line]),
            ],
            COHORT,
            UnpivotSpec::new(
                vec![Triple::new("total", "total", metric, ValueSource::field("graduation total"))],
                true,
            )?,
        );
    }

    Ok(FactSurvey::new(
        "graduation_rates",
        &["GR{year}.zip"],
        &["gr{year}"],
        vec![modern, historic],
    ))
}

/// GR.._PELL_SSL files: cohort and completers per Pell status.
pub fn pell_survey() -> Result<FactSurvey> {
    let mut plan = Plan::new("pell_status");
    for (psgrtype, status) in PELL {
        plan = plan.branch(
            vec![Condition::equals("pell cohort type", &[*psgrtype])],
            COHORT,
            UnpivotSpec::new(
                vec![
                    Triple::new(status, "total", "cohort", ValueSource::column("pgadjct")),
                    Triple::new(status, "total", "completers_150pct", ValueSource::column("pgcmbac")),
                ],
                false,
            )?,
        );
    }

    Ok(FactSurvey::new(
        "graduation_rates_pell",
        &["GR{year}_PELL_SSL.zip"],
        &["gr_pell_ssl{year}"],
        vec![plan],
    ))
}
