use super::{Condition, FactSurvey, Plan};
use crate::error::Result;
use crate::unpivot::{race_gender_grid, Triple, UnpivotSpec, ValueSource};

/// `efalevel` code → student-level scope.
const LEVELS: &[(&str, &str)] = &[("1", "all"), ("2", "undergraduate"), ("4", "graduate")];

/// EF..A files. Modern files carry a race × gender grid per student level;
/// early files report one total per line, grand total on line 29.
pub fn survey() -> Result<FactSurvey> {
    let mut modern = Plan::new("race_gender");
    for (code, level) in LEVELS {
        modern = modern.branch(
            vec![Condition::equals("student level", &[*code])],
            level,
            UnpivotSpec::new(race_gender_grid("ef", "totl", "headcount"), true)?,
        );
    }

    let total = UnpivotSpec::new(
        vec![Triple::new(
            "total",
            "total",
            "headcount",
            ValueSource::field("total enrollment"),
        )],
        true,
    )?;
    let historic = Plan::new("historic_total")
        .prefer("enrollment line", &["29", "1"])
        .branch(vec![], "all", total);

    Ok(FactSurvey::new(
        "enrollment",
        &["EF{year}A.zip", "EF{year}_A.zip"],
        &["efa{year}", "ef_a{year}"],
        vec![modern, historic],
    ))
}
