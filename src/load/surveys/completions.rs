use super::{Condition, FactSurvey, Plan, ScopePart};
use crate::error::Result;
use crate::unpivot::{race_gender_grid, Triple, UnpivotSpec, ValueSource};

/// Completions scope is `{normalized cip}/{award level}`.
fn scoped(label: &'static str) -> Plan {
    Plan::new(label)
        .filter(Condition::if_present("major number", &["1"]))
        .scope_part(ScopePart::Code("cip code".into()))
        .scope_part(ScopePart::Text("award level".into()))
}

/// C.._A files by program and award level. First majors only, when the
/// file distinguishes them.
pub fn survey() -> Result<FactSurvey> {
    let modern = scoped("race_gender").branch(
        vec![],
        "",
        UnpivotSpec::new(race_gender_grid("c", "total", "awards"), true)?,
    );
    let historic = scoped("historic_total").branch(
        vec![],
        "",
        UnpivotSpec::new(
            vec![Triple::new(
                "total",
                "total",
                "awards",
                ValueSource::field("total completions"),
            )],
            true,
        )?,
    );

    Ok(FactSurvey::new(
        "completions",
        &["C{year}_A.zip", "C{year}_CIP.zip", "C{year}_4ORMORE_CIP.zip"],
        &["c_a{year}", "c_cip{year}", "c_4ormore_cip{year}"],
        vec![modern, historic],
    ))
}
