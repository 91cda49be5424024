use super::{FactSurvey, Plan};
use crate::error::Result;
use crate::unpivot::{Triple, UnpivotSpec, ValueSource};

const COUNTS: &[(&str, &str, &str)] = &[
    ("applicants", "total", "applcn"),
    ("applicants", "men", "applcnm"),
    ("applicants", "women", "applcnw"),
    ("admitted", "total", "admssn"),
    ("admitted", "men", "admssnm"),
    ("admitted", "women", "admssnw"),
    ("enrolled", "total", "enrlt"),
    ("enrolled", "men", "enrlm"),
    ("enrolled", "women", "enrlw"),
];

const SCORES: &[(&str, &str, &str)] = &[
    ("sat_verbal", "p25", "satvr25"),
    ("sat_verbal", "p75", "satvr75"),
    ("sat_math", "p25", "satmt25"),
    ("sat_math", "p75", "satmt75"),
    ("act_composite", "p25", "actcm25"),
    ("act_composite", "p75", "actcm75"),
];

fn triples(rows: &[(&str, &str, &str)], metric: &str) -> Vec<Triple> {
    rows.iter()
        .map(|(cat, sub, col)| Triple::new(cat, sub, metric, ValueSource::column(col)))
        .collect()
}

/// ADM files; scores are absent for some years, leaving counts only.
pub fn survey() -> Result<FactSurvey> {
    let mut full = triples(COUNTS, "count");
    full.extend(triples(SCORES, "score"));
    let full = UnpivotSpec::new(full, false)?;
    let counts = UnpivotSpec::new(triples(COUNTS, "count"), false)?;

    Ok(FactSurvey::new(
        "admissions",
        &["ADM{year}.zip"],
        &["adm{year}"],
        vec![
            Plan::new("with_scores").branch(vec![], "", full),
            Plan::new("counts").branch(vec![], "", counts),
        ],
    ))
}
