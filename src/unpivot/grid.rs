use super::{Triple, ValueSource};

/// Race/ethnicity label and its column infix.
pub const RACES: &[(&str, &str)] = &[
    ("total", "totl"),
    ("american_indian_alaska_native", "aian"),
    ("asian", "asia"),
    ("black", "bkaa"),
    ("hispanic", "hisp"),
    ("native_hawaiian_pacific_islander", "nhpi"),
    ("white", "whit"),
    ("two_or_more", "2mor"),
    ("unknown", "unkn"),
    ("nonresident", "nral"),
];

/// Gender label and its column suffix.
pub const GENDERS: &[(&str, &str)] = &[("total", "t"), ("men", "m"), ("women", "w")];

/// Race × gender triples over columns named `{prefix}{race}{gender}`, e.g.
/// `eftotlt`, `caianw`, `gr2morm`. `total` replaces the all-races infix,
/// which completions spell `total` rather than `totl`.
pub fn race_gender_grid(prefix: &str, total: &str, metric: &str) -> Vec<Triple> {
    RACES
        .iter()
        .map(|(race, infix)| (*race, if *race == "total" { total } else { *infix }))
        .flat_map(|(race, infix)| {
            GENDERS.iter().map(move |(gender, suffix)| {
                Triple::new(
                    race,
                    gender,
                    metric,
                    ValueSource::Column(format!("{prefix}{infix}{suffix}")),
                )
            })
        })
        .collect()
}
