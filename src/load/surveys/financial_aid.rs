use super::{FactSurvey, Plan};
use crate::error::Result;
use crate::unpivot::{Triple, UnpivotSpec, ValueSource};

/// Net-price income brackets and their (public, private) columns. Which one
/// carries a value depends on institution control; presence decides.
const NET_PRICE: &[(&str, &str, &str)] = &[
    ("all", "npist2", "npgrn2"),
    ("0_30k", "npis412", "npt412"),
    ("30_48k", "npis422", "npt422"),
    ("48_75k", "npis432", "npt432"),
    ("75_110k", "npis442", "npt442"),
    ("110k_plus", "npis452", "npt452"),
];

fn base() -> Vec<Triple> {
    vec![
        Triple::new("undergraduates", "total", "enrolled", ValueSource::column("scugrad")),
        Triple::new("pell", "total", "recipients", ValueSource::column("uagrntp")),
    ]
}

/// SFA files, named by academic year (`SFA2223` for 2023) or calendar year.
pub fn survey() -> Result<FactSurvey> {
    let mut full = base();
    full.extend(NET_PRICE.iter().map(|(bracket, public, private)| {
        Triple::new(
            "net_price",
            bracket,
            "average",
            ValueSource::coalesce(&[*public, *private]),
        )
    }));

    Ok(FactSurvey::new(
        "financial_aid",
        &["SFA{span}.zip", "SFA{year}.zip"],
        &["sfa{year}", "sfa{span}"],
        vec![
            Plan::new("net_price").branch(vec![], "", UnpivotSpec::new(full, false)?),
            Plan::new("aid_only").branch(vec![], "", UnpivotSpec::new(base(), false)?),
        ],
    ))
}
