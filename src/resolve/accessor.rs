use super::coerce::{non_blank, parse_number};
use crate::archive::SourceTable;

/// Typed, position-bound view of one resolved field over a table's rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    Column(usize),
    /// Derived-by-sum: missing addends count as zero only when at least one
    /// addend parses.
    Sum(Vec<usize>),
    /// First addressed column carrying a value wins.
    Coalesce(Vec<usize>),
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

impl Accessor {
    /// Bind physical column names to positions in `table`.
    pub(crate) fn bind(table: &SourceTable, columns: &[String], sum: bool) -> Option<Self> {
        let idx: Option<Vec<usize>> = columns.iter().map(|c| table.column_index(c)).collect();
        let idx = idx?;
        match (sum, idx.as_slice()) {
            (_, []) => None,
            (false, [one]) => Some(Accessor::Column(*one)),
            (true, _) => Some(Accessor::Sum(idx)),
            (false, _) => Some(Accessor::Coalesce(idx)),
        }
    }

    /// Cleaned, non-blank text. A sum has no text form other than its value.
    pub fn text<'r>(&self, row: &'r [String]) -> Option<&'r str> {
        match self {
            Accessor::Column(i) => non_blank(cell(row, *i)),
            Accessor::Coalesce(cols) => cols.iter().find_map(|i| non_blank(cell(row, *i))),
            Accessor::Sum(_) => None,
        }
    }

    pub fn number(&self, row: &[String]) -> Option<f64> {
        match self {
            Accessor::Column(i) => parse_number(cell(row, *i)),
            Accessor::Coalesce(cols) => cols.iter().find_map(|i| parse_number(cell(row, *i))),
            Accessor::Sum(cols) => {
                let parsed: Vec<f64> = cols
                    .iter()
                    .filter_map(|i| parse_number(cell(row, *i)))
                    .collect();
                (!parsed.is_empty()).then(|| parsed.iter().sum())
            }
        }
    }

    pub fn int(&self, row: &[String]) -> Option<i64> {
        match self {
            Accessor::Column(i) => super::coerce::parse_int(cell(row, *i)),
            _ => self
                .number(row)
                .filter(|v| v.fract() == 0.0)
                .map(|v| v as i64),
        }
    }

    /// Text, or the numeric value rendered without a trailing `.0`.
    pub fn display(&self, row: &[String]) -> Option<String> {
        match self {
            Accessor::Sum(_) => self.number(row).map(|v| {
                if v.fract() == 0.0 {
                    format!("{}", v as i64)
                } else {
                    v.to_string()
                }
            }),
            _ => self.text(row).map(str::to_string),
        }
    }
}
