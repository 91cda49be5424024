//! Column Resolver: logical field → physical column for a given era.

pub mod accessor;
pub mod aliases;
pub mod coerce;

use std::collections::HashSet;
use tracing::trace;

use crate::archive::SourceTable;
use crate::error::{LoadError, Result};

pub use accessor::Accessor;
pub use aliases::{AliasTable, Candidate, FieldAlias};
pub use coerce::{clean_str, parse_int, parse_number};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Direct(String),
    DerivedSum(Vec<String>),
    Unresolved,
}

impl FieldAlias {
    /// First candidate fully present in `header` wins; never fails.
    pub fn resolve(&self, header: &HashSet<&str>) -> Resolution {
        for cand in &self.candidates {
            match cand {
                Candidate::Column(c) if header.contains(c.as_str()) => {
                    return Resolution::Direct(c.clone())
                }
                Candidate::Sum(parts) if parts.iter().all(|p| header.contains(p.as_str())) => {
                    return Resolution::DerivedSum(parts.clone())
                }
                _ => {}
            }
        }
        Resolution::Unresolved
    }
}

/// Resolve `field` against a header set. Fields with no alias entry resolve
/// only to a column of the same name.
pub fn resolve(header: &HashSet<&str>, field: &str, aliases: &AliasTable) -> Resolution {
    match aliases.get(field) {
        Some(alias) => alias.resolve(header),
        None if header.contains(field) => Resolution::Direct(field.to_string()),
        None => Resolution::Unresolved,
    }
}

/// Resolution of several fields against one table.
pub struct Columns<'a> {
    table: &'a SourceTable,
    header: HashSet<&'a str>,
    aliases: &'a AliasTable,
}

impl<'a> Columns<'a> {
    pub fn new(table: &'a SourceTable, aliases: &'a AliasTable) -> Self {
        Self {
            header: table.header_set(),
            table,
            aliases,
        }
    }

    pub fn table(&self) -> &'a SourceTable {
        self.table
    }

    pub fn has(&self, column: &str) -> bool {
        self.header.contains(column)
    }

    pub fn resolution(&self, field: &str) -> Resolution {
        resolve(&self.header, field, self.aliases)
    }

    pub fn optional(&self, field: &str) -> Option<Accessor> {
        let res = self.resolution(field);
        trace!(field, ?res, table = %self.table.name, "resolved");
        match res {
            Resolution::Direct(c) => Accessor::bind(self.table, &[c], false),
            Resolution::DerivedSum(parts) => Accessor::bind(self.table, &parts, true),
            Resolution::Unresolved => None,
        }
    }

    /// Unresolved required fields disqualify the table.
    pub fn required(&self, field: &str) -> Result<Accessor> {
        self.optional(field)
            .ok_or_else(|| LoadError::unresolved(field, &self.table.name))
    }

    /// Bind a physical column by exact name.
    pub fn column(&self, column: &str) -> Option<Accessor> {
        Accessor::bind(self.table, &[column.to_string()], false)
    }

    /// Bind the subset of `columns` that exists, as a coalesce.
    pub fn coalesce(&self, columns: &[String]) -> Option<Accessor> {
        let present: Vec<String> = columns.iter().filter(|c| self.has(c)).cloned().collect();
        Accessor::bind(self.table, &present, false)
    }

    /// Bind a sum over `columns`; every addend column must exist.
    pub fn sum(&self, columns: &[String]) -> Option<Accessor> {
        Accessor::bind(self.table, columns, true)
    }
}
