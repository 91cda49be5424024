//! Unpivot Engine: wide rows → narrow facts from a declared triple table.

pub mod grid;

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use crate::error::{LoadError, Result};
use crate::resolve::{Accessor, Columns};

pub use grid::{race_gender_grid, GENDERS, RACES};

/// Where a triple's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Logical field, resolved through the alias table.
    Field(String),
    /// Physical column by exact name.
    Column(String),
    /// First present value among these physical columns.
    Coalesce(Vec<String>),
    /// Derived-by-sum over these physical columns.
    Sum(Vec<String>),
}

impl ValueSource {
    pub fn column(name: &str) -> Self {
        ValueSource::Column(name.to_string())
    }

    pub fn field(name: &str) -> Self {
        ValueSource::Field(name.to_string())
    }

    pub fn coalesce(names: &[&str]) -> Self {
        ValueSource::Coalesce(names.iter().map(|s| s.to_string()).collect())
    }

    fn bind(&self, cols: &Columns<'_>) -> Option<Accessor> {
        match self {
            ValueSource::Field(f) => cols.optional(f),
            ValueSource::Column(c) => cols.column(c),
            ValueSource::Coalesce(cs) => cols.coalesce(cs),
            ValueSource::Sum(cs) => cols.sum(cs),
        }
    }
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSource::Field(s) | ValueSource::Column(s) => f.write_str(s),
            ValueSource::Coalesce(cs) => f.write_str(&cs.join("|")),
            ValueSource::Sum(cs) => f.write_str(&cs.join("+")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub category: String,
    pub subgroup: String,
    pub metric: String,
    pub source: ValueSource,
}

impl Triple {
    pub fn new(category: &str, subgroup: &str, metric: &str, source: ValueSource) -> Self {
        Self {
            category: category.to_string(),
            subgroup: subgroup.to_string(),
            metric: metric.to_string(),
            source,
        }
    }

    fn key(&self) -> (&str, &str, &str) {
        (&self.category, &self.subgroup, &self.metric)
    }
}

/// A declared mapping from wide columns to narrow rows.
#[derive(Debug, Clone)]
pub struct UnpivotSpec {
    triples: Vec<Triple>,
    positive_only: bool,
}

impl UnpivotSpec {
    /// Rejects two triples with the same (category, subgroup, metric).
    pub fn new(triples: Vec<Triple>, positive_only: bool) -> Result<Self> {
        let mut seen = HashSet::new();
        for t in &triples {
            if !seen.insert(t.key()) {
                return Err(LoadError::Config(format!(
                    "duplicate unpivot triple ({}, {}, {})",
                    t.category, t.subgroup, t.metric
                )));
            }
        }
        Ok(Self {
            triples,
            positive_only,
        })
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn positive_only(&self) -> bool {
        self.positive_only
    }

    /// Bind every triple; the first unresolvable source in declaration
    /// order is reported.
    pub fn bind<'p>(&'p self, cols: &Columns<'_>) -> Result<BoundSpec<'p>> {
        let mut accessors = Vec::with_capacity(self.triples.len());
        for t in &self.triples {
            let acc = t
                .source
                .bind(cols)
                .ok_or_else(|| LoadError::unresolved(t.source.to_string(), &cols.table().name))?;
            accessors.push(acc);
        }
        Ok(BoundSpec {
            spec: self,
            accessors,
        })
    }
}

/// One narrow output row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedFact {
    pub entity_id: i64,
    pub year: i32,
    pub scope: String,
    pub category: String,
    pub subgroup: String,
    pub metric: String,
    pub value: Option<f64>,
}

impl NormalizedFact {
    pub fn key(&self) -> (i64, i32, &str, &str, &str, &str) {
        (
            self.entity_id,
            self.year,
            &self.scope,
            &self.category,
            &self.subgroup,
            &self.metric,
        )
    }
}

/// An [`UnpivotSpec`] bound to one table's column positions.
#[derive(Debug)]
pub struct BoundSpec<'p> {
    spec: &'p UnpivotSpec,
    accessors: Vec<Accessor>,
}

impl BoundSpec<'_> {
    /// Facts for one wide row, in declaration order.
    pub fn unpivot(&self, row: &[String], entity_id: i64, year: i32, scope: &str) -> Vec<NormalizedFact> {
        self.spec
            .triples
            .iter()
            .zip(&self.accessors)
            .filter_map(|(t, acc)| {
                let value = acc.number(row);
                if self.spec.positive_only && !value.is_some_and(|v| v > 0.0) {
                    return None;
                }
                Some(NormalizedFact {
                    entity_id,
                    year,
                    scope: scope.to_string(),
                    category: t.category.clone(),
                    subgroup: t.subgroup.clone(),
                    metric: t.metric.clone(),
                    value,
                })
            })
            .collect()
    }
}
