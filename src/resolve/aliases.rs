use once_cell::sync::Lazy;
use std::{collections::HashMap, fmt, fs, path::Path};

use crate::error::{LoadError, Result};

/// One era's physical spelling of a logical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    Column(String),
    /// Separately reported subgroup columns whose sum is the field.
    Sum(Vec<String>),
}

impl Candidate {
    /// `"eftotlt"` is a column, `"efrace15+efrace16"` a derived sum.
    pub fn parse(raw: &str) -> Self {
        let parts: Vec<String> = raw
            .split('+')
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        match parts.len() {
            0 | 1 => Candidate::Column(parts.into_iter().next().unwrap_or_default()),
            _ => Candidate::Sum(parts),
        }
    }

    pub fn columns(&self) -> &[String] {
        match self {
            Candidate::Column(c) => std::slice::from_ref(c),
            Candidate::Sum(parts) => parts,
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Candidate::Column(c) => f.write_str(c),
            Candidate::Sum(parts) => f.write_str(&parts.join("+")),
        }
    }
}

/// Logical field → candidates, oldest era first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAlias {
    pub field: String,
    pub candidates: Vec<Candidate>,
}

impl FieldAlias {
    pub fn new<S: AsRef<str>>(field: &str, candidates: &[S]) -> Self {
        Self {
            field: field.to_string(),
            candidates: candidates.iter().map(|c| Candidate::parse(c.as_ref())).collect(),
        }
    }
}

/// Built-in aliases for the fields whose spelling drifted across eras.
const BUILTIN: &[(&str, &[&str])] = &[
    ("institution id", &["unitid"]),
    ("institution name", &["instnm"]),
    ("city", &["city"]),
    ("state", &["stabbr"]),
    ("zip", &["zip"]),
    ("latitude", &["latitude"]),
    ("longitude", &["longitud", "longitude"]),
    ("sector", &["sector"]),
    ("control", &["control"]),
    ("level", &["iclevel"]),
    ("hbcu", &["hbcu"]),
    ("tribal", &["tribal"]),
    ("enrollment line", &["line"]),
    ("student level", &["efalevel"]),
    ("total enrollment", &["efrace15+efrace16", "eftotlt"]),
    ("cip code", &["cip", "cipcode"]),
    ("award level", &["awlevel"]),
    ("major number", &["majornum"]),
    ("total completions", &["crace15+crace16", "ctotalt"]),
    ("cohort type", &["grtype"]),
    ("graduation line", &["line"]),
    ("graduation total", &["grrace24", "grtotlt"]),
    ("pell cohort type", &["psgrtype"]),
];

static BUILTIN_TABLE: Lazy<HashMap<String, FieldAlias>> = Lazy::new(|| {
    BUILTIN
        .iter()
        .map(|(field, cands)| (field.to_string(), FieldAlias::new(field, cands)))
        .collect()
});

/// Alias lookup keyed by logical field name.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: HashMap<String, FieldAlias>,
}

impl AliasTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN_TABLE.clone(),
        }
    }

    pub fn insert(&mut self, alias: FieldAlias) {
        self.entries.insert(alias.field.clone(), alias);
    }

    pub fn get(&self, field: &str) -> Option<&FieldAlias> {
        self.entries.get(field)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Override entries from a YAML mapping of field → candidate list.
    pub fn merge_yaml(&mut self, yaml: &str) -> Result<usize> {
        let parsed: HashMap<String, Vec<String>> = serde_yaml::from_str(yaml)
            .map_err(|e| LoadError::Config(format!("alias file: {e}")))?;
        let n = parsed.len();
        for (field, candidates) in parsed {
            if candidates.is_empty() {
                return Err(LoadError::Config(format!(
                    "alias `{field}` has no candidates"
                )));
            }
            self.insert(FieldAlias::new(&field, &candidates));
        }
        Ok(n)
    }

    /// Built-in table overridden by the YAML file at `path`.
    pub fn with_overrides(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| LoadError::Config(format!("{}: {e}", path.display())))?;
        let mut table = Self::builtin();
        table.merge_yaml(&text)?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_parse_sums() {
        assert_eq!(Candidate::parse("EFTOTLT"), Candidate::Column("eftotlt".into()));
        assert_eq!(
            Candidate::parse("efrace15 + efrace16"),
            Candidate::Sum(vec!["efrace15".into(), "efrace16".into()])
        );
        assert_eq!(Candidate::parse("crace15+crace16").to_string(), "crace15+crace16");
    }

    #[test]
    fn yaml_overrides_entry_by_entry() {
        let mut table = AliasTable::builtin();
        let before = table.len();
        table
            .merge_yaml("total enrollment: [eftotlt]\nmy field: [\"a+b\", c]\n")
            .unwrap();
        assert_eq!(table.len(), before + 1);
        assert_eq!(
            table.get("total enrollment").unwrap().candidates,
            vec![Candidate::Column("eftotlt".into())]
        );
        assert_eq!(
            table.get("my field").unwrap().candidates[0],
            Candidate::Sum(vec!["a".into(), "b".into()])
        );
        // untouched entries keep their built-in candidates
        assert_eq!(table.get("longitude").unwrap().candidates.len(), 2);
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let mut table = AliasTable::empty();
        assert!(matches!(table.merge_yaml("- just\n- a list\n"), Err(LoadError::Config(_))));
        assert!(matches!(table.merge_yaml("x: []\n"), Err(LoadError::Config(_))));
    }

    #[test]
    fn overrides_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("aliases.yaml");
        fs::write(&path, "cip code: [cipcode]\n").unwrap();
        let table = AliasTable::with_overrides(&path).unwrap();
        assert_eq!(
            table.get("cip code").unwrap().candidates,
            vec![Candidate::Column("cipcode".into())]
        );
        assert!(table.get("institution id").is_some());
    }
}
