use encoding_rs::Encoding;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::archive::resolve_encodings;
use crate::error::{LoadError, Result};
use crate::resolve::AliasTable;

const DEFAULT_RAW_DIR: &str = "data/raw";
const DEFAULT_DATABASE: &str = "ipeds.duckdb";
const DEFAULT_ENCODINGS: &str = "utf-8,windows-1252";

fn default_raw_dir() -> PathBuf {
    PathBuf::from(DEFAULT_RAW_DIR)
}

fn default_database() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE)
}

fn default_encodings() -> Vec<String> {
    split_labels(DEFAULT_ENCODINGS)
}

fn split_labels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Where archives live, where the database is, how to decode and resolve.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoadConfig {
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// WHATWG labels, tried in order.
    #[serde(default = "default_encodings")]
    pub encodings: Vec<String>,
    /// YAML file of alias overrides.
    #[serde(default)]
    pub aliases: Option<PathBuf>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            raw_dir: default_raw_dir(),
            database: default_database(),
            encodings: default_encodings(),
            aliases: None,
        }
    }
}

impl LoadConfig {
    /// `IPEDS_RAW_DIR`, `IPEDS_DATABASE`, `IPEDS_ENCODINGS`, `IPEDS_ALIASES`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            raw_dir: get("IPEDS_RAW_DIR").map(PathBuf::from).unwrap_or_else(default_raw_dir),
            database: get("IPEDS_DATABASE").map(PathBuf::from).unwrap_or_else(default_database),
            encodings: get("IPEDS_ENCODINGS")
                .map(|v| split_labels(&v))
                .unwrap_or_else(default_encodings),
            aliases: get("IPEDS_ALIASES").map(PathBuf::from),
        }
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        serde_yaml::from_str(&raw)
            .map_err(|e| LoadError::Config(format!("{}: {e}", path.display())))
    }

    pub fn encodings(&self) -> Result<Vec<&'static Encoding>> {
        if self.encodings.is_empty() {
            return Err(LoadError::Config("no encodings configured".into()));
        }
        resolve_encodings(&self.encodings)
    }

    /// Built-in aliases, overridden entry by entry from the YAML file if set.
    pub fn alias_table(&self) -> Result<AliasTable> {
        match &self.aliases {
            Some(path) => AliasTable::with_overrides(path),
            None => Ok(AliasTable::builtin()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn defaults_when_unset() -> anyhow::Result<()> {
        let cfg = LoadConfig::from_lookup(|_| None);
        assert_eq!(cfg, LoadConfig::default());
        assert_eq!(cfg.raw_dir, PathBuf::from("data/raw"));
        let enc = cfg.encodings()?;
        assert_eq!(enc[0].name(), "UTF-8");
        assert_eq!(enc[1].name(), "windows-1252");
        Ok(())
    }

    #[test]
    fn environment_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("IPEDS_RAW_DIR", "/tmp/raw"),
            ("IPEDS_ENCODINGS", " latin1 , utf-8 "),
            ("IPEDS_ALIASES", ""),
        ]);
        let cfg = LoadConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.raw_dir, PathBuf::from("/tmp/raw"));
        assert_eq!(cfg.database, PathBuf::from("ipeds.duckdb"));
        assert_eq!(cfg.encodings, vec!["latin1", "utf-8"]);
        assert_eq!(cfg.aliases, None);
    }

    #[test]
    fn unknown_encoding_is_a_config_error() {
        let cfg = LoadConfig {
            encodings: vec!["klingon".into()],
            ..LoadConfig::default()
        };
        assert!(matches!(cfg.encodings(), Err(LoadError::Config(_))));
    }

    #[test]
    fn yaml_file_and_alias_overrides() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let aliases = tmp.path().join("aliases.yaml");
        fs::write(&aliases, "institution name:\n  - inst_name\n  - instnm\n")?;
        let cfg_path = tmp.path().join("load.yaml");
        fs::write(
            &cfg_path,
            format!("database: test.duckdb\naliases: {}\n", aliases.display()),
        )?;

        let cfg = LoadConfig::from_yaml_file(&cfg_path)?;
        assert_eq!(cfg.database, PathBuf::from("test.duckdb"));
        assert_eq!(cfg.raw_dir, PathBuf::from("data/raw"));
        let table = cfg.alias_table()?;
        let name = table.get("institution name").unwrap();
        assert_eq!(name.candidates[0].to_string(), "inst_name");
        assert!(table.get("institution id").is_some());
        Ok(())
    }
}
