use encoding_rs::{Encoding, UTF_8};
use glob::{glob_with, MatchOptions, Pattern};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

use super::surveys::Survey;
use crate::archive::{cleanse_headers, read_table, SourceTable};
use crate::error::{LoadError, Result};
use crate::store::{Store, Value};

/// Where a survey's raw table for a year comes from.
pub trait SourceCatalog {
    fn describe(&self) -> String;
    /// First existing source for `survey` in `year`, or `None` when absent.
    fn locate(&mut self, survey: &dyn Survey, year: i32) -> Result<Option<String>>;
    /// Read a located source.
    fn read(&mut self, located: &str) -> Result<SourceTable>;
}

/// A directory of downloaded archives, matched by file name ignoring case.
///
/// The listing is scanned once and cached; `refresh` rescans.
pub struct ArchiveDirectory {
    root: PathBuf,
    encodings: Vec<&'static Encoding>,
    /// lowercase file name → file name on disk
    listing: Option<HashMap<String, String>>,
}

impl ArchiveDirectory {
    pub fn new(root: impl Into<PathBuf>, encodings: Vec<&'static Encoding>) -> Self {
        Self {
            root: root.into(),
            encodings,
            listing: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drop the cached listing and rescan.
    pub fn refresh(&mut self) -> Result<&HashMap<String, String>> {
        self.listing = None;
        self.listing(false)
    }

    pub fn listing(&mut self, force_refresh: bool) -> Result<&HashMap<String, String>> {
        if force_refresh {
            self.listing = None;
        }
        if self.listing.is_none() {
            let scanned = self.scan()?;
            debug!(root = %self.root.display(), files = scanned.len(), "archive listing cached");
            self.listing = Some(scanned);
        }
        Ok(self.listing.get_or_insert_with(HashMap::new))
    }

    fn scan(&self) -> Result<HashMap<String, String>> {
        let pattern = format!("{}/*.zip", Pattern::escape(&self.root.to_string_lossy()));
        let opts = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };
        let paths = glob_with(&pattern, opts)
            .map_err(|e| LoadError::Config(format!("bad raw directory `{}`: {e}", self.root.display())))?;

        let mut out = HashMap::new();
        for entry in paths {
            match entry {
                Ok(path) if path.is_file() => {
                    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                        out.insert(name.to_lowercase(), name.to_string());
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "unreadable directory entry"),
            }
        }
        Ok(out)
    }

    /// First candidate file name present on disk.
    pub fn find(&mut self, candidates: &[String]) -> Result<Option<PathBuf>> {
        let root = self.root.clone();
        let listing = self.listing(false)?;
        Ok(candidates
            .iter()
            .find_map(|c| listing.get(&c.to_lowercase()))
            .map(|name| root.join(name)))
    }
}

impl SourceCatalog for ArchiveDirectory {
    fn describe(&self) -> String {
        format!("archives:{}", self.root.display())
    }

    fn locate(&mut self, survey: &dyn Survey, year: i32) -> Result<Option<String>> {
        Ok(self
            .find(&survey.archives(year))?
            .map(|p| p.display().to_string()))
    }

    fn read(&mut self, located: &str) -> Result<SourceTable> {
        let path = Path::new(located);
        if !path.exists() {
            return Err(LoadError::SourceAbsent(located.to_string()));
        }
        read_table(path, &self.encodings)
    }
}

/// Raw tables already staged in the store (`hd2023`, `efa2023`, ...).
pub struct StagedTables<'s, S: Store + ?Sized> {
    store: &'s S,
}

impl<'s, S: Store + ?Sized> StagedTables<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }
}

/// Double-quote an identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl<S: Store + ?Sized> SourceCatalog for StagedTables<'_, S> {
    fn describe(&self) -> String {
        "staged".to_string()
    }

    fn locate(&mut self, survey: &dyn Survey, year: i32) -> Result<Option<String>> {
        for table in survey.tables(year) {
            if self.store.table_exists(&table)? {
                return Ok(Some(table));
            }
        }
        Ok(None)
    }

    fn read(&mut self, located: &str) -> Result<SourceTable> {
        if !self.store.table_exists(located)? {
            return Err(LoadError::SourceAbsent(located.to_string()));
        }
        let out = self
            .store
            .query(&format!("SELECT * FROM {}", quote_ident(located)), &[])?;
        let rows = out
            .rows
            .into_iter()
            .map(|r| {
                r.into_iter()
                    .map(|v| match v {
                        Value::Null => String::new(),
                        Value::Text(s) => s,
                        other => other.to_string(),
                    })
                    .collect()
            })
            .collect();
        Ok(SourceTable {
            name: located.to_string(),
            headers: cleanse_headers(&out.columns),
            rows,
            encoding: UTF_8,
        })
    }
}
