//! Archive Reader: single-table survey archives.
//!
//! An IPEDS archive is a zip holding exactly one CSV payload. Members are
//! read into memory whole; nothing here streams.

pub mod header;
pub mod read;

use crate::error::{LoadError, Result};
use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};
use zip::ZipArchive;

pub use header::{cleanse_header, cleanse_headers};
pub use read::{
    decode, read_csv_file, read_table, read_table_from, resolve_encodings, SourceTable,
    DEFAULT_ENCODINGS,
};

/// Member listing and byte access over a compressed archive.
pub trait ArchiveStore {
    /// Human-readable location, used in error text and logs.
    fn location(&self) -> String;
    /// Every member name, in archive order.
    fn members(&self) -> Vec<String>;
    /// Raw bytes of one member.
    fn read(&mut self, member: &str) -> Result<Vec<u8>>;
}

/// Zip-backed [`ArchiveStore`].
pub struct ZipStore {
    path: PathBuf,
    archive: ZipArchive<File>,
}

impl ZipStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let archive = ZipArchive::new(file)
            .map_err(|e| LoadError::archive(path.display().to_string(), e.to_string()))?;
        Ok(Self { path, archive })
    }
}

impl ArchiveStore for ZipStore {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn members(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    fn read(&mut self, member: &str) -> Result<Vec<u8>> {
        let mut entry = self.archive.by_name(member)?;
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// Pick the single tabular payload out of an archive listing.
///
/// Directory entries and `__MACOSX/` resource forks are ignored. Zero or
/// several remaining `.csv` members is an [`LoadError::ArchiveFormat`].
pub fn locate_payload(location: &str, members: &[String]) -> Result<String> {
    let candidates: Vec<&String> = members
        .iter()
        .filter(|m| !m.ends_with('/') && !m.starts_with("__MACOSX/"))
        .filter(|m| m.to_lowercase().ends_with(".csv"))
        .collect();

    match candidates.as_slice() {
        [only] => Ok((*only).clone()),
        [] => Err(LoadError::archive(location, "no CSV payload found")),
        many => Err(LoadError::archive(
            location,
            format!(
                "expected exactly one CSV payload, found {}: {}",
                many.len(),
                many.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            ),
        )),
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use zip::write::SimpleFileOptions;
    use zip::CompressionMethod;

    /// Write a zip at `dir/name` holding the given `(member, bytes)` pairs.
    pub fn write_zip(dir: &Path, name: &str, members: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join(name);
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (member, bytes) in members {
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            zip.start_file(*member, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
        path
    }
}
