use csv::ReaderBuilder;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use std::{collections::HashSet, fs, path::Path};
use tracing::{debug, instrument, warn};

use super::{cleanse_headers, locate_payload, ArchiveStore, ZipStore};
use crate::error::{LoadError, Result};

/// Strict UTF-8 first: it fails detectably on legacy bytes, while a
/// single-byte decoding never fails and must come last.
pub static DEFAULT_ENCODINGS: &[&Encoding] =
    &[&encoding_rs::UTF_8_INIT, &encoding_rs::WINDOWS_1252_INIT];

/// One survey table as read from its source, before normalization.
#[derive(Debug, Clone)]
pub struct SourceTable {
    /// Payload or staged-table name, used in diagnostics.
    pub name: String,
    /// Cleansed, lowercased header names in source order.
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub encoding: &'static Encoding,
}

impl SourceTable {
    pub fn header_set(&self) -> HashSet<&str> {
        self.headers.iter().map(String::as_str).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Map WHATWG labels (`"utf-8"`, `"latin1"`, `"cp1252"`, ...) to encodings.
pub fn resolve_encodings<S: AsRef<str>>(labels: &[S]) -> Result<Vec<&'static Encoding>> {
    labels
        .iter()
        .map(|label| {
            Encoding::for_label(label.as_ref().trim().as_bytes()).ok_or_else(|| {
                LoadError::Config(format!("unknown encoding label `{}`", label.as_ref()))
            })
        })
        .collect()
}

/// Decode `bytes` under the first encoding that accepts them without
/// replacement characters. BOMs are left in place for header cleansing.
pub fn decode(bytes: &[u8], encodings: &[&'static Encoding]) -> Option<(String, &'static Encoding)> {
    encodings.iter().find_map(|enc| {
        enc.decode_without_bom_handling_and_without_replacement(bytes)
            .map(|text| (text.into_owned(), *enc))
    })
}

/// Open the zip at `path` and read its single CSV payload.
pub fn read_table(path: impl AsRef<Path>, encodings: &[&'static Encoding]) -> Result<SourceTable> {
    let mut store = ZipStore::open(path)?;
    read_table_from(&mut store, encodings)
}

#[instrument(level = "debug", skip(store, encodings), fields(archive = %store.location()))]
pub fn read_table_from<S: ArchiveStore>(
    store: &mut S,
    encodings: &[&'static Encoding],
) -> Result<SourceTable> {
    let location = store.location();
    let member = locate_payload(&location, &store.members())?;
    let bytes = store.read(&member)?;
    let (text, encoding) = decode(&bytes, encodings).ok_or_else(|| {
        LoadError::archive(
            &location,
            format!(
                "`{}` is not decodable as any of [{}]",
                member,
                encodings.iter().map(|e| e.name()).collect::<Vec<_>>().join(", ")
            ),
        )
    })?;
    debug!(member = %member, encoding = encoding.name(), bytes = bytes.len(), "decoded payload");
    parse_csv(&member, &text, encoding)
}

/// Read a plain (not zipped) CSV file under the same decoding rules.
pub fn read_csv_file(path: impl AsRef<Path>, encodings: &[&'static Encoding]) -> Result<SourceTable> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let location = path.display().to_string();
    let (text, encoding) = decode(&bytes, encodings)
        .ok_or_else(|| LoadError::archive(&location, "not decodable under any candidate encoding"))?;
    parse_csv(&location, &text, encoding)
}

fn parse_csv(name: &str, text: &str, encoding: &'static Encoding) -> Result<SourceTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = cleanse_headers(rdr.headers()?.iter());
    if headers.iter().all(String::is_empty) {
        return Err(LoadError::archive(name, "empty header row"));
    }

    let mut rows = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record?;
        if record.len() > headers.len() {
            warn!(table = name, record = idx, "row has more cells than headers");
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(SourceTable {
        name: name.to_string(),
        headers,
        rows,
        encoding,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::testutil::write_zip;
    use tempfile::tempdir;

    #[test]
    fn bom_prefixed_utf8_payload() {
        let tmp = tempdir().unwrap();
        let body = "\u{feff}UNITID,InstNM\n100654,Example University\n";
        let path = write_zip(tmp.path(), "HD2023.zip", &[("hd2023.csv", body.as_bytes())]);

        let table = read_table(&path, DEFAULT_ENCODINGS).unwrap();
        assert_eq!(table.headers, vec!["unitid", "instnm"]);
        assert_eq!(table.rows, vec![vec!["100654", "Example University"]]);
        assert_eq!(table.encoding, UTF_8);
    }

    #[test]
    fn legacy_bytes_fall_back_to_windows_1252() {
        let tmp = tempdir().unwrap();
        // "Université" in windows-1252, invalid as UTF-8.
        let mut body = b"unitid,instnm\n1,Universit".to_vec();
        body.push(0xE9);
        body.extend_from_slice(b"\n");
        let path = write_zip(tmp.path(), "HD1990.zip", &[("hd1990.csv", body.as_slice())]);

        let table = read_table(&path, DEFAULT_ENCODINGS).unwrap();
        assert_eq!(table.encoding, WINDOWS_1252);
        assert_eq!(table.rows[0][1], "Université");
    }

    #[test]
    fn bom_survives_legacy_first_decoding() {
        let tmp = tempdir().unwrap();
        let body = "\u{feff}UNITID,InstNM\n100654,Example University\n";
        let path = write_zip(tmp.path(), "HD2023.zip", &[("hd2023.csv", body.as_bytes())]);

        let table = read_table(&path, &[WINDOWS_1252, UTF_8]).unwrap();
        assert_eq!(table.encoding, WINDOWS_1252);
        assert_eq!(table.headers, vec!["unitid", "instnm"]);
    }

    #[test]
    fn undecodable_payload_is_a_format_error() {
        let tmp = tempdir().unwrap();
        let body: &[u8] = b"a,b\n\xff\xfe\xfd,1\n";
        let path = write_zip(tmp.path(), "X.zip", &[("x.csv", body)]);
        let err = read_table(&path, &[UTF_8]).unwrap_err();
        assert!(matches!(err, LoadError::ArchiveFormat { .. }));
    }

    #[test]
    fn encoding_labels_resolve() {
        let encs = resolve_encodings(&["utf-8", "latin1"]).unwrap();
        assert_eq!(encs, vec![UTF_8, WINDOWS_1252]);
        assert!(matches!(
            resolve_encodings(&["klingon"]),
            Err(LoadError::Config(_))
        ));
    }

    #[test]
    fn plain_csv_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("cip.csv");
        fs::write(&path, "\u{feff}CIPFamily,CIPCode\n01,\"=\"\"01.0101\"\"\"\n").unwrap();
        let table = read_csv_file(&path, DEFAULT_ENCODINGS).unwrap();
        assert_eq!(table.headers, vec!["cipfamily", "cipcode"]);
        assert_eq!(table.rows[0][1], "=\"01.0101\"");
    }
}
