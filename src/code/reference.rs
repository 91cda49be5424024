use encoding_rs::Encoding;
use std::path::Path;
use tracing::{info, instrument, warn};

use super::{normalize, strip_literal, written_level};
use crate::archive::read_csv_file;
use crate::error::{LoadError, Result};
use crate::resolve::coerce::non_blank;
use crate::store::{Store, Transaction, Upsert, Value};

const COLUMNS: &[&str] = &[
    "code",
    "code_display",
    "family",
    "level",
    "title",
    "definition",
    "cross_references",
    "examples",
    "action",
];

/// Load a CIP code file (`CIPFamily, CIPCode, Action, CIPTitle, ...`) into
/// `ref_cip`. Reserved titles and `Moved from` redirects are skipped.
#[instrument(level = "info", skip(store, encodings), fields(path = %path.as_ref().display()))]
pub fn load_cip_reference<S: Store + ?Sized>(
    store: &S,
    path: impl AsRef<Path>,
    encodings: &[&'static Encoding],
) -> Result<usize> {
    let table = read_csv_file(path.as_ref(), encodings)?;
    let col = |name: &str| table.column_index(name);
    let code_idx = col("cipcode").ok_or_else(|| LoadError::unresolved("cipcode", &table.name))?;
    let title_idx = col("ciptitle").ok_or_else(|| LoadError::unresolved("ciptitle", &table.name))?;
    let family_idx = col("cipfamily");
    let definition_idx = col("cipdefinition");
    let xref_idx = col("crossreferences");
    let examples_idx = col("examples");
    let action_idx = col("action");

    let text = |row: &[String], idx: Option<usize>| -> Option<String> {
        idx.and_then(|i| row.get(i)).and_then(|s| non_blank(s)).map(str::to_string)
    };

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for row in &table.rows {
        let title = text(row, Some(title_idx)).unwrap_or_default();
        let action = text(row, action_idx);
        if title.contains("Reserved") || action.as_deref() == Some("Moved from") {
            skipped += 1;
            continue;
        }
        let Some(raw) = row.get(code_idx) else {
            skipped += 1;
            continue;
        };
        let (code, level) = match normalize(raw).and_then(|c| written_level(raw).map(|l| (c, l))) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "skipping CIP row");
                skipped += 1;
                continue;
            }
        };
        let family = text(row, family_idx)
            .map(|f| format!("{:0>2}", strip_literal(&f)))
            .unwrap_or_else(|| code.family.clone());

        rows.push(vec![
            Value::Text(code.normalized.clone()),
            Value::from(strip_literal(raw)),
            Value::Text(family),
            Value::Int(level.digits() as i64),
            Value::Text(title),
            text(row, definition_idx).into(),
            text(row, xref_idx).into(),
            text(row, examples_idx).into(),
            action.into(),
        ]);
    }

    let upsert = Upsert::new("ref_cip", COLUMNS, &["code"]);
    let tx = Transaction::begin(store)?;
    let n = upsert.execute(tx.store(), &rows)?;
    tx.commit()?;
    info!(rows = n, skipped, "CIP reference loaded");
    Ok(n)
}
