/// Byte-order-mark renderings seen at the start of historic header rows.
///
/// The raw U+FEFF; its UTF-8 bytes misdecoded as Latin-1/windows-1252; that
/// misdecoding re-encoded and misdecoded again; UTF-16 BOMs misdecoded as
/// single-byte text; and the replacement character left by lossy decoding.
const BOM_FORMS: &[&str] = &[
    "\u{feff}",
    "\u{ef}\u{bb}\u{bf}",
    "\u{c3}\u{af}\u{c2}\u{bb}\u{c2}\u{bf}",
    "\u{ff}\u{fe}",
    "\u{fe}\u{ff}",
    "\u{fffd}",
];

/// Canonical form of one header name: BOM forms stripped, whitespace
/// trimmed, literal surrounding double quotes removed, lowercased.
pub fn cleanse_header(raw: &str) -> String {
    let mut name = raw;
    loop {
        let before = name.len();
        name = name.trim();
        for bom in BOM_FORMS {
            if let Some(rest) = name.strip_prefix(bom) {
                name = rest;
            }
        }
        if name.len() >= 2 && name.starts_with('"') && name.ends_with('"') {
            name = &name[1..name.len() - 1];
        }
        if name.len() == before {
            break;
        }
    }
    name.to_lowercase()
}

pub fn cleanse_headers<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter().map(|h| cleanse_header(h.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_every_bom_rendering() {
        for bom in BOM_FORMS {
            assert_eq!(cleanse_header(&format!("{bom}UNITID")), "unitid", "form {bom:?}");
        }
    }

    #[test]
    fn strips_stacked_boms_quotes_and_whitespace() {
        assert_eq!(cleanse_header(" \u{feff}\u{ef}\u{bb}\u{bf}\"InstNM\" "), "instnm");
        assert_eq!(cleanse_header("\"\u{feff}unitid\""), "unitid");
    }

    #[test]
    fn leaves_interior_text_alone() {
        assert_eq!(cleanse_header("EF2MORT"), "ef2mort");
        assert_eq!(cleanse_header("a\u{feff}b"), "a\u{feff}b");
    }

    #[test]
    fn cleanses_a_whole_row() {
        assert_eq!(
            cleanse_headers(["\u{feff}UNITID", "InstNM"]),
            vec!["unitid".to_string(), "instnm".to_string()]
        );
    }
}
