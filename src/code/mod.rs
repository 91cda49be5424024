//! Code Normalizer for hierarchical classification (CIP) codes.
//!
//! `FF` is a two-digit family, `FF.MM` a four-digit series, `FF.MMMM` a
//! six-digit program. Normalized form pads the family to two digits and the
//! fraction to four.

pub mod reference;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LoadError, Result};

pub use reference::load_cip_reference;

static CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})(?:\.(\d{1,4}))?$").expect("static regex"));

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Coarse,
    Mid,
    Fine,
}

impl Level {
    pub fn as_str(&self) -> &str {
        match self {
            Level::Coarse => "coarse",
            Level::Mid => "mid",
            Level::Fine => "fine",
        }
    }

    /// Digit count of a code at this level (2, 4 or 6).
    pub fn digits(&self) -> u8 {
        match self {
            Level::Coarse => 2,
            Level::Mid => 4,
            Level::Fine => 6,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedCode {
    pub normalized: String,
    pub family: String,
    pub level: Level,
}

impl NormalizedCode {
    /// The code cut (or zero-extended) to `level`, for comparing codes
    /// reported at different granularities.
    pub fn at_level(&self, level: Level) -> String {
        match level {
            Level::Coarse => self.family.clone(),
            Level::Mid => format!("{}.{}", self.family, &self.fraction()[..2]),
            Level::Fine => format!("{}.{}", self.family, self.fraction()),
        }
    }

    fn fraction(&self) -> String {
        let frac = self.normalized.split_once('.').map(|(_, f)| f).unwrap_or("");
        format!("{frac:0<4}")
    }
}

/// Remove the spreadsheet text-forcing wrapper (`="01.0101"`) and quotes.
pub fn strip_literal(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix('=') {
        s = rest.trim();
    }
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            s = &s[1..s.len() - 1];
        }
    }
    s.trim()
}

/// Canonicalize a raw classification code.
///
/// A fraction of up to two characters is a mid code; a longer one is fine
/// unless its padded form ends in `00`, which keeps the normalized form a
/// fixed point (`01.01` → `01.0100` → mid).
pub fn normalize(raw: &str) -> Result<NormalizedCode> {
    let code = strip_literal(raw);
    let caps = CODE_RE
        .captures(code)
        .ok_or_else(|| LoadError::InvalidCode(raw.to_string()))?;
    let family = format!("{:0>2}", &caps[1]);

    let (normalized, level) = match caps.get(2) {
        None => (family.clone(), Level::Coarse),
        Some(frac) => {
            let frac = frac.as_str();
            let padded = format!("{frac:0<4}");
            let level = if frac.len() <= 2 || padded.ends_with("00") {
                Level::Mid
            } else {
                Level::Fine
            };
            (format!("{family}.{padded}"), level)
        }
    };

    Ok(NormalizedCode {
        normalized,
        family,
        level,
    })
}

/// Level as written: a two-character fraction is mid, any longer one fine.
/// Reference files list `01.0000` as a six-digit program, which `normalize`
/// would fold to mid.
pub fn written_level(raw: &str) -> Result<Level> {
    let code = strip_literal(raw);
    let caps = CODE_RE
        .captures(code)
        .ok_or_else(|| LoadError::InvalidCode(raw.to_string()))?;
    Ok(match caps.get(2).map(|f| f.as_str().len()) {
        None => Level::Coarse,
        Some(n) if n <= 2 => Level::Mid,
        Some(_) => Level::Fine,
    })
}

/// Pad or truncate an arbitrary reported code to `level`; `None` if invalid.
pub fn code_at_level(raw: &str, level: Level) -> Option<String> {
    normalize(raw).ok().map(|c| c.at_level(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_level_follows_the_raw_fraction() {
        assert_eq!(written_level("01").unwrap(), Level::Coarse);
        assert_eq!(written_level("01.00").unwrap(), Level::Mid);
        assert_eq!(written_level("=\"01.0000\"").unwrap(), Level::Fine);
        assert_eq!(normalize("01.0000").unwrap().level, Level::Mid);
        assert!(written_level("x1").is_err());
    }

    #[test]
    fn spreadsheet_literal_fine_code() {
        let c = normalize("=\"01.0101\"").unwrap();
        assert_eq!(c.normalized, "01.0101");
        assert_eq!(c.family, "01");
        assert_eq!(c.level, Level::Fine);
    }

    #[test]
    fn levels_follow_digit_structure() {
        assert_eq!(normalize("01").unwrap().level, Level::Coarse);
        assert_eq!(normalize("01.01").unwrap().level, Level::Mid);
        assert_eq!(normalize("01.0101").unwrap().level, Level::Fine);
        assert_eq!(normalize("1.1").unwrap().normalized, "01.1000");
        assert_eq!(normalize("5").unwrap().normalized, "05");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["01", "1", "01.01", "1.1", "01.0101", "=\"52.0201\"", "'13.1'", "42.2799"] {
            let once = normalize(raw).unwrap();
            let twice = normalize(&once.normalized).unwrap();
            assert_eq!(once, twice, "raw {raw}");
        }
    }

    #[test]
    fn invalid_codes_are_rejected() {
        for raw in ["", "ab", "01.", "001.01", "01.01010", "01-01"] {
            assert!(matches!(normalize(raw), Err(LoadError::InvalidCode(_))), "raw {raw:?}");
        }
    }

    #[test]
    fn comparing_at_a_chosen_level() {
        let c = normalize("52.0201").unwrap();
        assert_eq!(c.at_level(Level::Coarse), "52");
        assert_eq!(c.at_level(Level::Mid), "52.02");
        assert_eq!(c.at_level(Level::Fine), "52.0201");
        assert_eq!(code_at_level("52.02", Level::Fine).as_deref(), Some("52.0200"));
        assert_eq!(code_at_level("zz", Level::Mid), None);
    }
}
