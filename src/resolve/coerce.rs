//! Best-effort numeric coercion. Nothing here fails: a value that does not
//! parse is absent.

/// Trim whitespace and strip outer quotes if present.
pub fn clean_str(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    }
}

/// Cleaned text, or `None` when blank.
pub fn non_blank(raw: &str) -> Option<&str> {
    let s = clean_str(raw);
    (!s.is_empty()).then_some(s)
}

/// `""`, `"."` (the historic missing-value marker) and non-numeric text are absent.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = clean_str(raw);
    if s.is_empty() || s == "." {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integer view; accepts `"12.0"` but not `"12.5"`.
pub fn parse_int(raw: &str) -> Option<i64> {
    let s = clean_str(raw);
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    parse_number(s)
        .filter(|v| v.fract() == 0.0 && v.abs() < i64::MAX as f64)
        .map(|v| v as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blanks_and_markers_are_absent() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("  "), None);
        assert_eq!(parse_number("."), None);
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn numbers_parse_through_quotes_and_padding() {
        assert_eq!(parse_number(" 42 "), Some(42.0));
        assert_eq!(parse_number("\"-3.5\""), Some(-3.5));
        assert_eq!(parse_number("0"), Some(0.0));
    }

    #[test]
    fn integers() {
        assert_eq!(parse_int("100654"), Some(100654));
        assert_eq!(parse_int("100654.0"), Some(100654));
        assert_eq!(parse_int("1.5"), None);
        assert_eq!(parse_int("x"), None);
    }

    #[test]
    fn clean_str_strips_outer_quotes_only() {
        assert_eq!(clean_str(" \"Example University\" "), "Example University");
        assert_eq!(clean_str("a\"b"), "a\"b");
        assert_eq!(non_blank("\"\""), None);
    }
}
