//! Lenient value parsing shared by source adapters.
//!
//! Scraped text is noisy (`"£68,500"`, `" 12.5% "`), so these helpers strip
//! the usual decorations and fall back to a caller-chosen default instead of
//! failing.

/// Collapse runs of whitespace into single spaces and trim.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a float, ignoring `,`, `£` and `%`.
pub fn parse_float(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '£' | '%'))
        .collect();
    cleaned.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a float or return `default`.
pub fn float_or(text: &str, default: f64) -> f64 {
    parse_float(text).unwrap_or(default)
}

/// Parse an integer, truncating any fractional part.
pub fn parse_int(text: &str) -> Option<i64> {
    parse_float(text).map(|v| v.trunc() as i64)
}

/// Parse an integer or return `default`.
pub fn int_or(text: &str, default: i64) -> i64 {
    parse_int(text).unwrap_or(default)
}

/// `part / total` as a percentage rounded to one decimal; `0.0` when the
/// total is zero.
pub fn pct(part: f64, total: f64) -> f64 {
    if total == 0.0 {
        return 0.0;
    }
    (part / total * 1000.0).round() / 10.0
}
