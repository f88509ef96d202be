//! Date and NAV normalization.
//!
//! Upstream providers disagree on how they spell a date (`26-09-2025`,
//! `26-Sep-2025`, `2025-09-26T00:00:00`, `26 September 2025`, ...) and on
//! how they spell a NAV (`"12.34"`, `12.34`, `"₹1,234.50"`). Everything here
//! is a pure function that maps those spellings onto the canonical forms and
//! returns `None` instead of failing.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// The canonical date layout, `DD-MM-YYYY`.
pub const DMY_FORMAT: &str = "%d-%m-%Y";

static EXACT_DMY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}-\d{2}-\d{4}$").unwrap());
static DAY_MON_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})-([A-Za-z]{3})-(\d{4})$").unwrap());
static ISO_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})").unwrap());
static SPACED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})\s+([A-Za-z]+)\s+(\d{4})$").unwrap());
static NAV_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9.\-]").unwrap());
static LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(\d+(\.\d*)?|\.\d+)").unwrap());

const MONTHS: [(&str, &str); 12] = [
    ("jan", "01"),
    ("feb", "02"),
    ("mar", "03"),
    ("apr", "04"),
    ("may", "05"),
    ("jun", "06"),
    ("jul", "07"),
    ("aug", "08"),
    ("sep", "09"),
    ("oct", "10"),
    ("nov", "11"),
    ("dec", "12"),
];

// Layouts tried when none of the explicit rules match.
const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%a %b %d %Y",
    "%d %B, %Y",
];

const FALLBACK_DATETIME_FORMATS: &[&str] = &[
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%b %d, %Y %H:%M:%S",
];

fn month_number(abbrev: &str) -> Option<&'static str> {
    let lower = abbrev.to_lowercase();
    MONTHS
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, number)| *number)
}

fn pad_day(day: &str) -> String {
    format!("{day:0>2}")
}

/// Re-express any supported date spelling as `DD-MM-YYYY`.
///
/// Rules are tried from the strictest to the loosest and the first match
/// wins: exact `DD-MM-YYYY`, `DD-MMM-YYYY`, ISO (date part only, no timezone
/// shift), `D Month YYYY`, then a handful of common free-text layouts.
///
/// An unknown three letter month in the `DD-MMM-YYYY` form is passed through
/// untouched, so `26-Foo-2025` stays `26-Foo-2025`.
pub fn normalize_date(input: &str) -> Option<String> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if EXACT_DMY.is_match(s) {
        return Some(s.to_string());
    }

    if let Some(caps) = DAY_MON_YEAR.captures(s) {
        let month = month_number(&caps[2]).unwrap_or(&caps[2]);
        return Some(format!("{}-{}-{}", pad_day(&caps[1]), month, &caps[3]));
    }

    if let Some(caps) = ISO_PREFIX.captures(s) {
        return Some(format!("{}-{}-{}", &caps[3], &caps[2], &caps[1]));
    }

    if let Some(caps) = SPACED.captures(s) {
        let abbrev: String = caps[2].chars().take(3).collect();
        let month = month_number(&abbrev).unwrap_or("01");
        return Some(format!("{}-{}-{}", pad_day(&caps[1]), month, &caps[3]));
    }

    parse_free_text(s).map(format_dmy)
}

fn parse_free_text(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for layout in FALLBACK_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, layout) {
            return Some(dt.date());
        }
    }
    FALLBACK_DATE_FORMATS
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(s, layout).ok())
}

/// Strip everything but digits, `.` and `-` from a NAV-like string.
///
/// Does not check that the result is a well-formed number: `"12.3.4"` comes
/// back as `"12.3.4"`. Use [`parse_nav`] to get a number out of it.
pub fn sanitize_nav(input: &str) -> Option<String> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    let cleaned = NAV_NOISE.replace_all(s, "");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.into_owned())
    }
}

/// Best-effort numeric read of a sanitized NAV string.
///
/// Reads the longest numeric prefix, so `"12.3.4"` is `12.3`. Anything that
/// does not start with a number, or is not finite, is `None`.
pub fn parse_nav(input: &str) -> Option<f64> {
    let cleaned = sanitize_nav(input)?;
    let prefix = LEADING_NUMBER.find(&cleaned)?;
    prefix
        .as_str()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

/// Text form of a JSON scalar, `None` for `null`.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Whether a JSON value counts as "present" for key fallbacks.
///
/// `null`, `false`, `0` and the empty string are all treated as absent.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        _ => true,
    }
}

/// Parse a canonical `DD-MM-YYYY` string into a calendar date.
pub fn parse_dmy(input: &str) -> Option<NaiveDate> {
    let mut parts = input.split('-');
    let (day, month, year) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(
        year.trim().parse().ok()?,
        month.trim().parse().ok()?,
        day.trim().parse().ok()?,
    )
}

pub fn format_dmy(date: NaiveDate) -> String {
    date.format(DMY_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_date_variants_agree() {
        let expected = Some("26-09-2025".to_string());
        assert_eq!(normalize_date("26-09-2025"), expected);
        assert_eq!(normalize_date("26-Sep-2025"), expected);
        assert_eq!(normalize_date("26-SEP-2025"), expected);
        assert_eq!(normalize_date("2025-09-26"), expected);
        assert_eq!(normalize_date("2025-09-26T18:30:00.000Z"), expected);
        assert_eq!(normalize_date("26 September 2025"), expected);
        assert_eq!(normalize_date("26 Sep 2025"), expected);
    }

    #[test]
    fn test_normalize_date_pads_day() {
        assert_eq!(normalize_date("5-Oct-2025").as_deref(), Some("05-10-2025"));
        assert_eq!(normalize_date("5 October 2025").as_deref(), Some("05-10-2025"));
    }

    #[test]
    fn test_normalize_date_unknown_abbreviation_passes_through() {
        assert_eq!(normalize_date("26-Foo-2025").as_deref(), Some("26-Foo-2025"));
    }

    #[test]
    fn test_normalize_date_fallbacks() {
        assert_eq!(normalize_date("2025/09/26").as_deref(), Some("26-09-2025"));
        assert_eq!(normalize_date("09/26/2025").as_deref(), Some("26-09-2025"));
        assert_eq!(normalize_date("September 26, 2025").as_deref(), Some("26-09-2025"));
        assert_eq!(
            normalize_date("Fri, 26 Sep 2025 10:00:00 +0000").as_deref(),
            Some("26-09-2025")
        );
    }

    #[test]
    fn test_normalize_date_rejects_garbage() {
        assert_eq!(normalize_date(""), None);
        assert_eq!(normalize_date("   "), None);
        assert_eq!(normalize_date("not a date"), None);
        assert_eq!(normalize_date("N.A."), None);
    }

    #[test]
    fn test_sanitize_nav() {
        assert_eq!(sanitize_nav("12.34").as_deref(), Some("12.34"));
        assert_eq!(sanitize_nav("₹1,234.50").as_deref(), Some("1234.50"));
        assert_eq!(sanitize_nav("-0.5 INR").as_deref(), Some("-0.5"));
        assert_eq!(sanitize_nav("12.3.4").as_deref(), Some("12.3.4"));
        assert_eq!(sanitize_nav(""), None);
        assert_eq!(sanitize_nav("N.A."), Some(".".to_string()));
        assert_eq!(sanitize_nav("n/a"), None);
    }

    #[test]
    fn test_sanitize_nav_is_idempotent() {
        let once = sanitize_nav("₹ 98,765.4321").unwrap();
        assert_eq!(sanitize_nav(&once).as_deref(), Some(once.as_str()));
    }

    #[test]
    fn test_parse_nav_guards_non_numbers() {
        assert_eq!(parse_nav("12.34"), Some(12.34));
        assert_eq!(parse_nav("₹1,234.50"), Some(1234.5));
        assert_eq!(parse_nav("12.3.4"), Some(12.3));
        assert_eq!(parse_nav("."), None);
        assert_eq!(parse_nav("-"), None);
        assert_eq!(parse_nav(""), None);
    }

    #[test]
    fn test_value_text() {
        assert_eq!(value_text(&json!(null)), None);
        assert_eq!(value_text(&json!("12.5")).as_deref(), Some("12.5"));
        assert_eq!(value_text(&json!(12.5)).as_deref(), Some("12.5"));
        assert_eq!(value_text(&json!(147946)).as_deref(), Some("147946"));
    }

    #[test]
    fn test_is_truthy() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!("26-09-2025")));
        assert!(is_truthy(&json!(1)));
    }

    #[test]
    fn test_parse_and_format_dmy() {
        let date = parse_dmy("01-10-2025").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 10, 1).unwrap());
        assert_eq!(format_dmy(date), "01-10-2025");
        assert_eq!(parse_dmy("31-02-2025"), None);
        assert_eq!(parse_dmy("26-Foo-2025"), None);
        assert_eq!(parse_dmy("2025"), None);
    }
}
