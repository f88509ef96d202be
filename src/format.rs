//! Display helpers for figures and dates. Every helper renders a missing or
//! non-finite value as `-`.

use comfy_table::Color;

const MISSING: &str = "-";

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn group_thousands(integer_part: &str) -> String {
    integer_part
        .chars()
        .rev()
        .collect::<Vec<_>>()
        .chunks(3)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(",")
        .chars()
        .rev()
        .collect()
}

// `formatted` is a plain `{:.N}` rendering, sign included.
fn with_commas(formatted: &str) -> String {
    let (sign, digits) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted),
    };
    match digits.split_once('.') {
        Some((integer_part, decimal_part)) => {
            format!("{sign}{}.{decimal_part}", group_thousands(integer_part))
        }
        None => format!("{sign}{}", group_thousands(digits)),
    }
}

/// `1234.5` → `1,234.50`
pub fn fmt_amount(value: Option<f64>) -> String {
    match finite(value) {
        Some(v) => with_commas(&format!("{v:.2}")),
        None => MISSING.to_string(),
    }
}

/// Rounded up to a whole number: `1234.01` → `1,235`
pub fn fmt_round_up(value: Option<f64>) -> String {
    match finite(value) {
        Some(v) => with_commas(&format!("{:.0}", v.ceil() + 0.0)),
        None => MISSING.to_string(),
    }
}

/// Unit counts keep up to three decimals, without trailing zeros.
pub fn fmt_unit(value: Option<f64>) -> String {
    match finite(value) {
        Some(v) => {
            let formatted = format!("{v:.3}");
            let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
            with_commas(trimmed)
        }
        None => MISSING.to_string(),
    }
}

pub fn fmt_pct(value: Option<f64>) -> String {
    match finite(value) {
        Some(v) => format!("{v:.2}%"),
        None => MISSING.to_string(),
    }
}

fn split_dmy(date: &str) -> Option<(&str, String)> {
    let mut parts = date.split('-');
    let (day, month, _year) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let label = month
        .parse::<usize>()
        .ok()
        .and_then(|m| m.checked_sub(1))
        .and_then(|i| MONTH_ABBREVIATIONS.get(i))
        .map_or_else(|| month.to_string(), |m| m.to_string());
    Some((day, label))
}

/// `26-09-2025` → `26 Sep`. Anything not shaped like `DD-MM-YYYY` is
/// returned as is.
pub fn date_short(date: Option<&str>) -> String {
    match date.filter(|d| !d.is_empty()) {
        Some(d) => split_dmy(d)
            .map_or_else(|| d.to_string(), |(day, month)| format!("{day} {month}")),
        None => MISSING.to_string(),
    }
}

/// `26-09-2025` → `26-Sep`, for column headers.
pub fn month_label_short(date: Option<&str>) -> String {
    match date.filter(|d| !d.is_empty()) {
        Some(d) => split_dmy(d)
            .map_or_else(|| d.to_string(), |(day, month)| format!("{day}-{month}")),
        None => MISSING.to_string(),
    }
}

/// Scheme names arrive in capitals: `BANDHAN SMALL CAP FUND` → `Bandhan Small Cap Fund`.
pub fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Green for gains, red for losses, nothing for zero or missing.
pub fn profit_color(value: Option<f64>) -> Option<Color> {
    match finite(value) {
        Some(v) if v > 0.0 => Some(Color::Green),
        Some(v) if v < 0.0 => Some(Color::Red),
        _ => None,
    }
}
