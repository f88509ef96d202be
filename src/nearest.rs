//! Nearest-date lookup over a NAV series, used to value holdings at past
//! dates ("1 month ago").

use chrono::{Months, NaiveDate};

use crate::canonical::CanonicalEntry;
use crate::normalize::parse_dmy;

/// How many months back the month columns reach.
pub const MONTHS_BACK: usize = 3;

/// The entry dated closest to `target`.
///
/// Entries without a NAV or without a parseable `DD-MM-YYYY` date are
/// skipped. On a tie the earlier entry in the slice wins.
pub fn find_nearest(entries: &[CanonicalEntry], target: NaiveDate) -> Option<&CanonicalEntry> {
    let mut best: Option<(&CanonicalEntry, i64)> = None;
    for entry in entries {
        if entry.nav.is_none() {
            continue;
        }
        let Some(date) = entry.date.as_deref().and_then(parse_dmy) else {
            continue;
        };
        let distance = (date - target).num_days().abs();
        if best.map_or(true, |(_, best_distance)| distance < best_distance) {
            best = Some((entry, distance));
        }
    }
    best.map(|(entry, _)| entry)
}

/// `latest` minus 1, 2 and 3 calendar months. Month ends clamp, so 31 March
/// goes to the last day of February.
pub fn month_targets(latest: NaiveDate) -> [NaiveDate; MONTHS_BACK] {
    [1, 2, 3].map(|n| latest.checked_sub_months(Months::new(n)).unwrap_or(latest))
}

/// The most recent calendar date among `dates`, ignoring unparseable ones.
pub fn latest_date<'a>(dates: impl IntoIterator<Item = &'a str>) -> Option<NaiveDate> {
    dates.into_iter().filter_map(parse_dmy).max()
}
