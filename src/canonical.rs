//! The canonical NAV payload and the upstream shapes that feed it.
//!
//! Every adapter hands back a [`CanonicalPayload`], whatever its provider
//! answered with. Each known upstream shape has its own conversion below, and
//! [`ensure_canonical`] covers anything else that looks roughly right.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::normalize::{is_truthy, normalize_date, sanitize_nav, value_text};

/// Keys tried, in order, when looking for a NAV inside a loosely shaped entry.
const NAV_KEYS: [&str; 4] = ["nav", "Net_Asset_Value", "close", "Nav"];
const DATE_KEYS: [&str; 2] = ["date", "Date"];
const NAME_KEYS: [&str; 2] = ["scheme_name", "name"];

/// One point of a NAV series. `date` is `DD-MM-YYYY` when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntry {
    pub date: Option<String>,
    pub nav: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMeta {
    pub scheme_name: String,
}

/// Entries are newest first, as the providers deliver them. They are never
/// re-sorted here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPayload {
    pub entries: Vec<CanonicalEntry>,
    pub meta: CanonicalMeta,
}

impl CanonicalPayload {
    pub fn first(&self) -> Option<&CanonicalEntry> {
        self.entries.first()
    }

    pub fn scheme_name(&self) -> Option<&str> {
        Some(self.meta.scheme_name.as_str()).filter(|name| !name.is_empty())
    }
}

// Upstream shapes

/// `GET /mf/<code>` from the historical provider: `{ meta, data }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MfApiResponse {
    #[serde(default)]
    pub meta: Option<MfApiMeta>,
    #[serde(default)]
    pub data: Option<Vec<MfApiPoint>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MfApiMeta {
    #[serde(default)]
    pub scheme_name: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MfApiPoint {
    #[serde(default)]
    pub date: Option<Value>,
    #[serde(default)]
    pub nav: Option<Value>,
}

/// One element of the latest-value provider's array response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LatestNavRecord {
    #[serde(rename = "Scheme_Code", default)]
    pub scheme_code: Option<Value>,
    #[serde(rename = "Scheme_Name", default)]
    pub scheme_name: Option<Value>,
    #[serde(rename = "Date", default)]
    pub date: Option<Value>,
    #[serde(rename = "Net_Asset_Value", default)]
    pub net_asset_value: Option<Value>,
}

impl LatestNavRecord {
    /// The record's scheme code, if it reads as a whole non-negative number.
    pub fn code(&self) -> Option<u32> {
        let text = value_text(self.scheme_code.as_ref()?)?;
        let number: f64 = text.trim().parse().ok()?;
        if number.fract() == 0.0 && number >= 0.0 && number <= u32::MAX as f64 {
            Some(number as u32)
        } else {
            None
        }
    }

    /// The scheme name as text, if there is a non-empty one.
    pub fn name(&self) -> Option<String> {
        self.scheme_name
            .as_ref()
            .and_then(value_text)
            .filter(|name| !name.trim().is_empty())
    }

    pub fn entry(&self) -> CanonicalEntry {
        CanonicalEntry {
            date: self
                .date
                .as_ref()
                .filter(|d| is_truthy(d))
                .and_then(value_text)
                .and_then(|d| normalize_date(&d)),
            nav: self
                .net_asset_value
                .as_ref()
                .and_then(value_text)
                .and_then(|n| sanitize_nav(&n)),
        }
    }
}

/// A provider response before normalization, tagged by the shape it has.
#[derive(Debug, Clone)]
pub enum RawPayload {
    MfApi(MfApiResponse),
    Latest(Vec<LatestNavRecord>),
    /// Anything with an `entries` or `data` array and an optional `meta`.
    Generic(Value),
}

impl RawPayload {
    /// Decode a historical provider body, falling back to the loose shape
    /// when the typed one does not fit.
    pub fn from_mfapi_value(value: Value) -> RawPayload {
        match serde_json::from_value::<MfApiResponse>(value.clone()) {
            Ok(response) => RawPayload::MfApi(response),
            Err(_) => RawPayload::Generic(value),
        }
    }

    pub fn into_canonical(self) -> CanonicalPayload {
        match self {
            RawPayload::MfApi(response) => from_mfapi(response),
            RawPayload::Latest(records) => from_latest(&records),
            RawPayload::Generic(value) => ensure_canonical(Some(&value)),
        }
    }
}

fn from_mfapi(response: MfApiResponse) -> CanonicalPayload {
    let entries = response
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|point| CanonicalEntry {
            date: point
                .date
                .as_ref()
                .filter(|d| is_truthy(d))
                .and_then(value_text)
                .and_then(|d| normalize_date(&d)),
            nav: point
                .nav
                .as_ref()
                .and_then(value_text)
                .and_then(|n| sanitize_nav(&n)),
        })
        .collect();

    let scheme_name = response
        .meta
        .and_then(|meta| meta.scheme_name)
        .filter(is_truthy)
        .and_then(|name| value_text(&name))
        .unwrap_or_default();

    CanonicalPayload {
        entries,
        meta: CanonicalMeta { scheme_name },
    }
}

fn from_latest(records: &[LatestNavRecord]) -> CanonicalPayload {
    let scheme_name = records
        .iter()
        .find_map(LatestNavRecord::name)
        .unwrap_or_default();
    CanonicalPayload {
        entries: records.iter().map(LatestNavRecord::entry).collect(),
        meta: CanonicalMeta { scheme_name },
    }
}

fn first_truthy<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| is_truthy(value))
}

fn loose_entry(raw: &Value) -> CanonicalEntry {
    let Some(object) = raw.as_object() else {
        return CanonicalEntry::default();
    };

    let date = first_truthy(object, &DATE_KEYS)
        .and_then(value_text)
        .and_then(|d| normalize_date(&d));

    // The first key that is present wins, even when it holds null.
    let nav = NAV_KEYS
        .iter()
        .find_map(|key| object.get(*key))
        .and_then(value_text)
        .and_then(|n| sanitize_nav(&n));

    CanonicalEntry { date, nav }
}

/// Coerce a loosely shaped payload into a [`CanonicalPayload`].
///
/// Accepts `entries` or `data` for the series and `scheme_name` or `name`
/// inside `meta`. Never fails: a field that cannot be read becomes `None`
/// inside an entry that is still kept, and a missing payload yields an empty
/// one.
pub fn ensure_canonical(payload: Option<&Value>) -> CanonicalPayload {
    let Some(object) = payload.and_then(Value::as_object) else {
        return CanonicalPayload::default();
    };

    let entries = object
        .get("entries")
        .and_then(Value::as_array)
        .or_else(|| object.get("data").and_then(Value::as_array))
        .map(|raw| raw.iter().map(loose_entry).collect())
        .unwrap_or_default();

    let scheme_name = object
        .get("meta")
        .and_then(Value::as_object)
        .and_then(|meta| first_truthy(meta, &NAME_KEYS))
        .and_then(value_text)
        .unwrap_or_default();

    CanonicalPayload {
        entries,
        meta: CanonicalMeta { scheme_name },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ensure_canonical_handles_missing_payload() {
        let payload = ensure_canonical(None);
        assert!(payload.entries.is_empty());
        assert_eq!(payload.meta.scheme_name, "");

        let payload = ensure_canonical(Some(&json!({})));
        assert!(payload.entries.is_empty());
        assert_eq!(payload.meta.scheme_name, "");

        let payload = ensure_canonical(Some(&json!("not an object")));
        assert_eq!(payload, CanonicalPayload::default());
    }

    #[test]
    fn test_ensure_canonical_keeps_rows_with_bad_fields() {
        let raw = json!({
            "data": [
                { "date": "26-Sep-2025", "nav": "₹12.34" },
                { "date": "garbage", "nav": "n/a" },
                42,
                null
            ],
            "meta": { "name": "Some Fund" }
        });
        let payload = ensure_canonical(Some(&raw));
        assert_eq!(payload.entries.len(), 4);
        assert_eq!(
            payload.entries[0],
            CanonicalEntry {
                date: Some("26-09-2025".to_string()),
                nav: Some("12.34".to_string())
            }
        );
        assert_eq!(payload.entries[1], CanonicalEntry::default());
        assert_eq!(payload.entries[2], CanonicalEntry::default());
        assert_eq!(payload.entries[3], CanonicalEntry::default());
        assert_eq!(payload.meta.scheme_name, "Some Fund");
    }

    #[test]
    fn test_ensure_canonical_key_aliases() {
        let raw = json!({
            "entries": [
                { "Date": "2025-09-26", "Net_Asset_Value": 45.1 },
                { "date": "", "Date": "25 Sep 2025", "close": "44.9" },
                { "date": "24-09-2025", "Nav": "44.7" },
                { "date": "23-09-2025", "nav": null, "close": "44.5" }
            ],
            "data": [{ "date": "01-01-2000", "nav": "1" }],
            "meta": { "scheme_name": "", "name": "Fallback Name" }
        });
        let payload = ensure_canonical(Some(&raw));
        let dates: Vec<_> = payload.entries.iter().map(|e| e.date.as_deref()).collect();
        let navs: Vec<_> = payload.entries.iter().map(|e| e.nav.as_deref()).collect();
        assert_eq!(
            dates,
            vec![
                Some("26-09-2025"),
                Some("25-09-2025"),
                Some("24-09-2025"),
                Some("23-09-2025")
            ]
        );
        assert_eq!(navs, vec![Some("45.1"), Some("44.9"), Some("44.7"), None]);
        assert_eq!(payload.meta.scheme_name, "Fallback Name");
    }

    #[test]
    fn test_ensure_canonical_is_idempotent_on_canonical_input() {
        let payload = CanonicalPayload {
            entries: vec![
                CanonicalEntry {
                    date: Some("01-10-2025".to_string()),
                    nav: Some("12.34".to_string()),
                },
                CanonicalEntry {
                    date: None,
                    nav: Some("12.00".to_string()),
                },
                CanonicalEntry::default(),
            ],
            meta: CanonicalMeta {
                scheme_name: "Parag Parikh Flexi Cap Fund".to_string(),
            },
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(ensure_canonical(Some(&value)), payload);
    }

    #[test]
    fn test_mfapi_shape() {
        let raw = json!({
            "meta": { "scheme_name": "HDFC Index Fund", "fund_house": "HDFC" },
            "data": [
                { "date": "01-10-2025", "nav": "12.34000" },
                { "date": "30-09-2025", "nav": "12.00000" }
            ],
            "status": "SUCCESS"
        });
        let payload = RawPayload::from_mfapi_value(raw).into_canonical();
        assert_eq!(payload.meta.scheme_name, "HDFC Index Fund");
        assert_eq!(payload.entries.len(), 2);
        assert_eq!(payload.entries[1].nav.as_deref(), Some("12.00000"));
    }

    #[test]
    fn test_mfapi_shape_falls_back_to_loose_decoding() {
        // `data` holds a non-object element, which the typed shape rejects.
        let raw = json!({
            "meta": { "scheme_name": "Loose Fund" },
            "data": [{ "date": "01-10-2025", "nav": "12.34" }, "junk"]
        });
        let payload = RawPayload::from_mfapi_value(raw).into_canonical();
        assert_eq!(payload.meta.scheme_name, "Loose Fund");
        assert_eq!(payload.entries.len(), 2);
        assert_eq!(payload.entries[1], CanonicalEntry::default());
    }

    #[test]
    fn test_latest_record() {
        let record: LatestNavRecord = serde_json::from_value(json!({
            "Scheme_Code": "147946",
            "Scheme_Name": "Bandhan Small Cap Fund",
            "Date": "26-Sep-2025",
            "Net_Asset_Value": 45.67
        }))
        .unwrap();
        assert_eq!(record.code(), Some(147946));
        assert_eq!(
            record.entry(),
            CanonicalEntry {
                date: Some("26-09-2025".to_string()),
                nav: Some("45.67".to_string())
            }
        );

        let payload = RawPayload::Latest(vec![record]).into_canonical();
        assert_eq!(payload.meta.scheme_name, "Bandhan Small Cap Fund");
        assert_eq!(payload.entries.len(), 1);
    }

    #[test]
    fn test_latest_record_with_non_text_name_is_kept() {
        let record: LatestNavRecord = serde_json::from_value(json!({
            "Scheme_Code": 147946,
            "Scheme_Name": 12345,
            "Date": "26-Sep-2025",
            "Net_Asset_Value": "45.67"
        }))
        .unwrap();
        assert_eq!(record.name().as_deref(), Some("12345"));
        assert_eq!(record.entry().nav.as_deref(), Some("45.67"));

        let unnamed: LatestNavRecord =
            serde_json::from_value(json!({ "Scheme_Code": 1, "Scheme_Name": null })).unwrap();
        assert_eq!(unnamed.name(), None);
    }

    #[test]
    fn test_latest_record_with_missing_fields() {
        let record = LatestNavRecord::default();
        assert_eq!(record.code(), None);
        assert_eq!(record.entry(), CanonicalEntry::default());
    }
}
