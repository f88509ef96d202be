use serde::Deserialize;

use crate::error::SchemeError;

/// A holding in one mutual fund scheme, as listed in the scheme file.
#[derive(Debug, Clone, PartialEq)]
pub struct Scheme {
    pub scheme_code: u32,
    pub principal: f64,
    pub unit: f64,
}

impl Scheme {
    pub fn new(scheme_code: u32, principal: f64, unit: f64) -> Self {
        Scheme {
            scheme_code,
            principal,
            unit,
        }
    }

    /// Name shown for a scheme whose data could not be fetched.
    pub fn placeholder_name(&self) -> String {
        format!("Code {}", self.scheme_code)
    }
}

// Scheme files are hand written, so numbers may arrive quoted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawScheme {
    scheme_code: NumberOrText,
    principal: NumberOrText,
    unit: NumberOrText,
}

fn coerce(field: &'static str, raw: NumberOrText) -> Result<f64, SchemeError> {
    let value = match raw {
        NumberOrText::Number(n) => n,
        NumberOrText::Text(s) => s
            .trim()
            .replace(',', "")
            .parse::<f64>()
            .map_err(|_| SchemeError::InvalidNumber {
                field,
                value: s.clone(),
            })?,
    };
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SchemeError::InvalidNumber {
            field,
            value: value.to_string(),
        })
    }
}

impl TryFrom<RawScheme> for Scheme {
    type Error = SchemeError;

    fn try_from(raw: RawScheme) -> Result<Self, Self::Error> {
        let code = coerce("scheme_code", raw.scheme_code)?;
        if code.fract() != 0.0 || code <= 0.0 || code > u32::MAX as f64 {
            return Err(SchemeError::InvalidCode(code.to_string()));
        }
        Ok(Scheme {
            scheme_code: code as u32,
            principal: coerce("principal", raw.principal)?,
            unit: coerce("unit", raw.unit)?,
        })
    }
}

/// Parse the JSON scheme list: `[{ "scheme_code", "principal", "unit" }, ...]`.
pub fn from_string(json: &str) -> Result<Vec<Scheme>, SchemeError> {
    let raw: Vec<RawScheme> = serde_json::from_str(json)?;
    raw.into_iter().map(Scheme::try_from).collect()
}
