//! Error types for mf_tracker
//!
//! Only transport and configuration problems become errors. Field-level
//! parse failures are absorbed into `None` values by the normalizer and never
//! show up here.

use thiserror::Error;

/// Failures talking to a NAV provider, or using the adapter layer wrongly.
///
/// `Clone` so a single failed request can be handed to every caller that was
/// waiting on it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NavError {
    #[error("Network error from {provider}: {message}")]
    Network { provider: String, message: String },

    #[error("{provider} answered with HTTP {status}")]
    Status { provider: String, status: u16 },

    #[error("Could not decode {provider} response: {message}")]
    Decode { provider: String, message: String },

    #[error("No credential available for {0}")]
    MissingCredential(String),

    #[error("Unknown data adapter: {0}")]
    UnknownAdapter(String),
}

impl NavError {
    pub fn network(provider: &str, err: impl std::fmt::Display) -> Self {
        NavError::Network {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }

    pub fn decode(provider: &str, err: impl std::fmt::Display) -> Self {
        NavError::Decode {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }
}

/// Validation errors for the scheme file.
///
/// These are shown directly to users and should be clear and actionable.
#[derive(Debug, Error)]
pub enum SchemeError {
    #[error("Scheme file is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Scheme code must be a positive integer, got {0}")]
    InvalidCode(String),

    #[error("Invalid number for {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },
}
