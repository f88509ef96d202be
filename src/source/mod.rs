//! HTTP clients for the upstream NAV providers.
//!
//! Two providers are used:
//! - a historical one that serves the full NAV series of a scheme at a
//!   per-code URL ([`mfapi::MfApiClient`])
//! - a "latest values" one that accepts a comma separated batch of codes and
//!   needs an API key ([`rapidapi::RapidApiClient`])
//!
//! Both sit behind traits so the adapters and the coordinator can be
//! exercised with in-process fakes.

pub mod mfapi;
pub mod rapidapi;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::canonical::{CanonicalPayload, LatestNavRecord};
use crate::error::NavError;

/// Default HTTP request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn http_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Source of a scheme's full NAV history.
#[async_trait]
pub trait HistorySource: Send + Sync {
    fn id(&self) -> &'static str;

    async fn fetch_history(&self, scheme_code: u32) -> Result<CanonicalPayload, NavError>;
}

/// Source of the most recent NAV for a batch of schemes.
#[async_trait]
pub trait LatestSource: Send + Sync {
    fn id(&self) -> &'static str;

    /// One request for the whole batch. The answer may hold records for any
    /// subset of `scheme_codes`, in any order.
    async fn fetch_latest(&self, scheme_codes: &[u32]) -> Result<Vec<LatestNavRecord>, NavError>;
}
