use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::canonical::{CanonicalPayload, RawPayload};
use crate::error::NavError;
use crate::source::{http_client, HistorySource};

const PROVIDER_ID: &str = "MFAPI";

pub const DEFAULT_BASE_URL: &str = "https://api.mfapi.in";

/// Client for the historical NAV provider (`GET <base>/mf/<code>`).
pub struct MfApiClient {
    client: Client,
    base_url: String,
}

impl MfApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn scheme_url(&self, scheme_code: u32) -> String {
        format!("{}/mf/{}", self.base_url, scheme_code)
    }
}

impl Default for MfApiClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl HistorySource for MfApiClient {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch_history(&self, scheme_code: u32) -> Result<CanonicalPayload, NavError> {
        let url = self.scheme_url(scheme_code);
        debug!(%url, "fetching NAV history");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| NavError::network(PROVIDER_ID, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NavError::Status {
                provider: PROVIDER_ID.to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| NavError::decode(PROVIDER_ID, e))?;

        Ok(RawPayload::from_mfapi_value(body).into_canonical())
    }
}
