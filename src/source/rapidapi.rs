use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::canonical::LatestNavRecord;
use crate::credentials::CredentialProvider;
use crate::error::NavError;
use crate::source::{http_client, LatestSource};

const PROVIDER_ID: &str = "RAPIDAPI_LATEST";

pub const DEFAULT_HOST: &str = "latest-mutual-fund-nav.p.rapidapi.com";

/// Client for the "latest NAV" provider.
///
/// `GET https://<host>/latest?Scheme_Type=Open&Scheme_Code=<a,b,c>` with the
/// key and host passed as `x-rapidapi-*` headers.
pub struct RapidApiClient {
    client: Client,
    host: String,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl RapidApiClient {
    pub fn new(host: impl Into<String>, credentials: Arc<dyn CredentialProvider>) -> Self {
        let host: String = host.into();
        let base_url = format!("https://{host}");
        Self {
            client: http_client(),
            host,
            base_url,
            credentials,
        }
    }

    /// Send requests somewhere other than `https://<host>`.
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

fn join_codes(scheme_codes: &[u32]) -> String {
    scheme_codes
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl LatestSource for RapidApiClient {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch_latest(&self, scheme_codes: &[u32]) -> Result<Vec<LatestNavRecord>, NavError> {
        let key = self
            .credentials
            .credential()
            .ok_or_else(|| NavError::MissingCredential(PROVIDER_ID.to_string()))?;
        let codes = join_codes(scheme_codes);
        debug!(%codes, host = %self.host, "fetching latest NAVs");

        let response = self
            .client
            .get(format!("{}/latest", self.base_url))
            .query(&[("Scheme_Type", "Open"), ("Scheme_Code", codes.as_str())])
            .header("x-rapidapi-key", key)
            .header("x-rapidapi-host", &self.host)
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

        let Value::Array(items) = body else {
            warn!(%codes, "latest NAV response was not an array");
            return Ok(Vec::new());
        };

        Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<LatestNavRecord>(item).ok())
            .collect())
    }
}
