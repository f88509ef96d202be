//! Source adapters: the named ways of turning a [`Scheme`] into a
//! [`CanonicalPayload`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::canonical::{CanonicalPayload, LatestNavRecord, RawPayload};
use crate::coordinator::{Coordinator, HistoryCache, LatestBatcher};
use crate::credentials::CredentialProvider;
use crate::error::NavError;
use crate::scheme::Scheme;

pub const MFAPI: &str = "mfapi";
pub const HYBRID: &str = "hybrid";

#[async_trait]
pub trait NavAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, scheme: &Scheme) -> Result<CanonicalPayload, NavError>;
}

/// Full history from the historical provider, nothing else.
pub struct MfApiAdapter {
    history: Arc<HistoryCache>,
}

impl MfApiAdapter {
    pub fn new(history: Arc<HistoryCache>) -> Self {
        Self { history }
    }
}

#[async_trait]
impl NavAdapter for MfApiAdapter {
    fn name(&self) -> &'static str {
        MFAPI
    }

    async fn fetch(&self, scheme: &Scheme) -> Result<CanonicalPayload, NavError> {
        self.history.fetch(scheme.scheme_code).await
    }
}

/// History from the historical provider, topped up with the latest-value
/// provider's newest NAV when a credential is available.
///
/// Never fails: a failed history becomes an empty payload and a failed
/// latest lookup is simply left out.
pub struct HybridAdapter {
    history: Arc<HistoryCache>,
    latest: LatestBatcher,
    credentials: Arc<dyn CredentialProvider>,
}

impl HybridAdapter {
    pub fn new(
        history: Arc<HistoryCache>,
        latest: LatestBatcher,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            history,
            latest,
            credentials,
        }
    }

    async fn historical(&self, scheme_code: u32) -> CanonicalPayload {
        match self.history.fetch(scheme_code).await {
            Ok(payload) => payload,
            Err(e) => {
                let source = self.history.source_id();
                warn!(scheme_code, source, error = %e, "history unavailable");
                CanonicalPayload::default()
            }
        }
    }

    async fn newest(&self, scheme_code: u32) -> Option<LatestNavRecord> {
        if self.credentials.credential().is_none() {
            debug!(scheme_code, "no latest-value credential, using history only");
            return None;
        }
        match self.latest.latest(scheme_code).await {
            Ok(record) => record,
            Err(e) => {
                warn!(scheme_code, error = %e, "latest NAV unavailable, using history only");
                None
            }
        }
    }
}

#[async_trait]
impl NavAdapter for HybridAdapter {
    fn name(&self) -> &'static str {
        HYBRID
    }

    async fn fetch(&self, scheme: &Scheme) -> Result<CanonicalPayload, NavError> {
        let (historical, newest) = futures::join!(
            self.historical(scheme.scheme_code),
            self.newest(scheme.scheme_code)
        );
        Ok(match newest {
            Some(record) => merge_latest(historical, &record),
            None => historical,
        })
    }
}

/// Fold a latest-value record into a historical payload.
///
/// A record dated differently from the newest historical entry goes in
/// front of it; one with the same date replaces it. The historical scheme
/// name wins when it has one.
pub fn merge_latest(historical: CanonicalPayload, record: &LatestNavRecord) -> CanonicalPayload {
    let latest = RawPayload::Latest(vec![record.clone()]).into_canonical();
    let mut merged = historical;

    if let Some(entry) = latest.entries.into_iter().next() {
        match merged.entries.first_mut() {
            Some(first) if first.date == entry.date => *first = entry,
            _ => merged.entries.insert(0, entry),
        }
    }
    if merged.meta.scheme_name.is_empty() {
        merged.meta.scheme_name = latest.meta.scheme_name;
    }
    merged
}

/// The adapters available by name, in registration order.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn NavAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `mfapi` and `hybrid`, sharing one coordinator.
    pub fn standard(coordinator: &Coordinator, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self::new()
            .register(Arc::new(MfApiAdapter::new(coordinator.history())))
            .register(Arc::new(HybridAdapter::new(
                coordinator.history(),
                coordinator.latest(),
                credentials,
            )))
    }

    pub fn register(mut self, adapter: Arc<dyn NavAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn available(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|adapter| adapter.name()).collect()
    }

    /// The adapter to use when none is named: `preferred` if given, else
    /// `hybrid`, else `mfapi`, else whatever was registered first.
    pub fn default_adapter(&self, preferred: Option<&str>) -> Option<String> {
        if let Some(name) = preferred.map(str::trim).filter(|name| !name.is_empty()) {
            return Some(name.to_string());
        }
        let available = self.available();
        [HYBRID, MFAPI]
            .into_iter()
            .find(|name| available.contains(name))
            .or_else(|| available.first().copied())
            .map(str::to_string)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn NavAdapter>, NavError> {
        self.adapters
            .iter()
            .find(|adapter| adapter.name() == name)
            .cloned()
            .ok_or_else(|| NavError::UnknownAdapter(name.to_string()))
    }

    /// Fetch one scheme through the named adapter.
    ///
    /// An unknown adapter name is a caller mistake and is returned as
    /// [`NavError::UnknownAdapter`] before anything is fetched.
    pub async fn fetch_scheme_data(
        &self,
        adapter: &str,
        scheme: &Scheme,
    ) -> Result<CanonicalPayload, NavError> {
        self.get(adapter)?.fetch(scheme).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::CanonicalEntry;
    use crate::coordinator::testing::*;
    use crate::credentials::StaticCredential;
    use std::sync::atomic::AtomicUsize;

    fn history_payload() -> CanonicalPayload {
        payload(
            "Bandhan Small Cap Fund",
            &[("26-09-2025", "45.10"), ("25-09-2025", "44.90")],
        )
    }

    fn registry(
        history: Arc<FakeHistory>,
        latest: Arc<FakeLatest>,
        key: Option<&str>,
    ) -> AdapterRegistry {
        let coordinator = Coordinator::new(history, latest);
        AdapterRegistry::standard(
            &coordinator,
            Arc::new(StaticCredential(key.map(str::to_string))),
        )
    }

    #[test]
    fn test_merge_same_date_replaces_first_entry() {
        let merged = merge_latest(
            history_payload(),
            &record(147946, "Latest Name", "26-09-2025", "45.67"),
        );
        assert_eq!(merged.entries.len(), 2);
        assert_eq!(
            merged.entries[0],
            CanonicalEntry {
                date: Some("26-09-2025".to_string()),
                nav: Some("45.67".to_string())
            }
        );
        assert_eq!(merged.meta.scheme_name, "Bandhan Small Cap Fund");
    }

    #[test]
    fn test_merge_newer_date_is_prepended() {
        let merged = merge_latest(
            history_payload(),
            &record(147946, "Latest Name", "27-09-2025", "45.99"),
        );
        assert_eq!(merged.entries.len(), 3);
        assert_eq!(merged.entries[0].date.as_deref(), Some("27-09-2025"));
        assert_eq!(merged.entries[0].nav.as_deref(), Some("45.99"));
        assert_eq!(merged.entries[1].date.as_deref(), Some("26-09-2025"));
        assert_eq!(merged.entries[1].nav.as_deref(), Some("45.10"));
    }

    #[test]
    fn test_merge_compares_normalized_dates() {
        let merged = merge_latest(
            history_payload(),
            &record(147946, "Latest Name", "26-Sep-2025", "45.67"),
        );
        assert_eq!(merged.entries.len(), 2);
        assert_eq!(merged.entries[0].nav.as_deref(), Some("45.67"));
    }

    #[test]
    fn test_merge_into_empty_history_takes_latest_name() {
        let merged = merge_latest(
            CanonicalPayload::default(),
            &record(147946, "Latest Name", "26-09-2025", "45.67"),
        );
        assert_eq!(merged.entries.len(), 1);
        assert_eq!(merged.meta.scheme_name, "Latest Name");
    }

    #[tokio::test]
    async fn test_hybrid_merges_latest_value() {
        let history = Arc::new(FakeHistory::default().with(147946, history_payload()));
        let latest = Arc::new(FakeLatest {
            records: vec![record(147946, "Latest Name", "27-09-2025", "45.99")],
            ..FakeLatest::default()
        });
        let registry = registry(history, latest.clone(), Some("key"));

        let payload = registry
            .fetch_scheme_data(HYBRID, &Scheme::new(147946, 1000.0, 10.0))
            .await
            .unwrap();

        assert_eq!(payload.entries.len(), 3);
        assert_eq!(payload.entries[0].nav.as_deref(), Some("45.99"));
        assert_eq!(latest.batches(), vec![vec![147946]]);
    }

    #[tokio::test]
    async fn test_hybrid_batches_latest_across_schemes() {
        let history = Arc::new(
            FakeHistory::default()
                .with(1, payload("One", &[("26-09-2025", "10")]))
                .with(2, payload("Two", &[("26-09-2025", "20")])),
        );
        let latest = Arc::new(FakeLatest {
            records: vec![
                record(1, "One", "27-09-2025", "11"),
                record(2, "Two", "27-09-2025", "21"),
            ],
            ..FakeLatest::default()
        });
        let registry = registry(history, latest.clone(), Some("key"));

        let one = Scheme::new(1, 0.0, 1.0);
        let two = Scheme::new(2, 0.0, 1.0);
        let (a, b) = futures::join!(
            registry.fetch_scheme_data(HYBRID, &one),
            registry.fetch_scheme_data(HYBRID, &two)
        );

        assert_eq!(latest.batches(), vec![vec![1, 2]]);
        assert_eq!(a.unwrap().entries[0].nav.as_deref(), Some("11"));
        assert_eq!(b.unwrap().entries[0].nav.as_deref(), Some("21"));
    }

    #[tokio::test]
    async fn test_hybrid_without_credential_skips_latest() {
        let history = Arc::new(FakeHistory::default().with(147946, history_payload()));
        let latest = Arc::new(FakeLatest {
            records: vec![record(147946, "Latest Name", "27-09-2025", "45.99")],
            ..FakeLatest::default()
        });
        let registry = registry(history, latest.clone(), None);

        let payload = registry
            .fetch_scheme_data(HYBRID, &Scheme::new(147946, 1000.0, 10.0))
            .await
            .unwrap();

        assert_eq!(payload, history_payload());
        assert!(latest.batches().is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_survives_history_failure() {
        let history = Arc::new(FakeHistory {
            failing: vec![147946],
            failures_left: AtomicUsize::new(1),
            ..FakeHistory::default()
        });
        let latest = Arc::new(FakeLatest {
            records: vec![record(147946, "Latest Name", "27-09-2025", "45.99")],
            ..FakeLatest::default()
        });
        let registry = registry(history, latest, Some("key"));

        let payload = registry
            .fetch_scheme_data(HYBRID, &Scheme::new(147946, 1000.0, 10.0))
            .await
            .unwrap();

        assert_eq!(payload.entries.len(), 1);
        assert_eq!(payload.meta.scheme_name, "Latest Name");
    }

    #[tokio::test]
    async fn test_hybrid_survives_latest_failure() {
        let history = Arc::new(FakeHistory::default().with(147946, history_payload()));
        let latest = Arc::new(FakeLatest {
            fail: true,
            ..FakeLatest::default()
        });
        let registry = registry(history, latest, Some("key"));

        let payload = registry
            .fetch_scheme_data(HYBRID, &Scheme::new(147946, 1000.0, 10.0))
            .await
            .unwrap();

        assert_eq!(payload, history_payload());
    }

    #[tokio::test]
    async fn test_mfapi_adapter_propagates_failure() {
        let history = Arc::new(FakeHistory::default());
        let registry = registry(history, Arc::new(FakeLatest::default()), None);

        let result = registry
            .fetch_scheme_data(MFAPI, &Scheme::new(5, 1.0, 1.0))
            .await;

        assert!(matches!(result, Err(NavError::Status { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_unknown_adapter_fails_loudly() {
        let registry = registry(
            Arc::new(FakeHistory::default()),
            Arc::new(FakeLatest::default()),
            None,
        );

        let result = registry
            .fetch_scheme_data("otherApi", &Scheme::new(5, 1.0, 1.0))
            .await;

        assert_eq!(result, Err(NavError::UnknownAdapter("otherApi".to_string())));
    }

    #[test]
    fn test_available_and_default_adapter() {
        let registry = registry(
            Arc::new(FakeHistory::default()),
            Arc::new(FakeLatest::default()),
            None,
        );
        assert_eq!(registry.available(), vec![MFAPI, HYBRID]);
        assert_eq!(registry.default_adapter(None).as_deref(), Some(HYBRID));
        assert_eq!(registry.default_adapter(Some(" ")).as_deref(), Some(HYBRID));
        assert_eq!(registry.default_adapter(Some("mfapi")).as_deref(), Some(MFAPI));

        let history = Arc::new(FakeHistory::default());
        let only_mfapi = AdapterRegistry::new().register(Arc::new(MfApiAdapter::new(Arc::new(
            HistoryCache::new(history),
        ))));
        assert_eq!(only_mfapi.default_adapter(None).as_deref(), Some(MFAPI));
        assert_eq!(AdapterRegistry::new().default_adapter(None), None);
    }
}
