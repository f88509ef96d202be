//! Request coordination: deduplication of history fetches and batching of
//! latest-value lookups.
//!
//! Both pieces of state live here and nowhere else. A [`Coordinator`] is
//! built once and handed to the adapters; tests build as many independent
//! ones as they like.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use crate::canonical::{CanonicalPayload, LatestNavRecord};
use crate::error::NavError;
use crate::source::{HistorySource, LatestSource};

type HistoryRequest = Shared<BoxFuture<'static, Result<CanonicalPayload, NavError>>>;

struct CacheSlot {
    id: u64,
    request: HistoryRequest,
}

/// Shares one history request per scheme code between all its callers.
///
/// A successful answer stays cached for the life of the cache. A failed one
/// is dropped as soon as it resolves so the next caller retries.
pub struct HistoryCache {
    source: Arc<dyn HistorySource>,
    slots: Mutex<HashMap<u32, CacheSlot>>,
    next_id: AtomicU64,
}

impl HistoryCache {
    pub fn new(source: Arc<dyn HistorySource>) -> Self {
        Self {
            source,
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn source_id(&self) -> &'static str {
        self.source.id()
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<u32, CacheSlot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn fetch(&self, scheme_code: u32) -> Result<CanonicalPayload, NavError> {
        let (id, request) = {
            let mut slots = self.lock_slots();
            match slots.get(&scheme_code) {
                Some(slot) => {
                    debug!(scheme_code, "reusing history request");
                    (slot.id, slot.request.clone())
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let source = Arc::clone(&self.source);
                    let request = async move { source.fetch_history(scheme_code).await }
                        .boxed()
                        .shared();
                    slots.insert(
                        scheme_code,
                        CacheSlot {
                            id,
                            request: request.clone(),
                        },
                    );
                    (id, request)
                }
            }
        };

        let result = request.await;
        if result.is_err() {
            let mut slots = self.lock_slots();
            if slots.get(&scheme_code).is_some_and(|slot| slot.id == id) {
                debug!(scheme_code, "evicting failed history request");
                slots.remove(&scheme_code);
            }
        }
        result
    }
}

type LatestOutcome = Result<Arc<Vec<LatestNavRecord>>, NavError>;
type LatestRequest = Shared<BoxFuture<'static, LatestOutcome>>;

/// Whether a batch request is currently on the wire.
enum FlushState {
    Idle,
    Pending(LatestRequest),
}

impl FlushState {
    fn in_flight(&self) -> Option<LatestRequest> {
        match self {
            FlushState::Pending(request) if request.peek().is_none() => Some(request.clone()),
            _ => None,
        }
    }
}

/// Codes collected for the next request, and the channel its answer goes to.
struct PendingBatch {
    codes: Vec<u32>,
    notify: oneshot::Sender<LatestOutcome>,
    outcome: Shared<oneshot::Receiver<LatestOutcome>>,
}

struct BatchQueue {
    pending: Option<PendingBatch>,
    flight: FlushState,
}

struct BatcherInner {
    source: Arc<dyn LatestSource>,
    queue: Mutex<BatchQueue>,
}

/// Coalesces concurrent latest-value lookups into one request.
///
/// The first caller of a tick opens a batch and drives its flush itself,
/// after yielding once so that every sibling future polled in the same round
/// joins the batch first. The flush takes the pending codes before sending,
/// so callers that show up while a request is on the wire start the next
/// batch, which is sent only once the current one has finished.
///
/// Nothing is spawned: the batch is collected and sent from within the task
/// that asked for it, so the size of a batch does not depend on how many
/// runtime workers there are.
#[derive(Clone)]
pub struct LatestBatcher {
    inner: Arc<BatcherInner>,
}

impl LatestBatcher {
    pub fn new(source: Arc<dyn LatestSource>) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                source,
                queue: Mutex::new(BatchQueue {
                    pending: None,
                    flight: FlushState::Idle,
                }),
            }),
        }
    }

    /// The latest record for `scheme_code`, or `None` if the batch answer
    /// did not include it.
    pub async fn latest(&self, scheme_code: u32) -> Result<Option<LatestNavRecord>, NavError> {
        let (outcome, drives_flush) = {
            let mut queue = self.inner.lock_queue();
            match queue.pending.as_mut() {
                Some(batch) => {
                    if !batch.codes.contains(&scheme_code) {
                        batch.codes.push(scheme_code);
                    }
                    (batch.outcome.clone(), false)
                }
                None => {
                    let (notify, receiver) = oneshot::channel();
                    let outcome = receiver.shared();
                    queue.pending = Some(PendingBatch {
                        codes: vec![scheme_code],
                        notify,
                        outcome: outcome.clone(),
                    });
                    (outcome, true)
                }
            }
        };

        if drives_flush {
            self.inner.flush().await;
        }

        let records = match outcome.await {
            Ok(result) => result?,
            Err(oneshot::Canceled) => {
                return Err(NavError::network(
                    self.inner.source.id(),
                    "batch was abandoned before it was sent",
                ))
            }
        };
        // No matching record means no latest value; there is no first-record fallback.
        Ok(records
            .iter()
            .find(|record| record.code() == Some(scheme_code))
            .cloned())
    }
}

impl BatcherInner {
    fn lock_queue(&self) -> MutexGuard<'_, BatchQueue> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn flush(&self) {
        let mut unsent = UnsentBatch {
            inner: self,
            armed: true,
        };
        // One round for the sibling callers to join.
        tokio::task::yield_now().await;

        let (batch, request) = loop {
            let in_flight = {
                let mut queue = self.lock_queue();
                match queue.flight.in_flight() {
                    Some(request) => request,
                    None => {
                        let Some(batch) = queue.pending.take() else {
                            return;
                        };
                        let source = Arc::clone(&self.source);
                        let codes = batch.codes.clone();
                        let request = async move { source.fetch_latest(&codes).await.map(Arc::new) }
                            .boxed()
                            .shared();
                        queue.flight = FlushState::Pending(request.clone());
                        unsent.armed = false;
                        break (batch, request);
                    }
                }
            };
            let _ = in_flight.await;
        };

        debug!(codes = ?batch.codes, "flushing latest-value batch");
        let outcome = request.await;
        if let Err(e) = &outcome {
            warn!(codes = ?batch.codes, error = %e, "latest-value batch failed");
        }
        // Every waiter may have gone away; nothing to do then.
        let _ = batch.notify.send(outcome);

        let mut queue = self.lock_queue();
        if queue.flight.in_flight().is_none() {
            queue.flight = FlushState::Idle;
        }
    }
}

/// Drops the pending batch if its driver goes away before sending it, so
/// the other waiters see a cancelled outcome.
struct UnsentBatch<'a> {
    inner: &'a BatcherInner,
    armed: bool,
}

impl Drop for UnsentBatch<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.lock_queue().pending.take();
        }
    }
}

/// The single owner of all shared request state.
pub struct Coordinator {
    history: Arc<HistoryCache>,
    latest: LatestBatcher,
}

impl Coordinator {
    pub fn new(history: Arc<dyn HistorySource>, latest: Arc<dyn LatestSource>) -> Self {
        Self {
            history: Arc::new(HistoryCache::new(history)),
            latest: LatestBatcher::new(latest),
        }
    }

    pub fn history(&self) -> Arc<HistoryCache> {
        Arc::clone(&self.history)
    }

    pub fn latest(&self) -> LatestBatcher {
        self.latest.clone()
    }
}
