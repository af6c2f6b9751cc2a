//! Debounced backend synchronization.
//!
//! Bursts of local mutation (typing, staged-item edits, history toggles)
//! coalesce into a single preview round-trip after a quiet period. Every
//! fired call carries a monotonically increasing sequence number so a slow
//! response to an older request can never overwrite a newer one.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::api::PreviewApi;
use crate::reconcile;
use crate::store::ClientStore;
use crate::types::PreviewRequest;

/// Quiet period before a full context preview fires.
pub const PREVIEW_DELAY: Duration = Duration::from_millis(750);
/// Shorter quiet period for the lightweight token estimate.
pub const ESTIMATE_DELAY: Duration = Duration::from_millis(300);

/// Trailing-edge debouncer over spawned tasks.
///
/// Every `call` resets the pending timer; only the last call scheduled
/// within the window actually fires.
pub struct Debouncer {
    delay: Duration,
    seq: AtomicU64,
    pending: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            seq: AtomicU64::new(0),
            pending: Mutex::new(None),
        }
    }

    /// Schedule `work` after the quiet period, displacing any pending or
    /// in-flight earlier call. `work` receives this call's sequence number;
    /// compare it with [`Debouncer::is_current`] before applying a response
    /// that may have raced a newer call.
    pub fn call<F, Fut>(&self, work: F)
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            work(seq).await;
        });
        if let Some(prev) = self.pending.lock().replace(handle) {
            prev.abort();
        }
    }

    /// Whether `seq` still identifies the most recently scheduled call.
    pub fn is_current(&self, seq: u64) -> bool {
        self.seq.load(Ordering::SeqCst) == seq
    }

    /// Drop the pending call, if any.
    pub fn cancel(&self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
    }
}

/// Coalesces local mutations into backend preview round-trips.
///
/// With no active session every fire is a silent no-op, not an error.
pub struct SyncScheduler<A: PreviewApi + 'static> {
    api: Arc<A>,
    store: Arc<ClientStore>,
    preview: Arc<Debouncer>,
    estimate: Arc<Debouncer>,
}

impl<A: PreviewApi + 'static> SyncScheduler<A> {
    pub fn new(api: Arc<A>, store: Arc<ClientStore>) -> Self {
        Self::with_delays(api, store, ESTIMATE_DELAY, PREVIEW_DELAY)
    }

    pub fn with_delays(
        api: Arc<A>,
        store: Arc<ClientStore>,
        estimate_delay: Duration,
        preview_delay: Duration,
    ) -> Self {
        Self {
            api,
            store,
            preview: Arc::new(Debouncer::new(preview_delay)),
            estimate: Arc::new(Debouncer::new(estimate_delay)),
        }
    }

    fn request_from_store(store: &ClientStore, current_query: Option<String>) -> PreviewRequest {
        PreviewRequest {
            current_query,
            staged_items: store.staged_items(),
            message_inclusion_map: store.message_inclusion_map(),
        }
    }

    /// A staged-item or history-inclusion mutation happened; schedule a full
    /// preview after the quiet period.
    pub fn notify_mutation(&self, current_query: Option<String>) {
        let api = Arc::clone(&self.api);
        let store = Arc::clone(&self.store);
        let debouncer = Arc::clone(&self.preview);
        self.preview.call(move |seq| async move {
            let Some(session_id) = store.active_session_id() else {
                return;
            };
            let request = Self::request_from_store(&store, current_query);
            match api.preview_context(&session_id, &request).await {
                Ok(preview) => {
                    if !debouncer.is_current(seq) {
                        tracing::debug!(seq, "discarding stale preview response");
                        return;
                    }
                    store.set_context_usage(preview.context_usage());
                    store.replace_rag_documents(preview.rag_documents_used.clone());
                    store.set_inclusion_report(reconcile::reconcile(&preview));
                }
                Err(e) => tracing::warn!(error = %e, "context preview failed"),
            }
        });
    }

    /// Typing activity; schedule only the lightweight token estimate.
    pub fn notify_typing(&self, current_query: Option<String>) {
        let api = Arc::clone(&self.api);
        let store = Arc::clone(&self.store);
        let debouncer = Arc::clone(&self.estimate);
        self.estimate.call(move |seq| async move {
            let Some(session_id) = store.active_session_id() else {
                return;
            };
            let request = Self::request_from_store(&store, current_query);
            match api.estimate_tokens(&session_id, &request).await {
                Ok(estimate) => {
                    if debouncer.is_current(seq) {
                        store.set_token_estimate(estimate.token_count);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "token estimate failed"),
            }
        });
    }

    /// Drop anything still pending, e.g. on session switch.
    pub fn cancel_pending(&self) {
        self.preview.cancel();
        self.estimate.cancel();
    }
}
