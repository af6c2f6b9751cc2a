//! Per-turn session state: one state machine per outbound message.

use futures::StreamExt;
use rill_wire::{StreamEvent, StreamEventStream};
use tokio_util::sync::CancellationToken;

use crate::api::SessionLookup;
use crate::store::ClientStore;

/// Lifecycle of a turn. `Streaming` is the only non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Streaming,
    Complete,
    Errored,
    Cancelled,
}

impl TurnStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TurnStatus::Streaming)
    }
}

/// State of one in-flight request, owned exclusively by the runner that
/// created it. There is no pooling; each outbound message gets a fresh turn.
#[derive(Debug, Clone)]
pub struct Turn {
    /// Client-local id, minted at creation
    pub id: String,
    /// Session this turn belongs to
    pub session_id: String,
    /// Assistant text accumulated so far
    pub accumulated_text: String,
    /// Backend message id, once known; makes the turn addressable for
    /// later actions (copy, delete, add to workspace)
    pub persistent_id: Option<String>,
    pub status: TurnStatus,
    /// Surfaced error text when `status` is `Errored`
    pub error: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Side effect requested by applying one event to a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnAction {
    /// Re-render the turn's text from scratch (full replacement, so
    /// downstream formatting stays correct under growing text)
    Rerender,
    /// Overwrite the global usage display; last write wins
    UpdateUsage(rill_wire::ContextUsage),
    /// Replace the displayed document list wholesale
    ReplaceRagDocuments(Vec<serde_json::Value>),
    /// Turn ended without a bound persistent id; recover it out-of-band
    RecoverPersistentId,
}

impl Turn {
    /// Start a fresh turn for `session_id`.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            accumulated_text: String::new(),
            persistent_id: None,
            status: TurnStatus::Streaming,
            error: None,
            started_at: chrono::Utc::now(),
        }
    }

    /// Apply one stream event, returning the side effect it asks for.
    ///
    /// Events arriving after a terminal status are ignored.
    pub fn apply(&mut self, event: StreamEvent) -> Option<TurnAction> {
        if self.status.is_terminal() {
            tracing::debug!(turn = %self.id, ?event, "ignoring event after terminal status");
            return None;
        }
        match event {
            StreamEvent::Chunk { content } => {
                self.accumulated_text.push_str(&content);
                Some(TurnAction::Rerender)
            }
            StreamEvent::FullResponseId { message_id } => {
                self.persistent_id = Some(message_id);
                None
            }
            StreamEvent::ContextUsage { data } => Some(TurnAction::UpdateUsage(data)),
            StreamEvent::RagResults { documents } => {
                Some(TurnAction::ReplaceRagDocuments(documents))
            }
            StreamEvent::Error { error } => {
                tracing::warn!(turn = %self.id, error, "turn errored");
                self.error = Some(error);
                self.status = TurnStatus::Errored;
                None
            }
            StreamEvent::End => {
                self.status = TurnStatus::Complete;
                if self.persistent_id.is_none() {
                    Some(TurnAction::RecoverPersistentId)
                } else {
                    None
                }
            }
        }
    }

    /// Mark the turn cancelled by external trigger.
    pub fn cancel(&mut self) {
        if !self.status.is_terminal() {
            self.status = TurnStatus::Cancelled;
        }
    }
}

/// A cloneable handle for aborting a turn from external code.
#[derive(Clone, Default)]
pub struct TurnHandle {
    cancel: CancellationToken,
}

impl TurnHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the turn's read loop. Idempotent.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn aborted(&self) {
        self.cancel.cancelled().await
    }
}

/// Drive a decoded event stream into `turn`, updating shared state through
/// the store and re-rendering via `on_render` (called with the whole turn so
/// renderers replace, not patch).
///
/// The loop ends at the first terminal status: backend `end`, backend
/// `error`, transport failure (already surfaced as an `error` event by the
/// decoder), or an abort through `handle`. If the turn completed without a
/// `full_response_id`, the persistent id is recovered by reloading the
/// session and scanning its messages backward for the latest assistant
/// message.
pub async fn run_turn<L>(
    turn: &mut Turn,
    mut events: StreamEventStream,
    handle: &TurnHandle,
    store: &ClientStore,
    lookup: &L,
    mut on_render: impl FnMut(&Turn),
) where
    L: SessionLookup + ?Sized,
{
    let mut recover_id = false;

    while !turn.status.is_terminal() {
        let event = tokio::select! {
            _ = handle.aborted() => {
                turn.cancel();
                break;
            }
            next = events.next() => match next {
                Some(event) => event,
                // Decoder always ends with a terminal event; a bare close
                // here means the stream was dropped out from under us.
                None => {
                    turn.error = Some("stream dropped".to_string());
                    turn.status = TurnStatus::Errored;
                    break;
                }
            },
        };

        match turn.apply(event) {
            Some(TurnAction::Rerender) => on_render(turn),
            Some(TurnAction::UpdateUsage(usage)) => store.set_context_usage(usage),
            Some(TurnAction::ReplaceRagDocuments(documents)) => {
                store.replace_rag_documents(documents)
            }
            Some(TurnAction::RecoverPersistentId) => recover_id = true,
            None => {}
        }
    }

    if recover_id && turn.status == TurnStatus::Complete {
        match lookup.get_session(&turn.session_id).await {
            Ok(session) => {
                turn.persistent_id = session.last_assistant_message_id().map(String::from);
                if turn.persistent_id.is_none() {
                    tracing::warn!(
                        session = %turn.session_id,
                        "no assistant message found while recovering persistent id"
                    );
                }
            }
            Err(e) => {
                // Recovery is best-effort; the turn stays complete.
                tracing::warn!(session = %turn.session_id, error = %e, "persistent id recovery failed");
            }
        }
    }

    on_render(turn);
}
