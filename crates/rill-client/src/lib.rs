//! rill-client: client engine for the chat backend
//!
//! This crate owns the per-turn state machine, the typed client store,
//! context-inclusion reconciliation, and the debounced preview scheduler.
//! Wire decoding lives in `rill-wire`.

pub mod api;
pub mod error;
pub mod reconcile;
pub mod scheduler;
pub mod store;
pub mod turn;
pub mod types;

pub use api::{ApiClient, PreviewApi, SessionLookup};
pub use error::{Error, Result};
pub use reconcile::{InclusionReport, InclusionStatus, ProvenanceSource, reconcile};
pub use scheduler::{Debouncer, SyncScheduler};
pub use store::ClientStore;
pub use turn::{Turn, TurnAction, TurnHandle, TurnStatus, run_turn};
pub use types::{
    PreparedMessage, PreviewRequest, PreviewResponse, Role, Session, SessionMessage, StagedItem,
    StagedItemKind, TokenEstimate, TruncationActions,
};
