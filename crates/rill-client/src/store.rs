//! Process-wide client state behind controlled mutation entry points.
//!
//! One typed store replaces ad hoc shared globals: every component mutates
//! only through these methods and reads clone out, so no lock is ever held
//! across an await point.

use std::collections::HashMap;

use parking_lot::Mutex;
use rill_wire::ContextUsage;

use crate::reconcile::InclusionReport;
use crate::types::StagedItem;

#[derive(Default)]
struct StoreInner {
    active_session_id: Option<String>,
    staged_items: Vec<StagedItem>,
    message_inclusion: HashMap<String, bool>,
    context_usage: Option<ContextUsage>,
    token_estimate: Option<u64>,
    rag_documents: Vec<serde_json::Value>,
    inclusion: Option<InclusionReport>,
}

/// Shared client state: active session, staged items, and the latest
/// display annotations (usage, RAG documents, inclusion report).
#[derive(Default)]
pub struct ClientStore {
    inner: Mutex<StoreInner>,
}

impl ClientStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch the active session. Staged items are client-side only and do
    /// not survive a switch; neither do session-scoped annotations.
    pub fn set_active_session(&self, session_id: Option<String>) {
        let mut inner = self.inner.lock();
        if inner.active_session_id == session_id {
            return;
        }
        tracing::debug!(?session_id, "switching active session");
        inner.active_session_id = session_id;
        inner.staged_items.clear();
        inner.message_inclusion.clear();
        inner.context_usage = None;
        inner.token_estimate = None;
        inner.rag_documents.clear();
        inner.inclusion = None;
    }

    pub fn active_session_id(&self) -> Option<String> {
        self.inner.lock().active_session_id.clone()
    }

    /// Stage a context item for the next prompt.
    pub fn stage_item(&self, item: StagedItem) {
        self.inner.lock().staged_items.push(item);
    }

    /// Remove a staged item by its `spec_item_id`.
    pub fn remove_item(&self, spec_item_id: &str) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.staged_items.len();
        inner.staged_items.retain(|i| i.spec_item_id != spec_item_id);
        inner.staged_items.len() != before
    }

    /// Edit a staged item's text. Only `text_content` items are mutable;
    /// anything else is refused.
    pub fn edit_text_item(&self, spec_item_id: &str, content: impl Into<String>) -> bool {
        let mut inner = self.inner.lock();
        let Some(item) = inner
            .staged_items
            .iter_mut()
            .find(|i| i.spec_item_id == spec_item_id)
        else {
            return false;
        };
        if !item.is_editable() {
            tracing::warn!(spec_item_id, "refusing to edit non-text staged item");
            return false;
        }
        item.content = Some(content.into());
        true
    }

    pub fn staged_items(&self) -> Vec<StagedItem> {
        self.inner.lock().staged_items.clone()
    }

    /// Toggle whether a history message is offered for prompt inclusion.
    pub fn set_message_inclusion(&self, message_id: impl Into<String>, included: bool) {
        self.inner
            .lock()
            .message_inclusion
            .insert(message_id.into(), included);
    }

    /// Current history-inclusion overrides, or `None` when untouched.
    pub fn message_inclusion_map(&self) -> Option<HashMap<String, bool>> {
        let inner = self.inner.lock();
        if inner.message_inclusion.is_empty() {
            None
        } else {
            Some(inner.message_inclusion.clone())
        }
    }

    /// Overwrite the usage display; last write wins, no merge.
    pub fn set_context_usage(&self, usage: ContextUsage) {
        self.inner.lock().context_usage = Some(usage);
    }

    pub fn context_usage(&self) -> Option<ContextUsage> {
        self.inner.lock().context_usage
    }

    /// Record the latest lightweight token estimate.
    pub fn set_token_estimate(&self, tokens: u64) {
        self.inner.lock().token_estimate = Some(tokens);
    }

    pub fn token_estimate(&self) -> Option<u64> {
        self.inner.lock().token_estimate
    }

    /// Replace the displayed document list wholesale.
    pub fn replace_rag_documents(&self, documents: Vec<serde_json::Value>) {
        self.inner.lock().rag_documents = documents;
    }

    pub fn rag_documents(&self) -> Vec<serde_json::Value> {
        self.inner.lock().rag_documents.clone()
    }

    /// Attach the latest reconciliation outcome. Purely a rendering
    /// annotation; staged items themselves are never touched.
    pub fn set_inclusion_report(&self, report: InclusionReport) {
        self.inner.lock().inclusion = Some(report);
    }

    pub fn inclusion_report(&self) -> Option<InclusionReport> {
        self.inner.lock().inclusion.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_switch_clears_staged_state() {
        let store = ClientStore::new();
        store.set_active_session(Some("s1".into()));
        store.stage_item(StagedItem::text("hello"));
        store.set_context_usage(ContextUsage {
            tokens_used: 1,
            max_tokens: 2,
        });
        store.replace_rag_documents(vec![serde_json::json!({})]);

        store.set_active_session(Some("s2".into()));
        assert!(store.staged_items().is_empty());
        assert!(store.context_usage().is_none());
        assert!(store.rag_documents().is_empty());
        assert_eq!(store.active_session_id().as_deref(), Some("s2"));
    }

    #[test]
    fn test_setting_same_session_keeps_staged_items() {
        let store = ClientStore::new();
        store.set_active_session(Some("s1".into()));
        store.stage_item(StagedItem::text("keep me"));
        store.set_active_session(Some("s1".into()));
        assert_eq!(store.staged_items().len(), 1);
    }

    #[test]
    fn test_remove_item() {
        let store = ClientStore::new();
        let item = StagedItem::text("x");
        let id = item.spec_item_id.clone();
        store.stage_item(item);
        assert!(store.remove_item(&id));
        assert!(!store.remove_item(&id));
        assert!(store.staged_items().is_empty());
    }

    #[test]
    fn test_edit_only_touches_text_items() {
        let store = ClientStore::new();
        let text = StagedItem::text("before");
        let file = StagedItem::file("/tmp/data.txt");
        let text_id = text.spec_item_id.clone();
        let file_id = file.spec_item_id.clone();
        store.stage_item(text);
        store.stage_item(file);

        assert!(store.edit_text_item(&text_id, "after"));
        assert!(!store.edit_text_item(&file_id, "nope"));
        assert!(!store.edit_text_item("missing", "nope"));

        let items = store.staged_items();
        assert_eq!(items[0].content.as_deref(), Some("after"));
        assert_eq!(items[1].content, None);
    }

    #[test]
    fn test_message_inclusion_map_empty_until_toggled() {
        let store = ClientStore::new();
        assert!(store.message_inclusion_map().is_none());
        store.set_message_inclusion("m1", false);
        store.set_message_inclusion("m1", true);
        let map = store.message_inclusion_map().unwrap();
        assert_eq!(map.get("m1"), Some(&true));
    }

    #[test]
    fn test_usage_last_write_wins() {
        let store = ClientStore::new();
        store.set_context_usage(ContextUsage {
            tokens_used: 10,
            max_tokens: 100,
        });
        store.set_context_usage(ContextUsage {
            tokens_used: 20,
            max_tokens: 100,
        });
        assert_eq!(store.context_usage().map(|u| u.tokens_used), Some(20));
    }
}
