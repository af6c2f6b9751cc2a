//! Request and response types for the chat backend API

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A user-staged context fragment, offered for inclusion in the next prompt.
///
/// Staged items live purely client-side: created by user action, destroyed on
/// explicit removal or session switch, never persisted by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedItem {
    /// Client-minted unique id, stable for the item's lifetime
    pub spec_item_id: String,
    #[serde(rename = "type")]
    pub kind: StagedItemKind,
    /// Id of the referenced workspace item or history message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_ref: Option<String>,
    /// Inline text, for `text_content` items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Server-side path, for `file_content` items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Ask the backend to never truncate this item
    #[serde(default)]
    pub no_truncate: bool,
}

/// Wire names match what the backend's staging resolver expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagedItemKind {
    TextContent,
    FileContent,
    WorkspaceItem,
    MessageHistory,
}

impl StagedItem {
    fn with_kind(kind: StagedItemKind) -> Self {
        Self {
            spec_item_id: format!("staged_{}", uuid::Uuid::new_v4().simple()),
            kind,
            id_ref: None,
            content: None,
            path: None,
            no_truncate: false,
        }
    }

    /// Stage an inline text snippet.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::with_kind(StagedItemKind::TextContent)
        }
    }

    /// Stage a server-side file by path.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::with_kind(StagedItemKind::FileContent)
        }
    }

    /// Stage a reference to an existing workspace item.
    pub fn workspace_ref(item_id: impl Into<String>) -> Self {
        Self {
            id_ref: Some(item_id.into()),
            ..Self::with_kind(StagedItemKind::WorkspaceItem)
        }
    }

    /// Stage a reference to a history message.
    pub fn history_ref(message_id: impl Into<String>) -> Self {
        Self {
            id_ref: Some(message_id.into()),
            ..Self::with_kind(StagedItemKind::MessageHistory)
        }
    }

    /// The identifier the backend would embed in a provenance marker for
    /// this item: the referenced id for ref kinds, the item's own id
    /// otherwise.
    pub fn resolution_key(&self) -> &str {
        match self.kind {
            StagedItemKind::WorkspaceItem | StagedItemKind::MessageHistory => {
                self.id_ref.as_deref().unwrap_or(&self.spec_item_id)
            }
            StagedItemKind::TextContent | StagedItemKind::FileContent => &self.spec_item_id,
        }
    }

    /// Only inline text items can be edited after creation.
    pub fn is_editable(&self) -> bool {
        self.kind == StagedItemKind::TextContent
    }
}

/// Message role as the backend reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a persisted session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

/// A persisted chat session, as returned by the session endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
}

impl Session {
    /// Most recent assistant message id, scanning history backward.
    ///
    /// Used to recover a turn's persistent id when the stream ended without
    /// a `full_response_id` frame.
    pub fn last_assistant_message_id(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.id.as_str())
    }
}

/// Body of a context preview request
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreviewRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_query: Option<String>,
    pub staged_items: Vec<StagedItem>,
    /// Per-message history inclusion overrides, keyed by message id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_inclusion_map: Option<HashMap<String, bool>>,
}

/// One assembled prompt segment from a preview response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tokens: Option<u64>,
}

/// Truncation notes reported by the backend's context assembly
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TruncationActions {
    #[serde(default)]
    pub details: Vec<String>,
}

/// Full context preview: the prompt the backend would assemble right now
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewResponse {
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub max_tokens_for_model: Option<u64>,
    #[serde(default)]
    pub final_token_count: Option<u64>,
    #[serde(default)]
    pub truncation_actions_taken: TruncationActions,
    #[serde(default)]
    pub prepared_messages: Vec<PreparedMessage>,
    #[serde(default)]
    pub rag_documents_used: Vec<serde_json::Value>,
    /// Structured provenance: ids the backend confirms it included.
    /// Preferred over marker scanning when present.
    #[serde(default)]
    pub included_item_ids: Option<Vec<String>>,
    #[serde(default)]
    pub rendered_rag_template_content: Option<String>,
}

impl PreviewResponse {
    /// Token accounting in the shape the usage display consumes.
    pub fn context_usage(&self) -> rill_wire::ContextUsage {
        rill_wire::ContextUsage {
            tokens_used: self.final_token_count.unwrap_or(0),
            max_tokens: self.max_tokens_for_model.unwrap_or(0),
        }
    }
}

/// Lightweight token-count estimate
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenEstimate {
    pub token_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_item_wire_shape() {
        let item = StagedItem::workspace_ref("ws-1");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "workspace_item");
        assert_eq!(json["id_ref"], "ws-1");
        assert!(json.get("content").is_none());
        assert!(json.get("path").is_none());
        assert_eq!(json["no_truncate"], false);
    }

    #[test]
    fn test_resolution_key_per_kind() {
        let text = StagedItem::text("hi");
        assert_eq!(text.resolution_key(), text.spec_item_id);

        let ws = StagedItem::workspace_ref("abc123");
        assert_eq!(ws.resolution_key(), "abc123");

        let hist = StagedItem::history_ref("msg-9");
        assert_eq!(hist.resolution_key(), "msg-9");
    }

    #[test]
    fn test_only_text_items_editable() {
        assert!(StagedItem::text("a").is_editable());
        assert!(!StagedItem::file("/tmp/f").is_editable());
        assert!(!StagedItem::workspace_ref("w").is_editable());
        assert!(!StagedItem::history_ref("m").is_editable());
    }

    #[test]
    fn test_spec_item_ids_unique() {
        assert_ne!(
            StagedItem::text("a").spec_item_id,
            StagedItem::text("a").spec_item_id
        );
    }

    #[test]
    fn test_preview_response_tolerates_minimal_body() {
        let resp: PreviewResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.prepared_messages.is_empty());
        assert_eq!(resp.context_usage().tokens_used, 0);
    }

    #[test]
    fn test_preview_response_full_body() {
        let resp: PreviewResponse = serde_json::from_str(
            r#"{
                "provider_name": "anthropic",
                "model_name": "claude-3",
                "max_tokens_for_model": 200000,
                "final_token_count": 1234,
                "truncation_actions_taken": {"details": ["history truncated"]},
                "prepared_messages": [
                    {"role": "system", "content": "You are helpful.", "tokens": 6},
                    {"role": "user", "content": "hi", "tokens": 1}
                ],
                "rag_documents_used": [{"id": "d1"}]
            }"#,
        )
        .unwrap();
        assert_eq!(resp.prepared_messages.len(), 2);
        assert_eq!(resp.prepared_messages[0].role, Role::System);
        assert_eq!(resp.truncation_actions_taken.details.len(), 1);
        let usage = resp.context_usage();
        assert_eq!(usage.tokens_used, 1234);
        assert_eq!(usage.max_tokens, 200000);
        assert!(resp.included_item_ids.is_none());
    }

    #[test]
    fn test_last_assistant_message_id_scans_backward() {
        let session: Session = serde_json::from_str(
            r#"{
                "id": "s1",
                "messages": [
                    {"id": "m1", "role": "user", "content": "q1"},
                    {"id": "m2", "role": "assistant", "content": "a1"},
                    {"id": "m3", "role": "user", "content": "q2"},
                    {"id": "m4", "role": "assistant", "content": "a2"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(session.last_assistant_message_id(), Some("m4"));
    }

    #[test]
    fn test_last_assistant_message_id_none_without_assistant() {
        let session = Session {
            id: "s1".into(),
            name: None,
            messages: vec![SessionMessage {
                id: "m1".into(),
                role: Role::User,
                content: "q".into(),
            }],
        };
        assert_eq!(session.last_assistant_message_id(), None);
    }
}
