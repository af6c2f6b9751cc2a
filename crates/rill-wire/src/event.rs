//! Typed events carried by the chat stream.

use serde::{Deserialize, Serialize};

/// Literal prefix every well-formed frame starts with.
pub const DATA_PREFIX: &str = "data: ";

/// Events emitted by the backend during a streaming chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental response text
    Chunk { content: String },
    /// Persistent id of the assistant message, once known
    FullResponseId { message_id: String },
    /// Token accounting for the assembled prompt; last write wins
    ContextUsage { data: ContextUsage },
    /// Retrieved documents; replaces any previously shown list wholesale
    RagResults { documents: Vec<serde_json::Value> },
    /// Backend-declared failure; terminal for the turn
    Error { error: String },
    /// Clean end of the turn
    End,
}

/// Token accounting carried by a `context_usage` event
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ContextUsage {
    pub tokens_used: u64,
    pub max_tokens: u64,
}

impl ContextUsage {
    /// Share of the model window consumed, in percent.
    pub fn usage_percentage(&self) -> f64 {
        if self.max_tokens == 0 {
            0.0
        } else {
            self.tokens_used as f64 / self.max_tokens as f64 * 100.0
        }
    }
}

impl StreamEvent {
    /// Parse one decoded frame.
    ///
    /// Frames without the `data: ` prefix or with an unparseable body are
    /// dropped with a warning; the caller's loop keeps running.
    pub fn parse(frame: &str) -> Option<Self> {
        if frame.trim().is_empty() {
            return None;
        }
        let Some(body) = frame.strip_prefix(DATA_PREFIX) else {
            tracing::warn!(frame = %preview(frame), "dropping frame without data prefix");
            return None;
        };
        match serde_json::from_str(body) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(error = %e, frame = %preview(frame), "dropping unparseable frame");
                None
            }
        }
    }

    /// Check if this event ends the turn (`error` or `end`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Error { .. } | StreamEvent::End)
    }
}

fn preview(frame: &str) -> &str {
    let end = frame
        .char_indices()
        .nth(120)
        .map(|(i, _)| i)
        .unwrap_or(frame.len());
    &frame[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chunk() {
        let event = StreamEvent::parse(r#"data: {"type":"chunk","content":"Hel"}"#);
        assert_eq!(
            event,
            Some(StreamEvent::Chunk {
                content: "Hel".into()
            })
        );
    }

    #[test]
    fn test_parse_full_response_id() {
        let event = StreamEvent::parse(r#"data: {"type":"full_response_id","message_id":"m-1"}"#);
        assert_eq!(
            event,
            Some(StreamEvent::FullResponseId {
                message_id: "m-1".into()
            })
        );
    }

    #[test]
    fn test_parse_context_usage() {
        let event = StreamEvent::parse(
            r#"data: {"type":"context_usage","data":{"tokens_used":120,"max_tokens":8000}}"#,
        );
        let Some(StreamEvent::ContextUsage { data }) = event else {
            panic!("expected context_usage, got {:?}", event);
        };
        assert_eq!(data.tokens_used, 120);
        assert_eq!(data.max_tokens, 8000);
        assert!((data.usage_percentage() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rag_results() {
        let event =
            StreamEvent::parse(r#"data: {"type":"rag_results","documents":[{"id":"d1"}]}"#);
        let Some(StreamEvent::RagResults { documents }) = event else {
            panic!("expected rag_results, got {:?}", event);
        };
        assert_eq!(documents.len(), 1);
    }

    #[test]
    fn test_parse_error_and_end_are_terminal() {
        let error = StreamEvent::parse(r#"data: {"type":"error","error":"boom"}"#).unwrap();
        let end = StreamEvent::parse(r#"data: {"type":"end"}"#).unwrap();
        assert!(error.is_terminal());
        assert!(end.is_terminal());
        assert!(
            !StreamEvent::Chunk {
                content: String::new()
            }
            .is_terminal()
        );
    }

    #[test]
    fn test_missing_prefix_dropped() {
        assert_eq!(StreamEvent::parse(r#"{"type":"end"}"#), None);
        assert_eq!(StreamEvent::parse("event: ping"), None);
    }

    #[test]
    fn test_unparseable_body_dropped() {
        assert_eq!(StreamEvent::parse("data: not json"), None);
        assert_eq!(StreamEvent::parse(r#"data: {"type":"unknown_kind"}"#), None);
    }

    #[test]
    fn test_blank_frame_dropped_quietly() {
        assert_eq!(StreamEvent::parse(""), None);
        assert_eq!(StreamEvent::parse("  "), None);
    }

    #[test]
    fn test_usage_percentage_zero_window() {
        let usage = ContextUsage {
            tokens_used: 10,
            max_tokens: 0,
        };
        assert_eq!(usage.usage_percentage(), 0.0);
    }
}
