//! Context-inclusion reconciliation.
//!
//! After a preview round-trip, determine which staged items actually made it
//! into the assembled prompt and which were silently dropped by server-side
//! truncation. The outcome is a read-only rendering annotation; it never
//! mutates or auto-removes a staged item.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{PreviewResponse, Role, StagedItem};

/// Provenance markers the backend embeds in assembled system segments.
/// The grammar is a stopgap, not a documented contract; structured
/// provenance in the response is preferred whenever available.
static WORKSPACE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[Workspace Item ID:\s*([^\]\s]+)\]").unwrap());
static HISTORY_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[History Message ID:\s*([^\]\s]+)\]").unwrap());

/// How the included-id set was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvenanceSource {
    /// The response carried an explicit id list
    Structured,
    /// Best-effort marker scan over system segments
    #[default]
    Markers,
}

/// Classification of one staged item against a preview response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InclusionStatus {
    Included,
    /// Likely removed by server-side truncation; a soft warning only
    Dropped,
}

/// Identifiers confirmed present in the assembled prompt. Computed fresh per
/// preview response, never persisted.
#[derive(Debug, Clone, Default)]
pub struct InclusionReport {
    included: HashSet<String>,
    source: ProvenanceSource,
}

impl InclusionReport {
    pub fn source(&self) -> ProvenanceSource {
        self.source
    }

    pub fn is_included(&self, item: &StagedItem) -> bool {
        self.included.contains(item.resolution_key())
    }

    pub fn status_of(&self, item: &StagedItem) -> InclusionStatus {
        if self.is_included(item) {
            InclusionStatus::Included
        } else {
            InclusionStatus::Dropped
        }
    }

    /// How many of `staged` would be annotated as dropped.
    pub fn dropped_count(&self, staged: &[StagedItem]) -> usize {
        staged.iter().filter(|i| !self.is_included(i)).count()
    }
}

/// Diff a preview response against the staged-item list.
///
/// Prefers the structured `included_item_ids` list when the backend sends
/// one; otherwise scans system-role segments for the two known marker
/// shapes. Non-system segments are never scanned.
pub fn reconcile(preview: &PreviewResponse) -> InclusionReport {
    if let Some(ids) = &preview.included_item_ids {
        return InclusionReport {
            included: ids.iter().cloned().collect(),
            source: ProvenanceSource::Structured,
        };
    }

    let mut included = HashSet::new();
    for segment in &preview.prepared_messages {
        if segment.role != Role::System {
            continue;
        }
        for re in [&*WORKSPACE_MARKER, &*HISTORY_MARKER] {
            for capture in re.captures_iter(&segment.content) {
                if let Some(id) = capture.get(1) {
                    included.insert(id.as_str().to_string());
                }
            }
        }
    }
    tracing::debug!(matched = included.len(), "marker reconciliation pass");
    InclusionReport {
        included,
        source: ProvenanceSource::Markers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PreparedMessage;

    fn preview_with_segments(segments: Vec<(Role, &str)>) -> PreviewResponse {
        let prepared_messages = segments
            .into_iter()
            .map(|(role, content)| PreparedMessage {
                role,
                content: content.to_string(),
                tokens: None,
            })
            .collect();
        PreviewResponse {
            provider_name: None,
            model_name: None,
            max_tokens_for_model: None,
            final_token_count: None,
            truncation_actions_taken: Default::default(),
            prepared_messages,
            rag_documents_used: vec![],
            included_item_ids: None,
            rendered_rag_template_content: None,
        }
    }

    #[test]
    fn test_workspace_marker_includes_item() {
        let preview = preview_with_segments(vec![(
            Role::System,
            "Context follows.\n[Workspace Item ID: abc123]\nfn main() {}",
        )]);
        let report = reconcile(&preview);

        let included = StagedItem::workspace_ref("abc123");
        let dropped = StagedItem::workspace_ref("xyz999");
        assert_eq!(report.status_of(&included), InclusionStatus::Included);
        assert_eq!(report.status_of(&dropped), InclusionStatus::Dropped);
        assert_eq!(report.source(), ProvenanceSource::Markers);
    }

    #[test]
    fn test_history_marker_includes_item() {
        let preview = preview_with_segments(vec![(
            Role::System,
            "[History Message ID: msg-7] earlier discussion",
        )]);
        let report = reconcile(&preview);
        assert!(report.is_included(&StagedItem::history_ref("msg-7")));
    }

    #[test]
    fn test_three_staged_two_referenced_one_dropped() {
        let preview = preview_with_segments(vec![
            (Role::System, "[Workspace Item ID: ws-1]"),
            (Role::System, "[History Message ID: m-2]"),
            (Role::User, "the question"),
        ]);
        let staged = vec![
            StagedItem::workspace_ref("ws-1"),
            StagedItem::history_ref("m-2"),
            StagedItem::workspace_ref("ws-3"),
        ];
        let report = reconcile(&preview);
        assert_eq!(report.dropped_count(&staged), 1);
        assert_eq!(report.status_of(&staged[2]), InclusionStatus::Dropped);
    }

    #[test]
    fn test_non_system_segments_not_scanned() {
        let preview = preview_with_segments(vec![(
            Role::User,
            "[Workspace Item ID: abc123] quoted by the user",
        )]);
        let report = reconcile(&preview);
        assert!(!report.is_included(&StagedItem::workspace_ref("abc123")));
    }

    #[test]
    fn test_text_item_resolves_by_own_id() {
        let item = StagedItem::text("inline snippet");
        let marker = format!("[Workspace Item ID: {}]", item.spec_item_id);
        let preview = preview_with_segments(vec![(Role::System, &marker)]);
        assert!(reconcile(&preview).is_included(&item));
    }

    #[test]
    fn test_structured_ids_preferred_over_markers() {
        let mut preview = preview_with_segments(vec![(
            Role::System,
            "[Workspace Item ID: marker-only]",
        )]);
        preview.included_item_ids = Some(vec!["structured-1".into()]);

        let report = reconcile(&preview);
        assert_eq!(report.source(), ProvenanceSource::Structured);
        assert!(report.is_included(&StagedItem::workspace_ref("structured-1")));
        assert!(!report.is_included(&StagedItem::workspace_ref("marker-only")));
    }

    #[test]
    fn test_multiple_markers_in_one_segment() {
        let preview = preview_with_segments(vec![(
            Role::System,
            "[Workspace Item ID: a] text [Workspace Item ID: b] [History Message ID: c]",
        )]);
        let report = reconcile(&preview);
        for id in ["a", "b"] {
            assert!(report.is_included(&StagedItem::workspace_ref(id)));
        }
        assert!(report.is_included(&StagedItem::history_ref("c")));
    }

    #[test]
    fn test_empty_preview_drops_everything() {
        let preview = preview_with_segments(vec![]);
        let staged = vec![StagedItem::text("a"), StagedItem::workspace_ref("b")];
        assert_eq!(reconcile(&preview).dropped_count(&staged), 2);
    }
}
