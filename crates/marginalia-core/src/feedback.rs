//! Feedback service seam: request payloads and response parsing.
//!
//! The LLM feedback service is opaque. Marginalia sends it the document
//! text plus a flattened view of the annotation graph and receives a string
//! that should contain JSON. Models often wrap that JSON in a markdown code
//! fence, so [`parse_analysis`] accepts both forms.
//!
//! # Request kinds
//!
//! | Kind | Endpoint | Response |
//! |------|----------|----------|
//! | [`FeedbackKind::OptionAnalyze`] | `/openai/option-analyze` | [`OptionFeedback`] |
//! | [`FeedbackKind::DeliberationAnalyze`] | `/openai/deliberation-analyze` | [`DeliberationFeedback`] |
//! | [`FeedbackKind::OptionDialogue`] | `/openai/option-dialogue` | [`DialogueFeedback`] |
//! | [`FeedbackKind::DeliberationDialogue`] | `/openai/deliberation-dialogue` | [`DialogueFeedback`] |

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::anchor::document_order;
use crate::error::AnnotationError;
use crate::graph::AnnotationGraph;
use crate::models::{AuthorKind, CommentId, Highlight, HighlightId};
use crate::text_layout::TextLine;

/// Placeholder comment text for highlights without comments.
pub const NO_COMMENT: &str = "(none)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    OptionAnalyze,
    DeliberationAnalyze,
    OptionDialogue,
    DeliberationDialogue,
}

impl FeedbackKind {
    pub fn endpoint(&self) -> &'static str {
        match self {
            FeedbackKind::OptionAnalyze => "/openai/option-analyze",
            FeedbackKind::DeliberationAnalyze => "/openai/deliberation-analyze",
            FeedbackKind::OptionDialogue => "/openai/option-dialogue",
            FeedbackKind::DeliberationDialogue => "/openai/deliberation-dialogue",
        }
    }
}

/// One highlight × comment pair sent to the service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRow {
    pub highlight_id: HighlightId,
    pub highlight_text: String,
    pub comment_id: Option<CommentId>,
    pub comment_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadComment {
    pub id: CommentId,
    pub parent_id: Option<CommentId>,
    pub author: String,
    pub text: String,
    pub created_at: String,
}

/// A thread the user selected for a dialogue round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DialogueThread {
    pub root_comment_id: CommentId,
    pub highlight_id: HighlightId,
    pub highlight_text: String,
    pub comments: Vec<ThreadComment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRequest {
    #[serde(skip)]
    pub kind: FeedbackKind,
    /// Full document text with page markers.
    pub mt_text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<FeedbackRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub text_lines: Vec<TextLine>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub selected_threads: Vec<DialogueThread>,
}

/// The LLM feedback service.
#[async_trait]
pub trait FeedbackService: Send + Sync {
    /// Submit a request and return the raw analysis text.
    async fn request(&self, req: &FeedbackRequest) -> Result<String, AnnotationError>;
}

// ============ Responses ============

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HighlightedFeedback {
    #[serde(alias = "highlightId", deserialize_with = "crate::models::de_id")]
    pub highlight_id: HighlightId,
    #[serde(
        default,
        alias = "commentId",
        deserialize_with = "crate::models::de_opt_id"
    )]
    pub comment_id: Option<CommentId>,
    #[serde(default, alias = "interventionNeeded")]
    pub intervention_needed: bool,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default, alias = "suggestionReason")]
    pub suggestion_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UnhighlightedFeedback {
    #[serde(alias = "unhighlightedText", alias = "text")]
    pub unhighlighted_text: String,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default, alias = "suggestionReason")]
    pub suggestion_reason: Option<String>,
}

/// Response to an option round.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OptionFeedback {
    #[serde(default, alias = "highlight_feedback")]
    pub highlighted: Vec<HighlightedFeedback>,
    #[serde(default, rename = "nonHighlighted", alias = "unhighlighted_feedback")]
    pub non_highlighted: Vec<UnhighlightedFeedback>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeliberationSuggestion {
    #[serde(
        default,
        alias = "highlightId",
        deserialize_with = "crate::models::de_opt_id"
    )]
    pub highlight_id: Option<HighlightId>,
    #[serde(
        default,
        alias = "commentId",
        deserialize_with = "crate::models::de_opt_id"
    )]
    pub comment_id: Option<CommentId>,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default, alias = "suggestionReason")]
    pub suggestion_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeliberationFeedback {
    #[serde(default)]
    pub suggestions: Vec<DeliberationSuggestion>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DialogueResponse {
    #[serde(alias = "rootCommentId", deserialize_with = "crate::models::de_id")]
    pub root_comment_id: CommentId,
    #[serde(alias = "responseText")]
    pub response_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DialogueFeedback {
    #[serde(default)]
    pub dialogue_responses: Vec<DialogueResponse>,
}

/// Body of a fenced code block, preferring one tagged `json`.
fn fenced_block(raw: &str) -> Option<&str> {
    let start = raw
        .find("```json")
        .map(|i| i + "```json".len())
        .or_else(|| raw.find("```").map(|i| i + 3))?;
    let rest = &raw[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

/// Parse the service's analysis text as `T`.
///
/// Tries the whole string first, then the contents of a markdown code
/// fence.
///
/// # Errors
///
/// [`AnnotationError::MalformedResponse`] when neither form parses.
pub fn parse_analysis<T: DeserializeOwned>(raw: &str) -> Result<T, AnnotationError> {
    match serde_json::from_str::<T>(raw.trim()) {
        Ok(v) => Ok(v),
        Err(direct) => {
            let Some(inner) = fenced_block(raw) else {
                return Err(AnnotationError::MalformedResponse(direct.to_string()));
            };
            serde_json::from_str::<T>(inner)
                .map_err(|e| AnnotationError::MalformedResponse(e.to_string()))
        }
    }
}

// ============ Request rows ============

/// Highlights ordered by anchor position, anchorless ones last.
fn highlights_in_document_order(graph: &AnnotationGraph) -> Vec<&Highlight> {
    let mut hs: Vec<&Highlight> = graph.highlights().iter().collect();
    hs.sort_by(|a, b| document_order(a.anchor.as_ref(), b.anchor.as_ref()));
    hs
}

fn rows_for(graph: &AnnotationGraph, h: &Highlight) -> Vec<FeedbackRow> {
    let live = graph.live_comments_for(&h.id);
    if live.is_empty() {
        return vec![FeedbackRow {
            highlight_id: h.id.clone(),
            highlight_text: h.source_text.trim().to_string(),
            comment_id: None,
            comment_text: NO_COMMENT.to_string(),
        }];
    }
    live.into_iter()
        .map(|c| FeedbackRow {
            highlight_id: h.id.clone(),
            highlight_text: h.source_text.trim().to_string(),
            comment_id: Some(c.id.clone()),
            comment_text: c.text.trim().to_string(),
        })
        .collect()
}

/// Rows for an option round: every highlight, every live comment.
pub fn option_rows(graph: &AnnotationGraph) -> Vec<FeedbackRow> {
    highlights_in_document_order(graph)
        .into_iter()
        .flat_map(|h| rows_for(graph, h))
        .collect()
}

/// Rows for a deliberation round: only highlights whose latest live
/// comment was written by the LLM.
pub fn deliberation_rows(graph: &AnnotationGraph) -> Vec<FeedbackRow> {
    highlights_in_document_order(graph)
        .into_iter()
        .filter(|h| {
            graph
                .latest_live_comment(&h.id)
                .is_some_and(|c| c.author.kind == AuthorKind::Llm)
        })
        .flat_map(|h| rows_for(graph, h))
        .collect()
}

/// Threads for the roots currently selected for dialogue.
pub fn dialogue_threads(graph: &AnnotationGraph) -> Vec<DialogueThread> {
    graph
        .selected_roots()
        .into_iter()
        .map(|root| DialogueThread {
            root_comment_id: root.id.clone(),
            highlight_id: root.highlight_id.clone(),
            highlight_text: graph
                .highlight(&root.highlight_id)
                .map(|h| h.source_text.trim().to_string())
                .unwrap_or_default(),
            comments: graph
                .live_comments_for(&root.highlight_id)
                .into_iter()
                .map(|c| ThreadComment {
                    id: c.id.clone(),
                    parent_id: c.parent_id.clone(),
                    author: c.author.name.clone(),
                    text: c.text.trim().to_string(),
                    created_at: c.created_at.to_rfc3339(),
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{GeometricAnchor, PageRect};
    use crate::models::{Author, Comment, HighlightKind};
    use chrono::{Duration, TimeZone, Utc};

    fn highlight(id: &str, y: f64) -> Highlight {
        Highlight {
            id: id.into(),
            kind: HighlightKind::PdfText,
            source_text: format!(" {} text ", id),
            anchor: Some(GeometricAnchor::new(vec![PageRect::new(1, 0.0, y, 10.0, y + 5.0)]).unwrap()),
            memo: String::new(),
            created_at: Utc::now(),
            created_by: Author::user("u"),
            has_user_reply: false,
        }
    }

    fn comment(id: &str, hid: &str, parent: Option<&str>, author: Author, at: i64) -> Comment {
        Comment {
            id: id.into(),
            highlight_id: hid.into(),
            parent_id: parent.map(Into::into),
            author,
            text: format!("{} says", id),
            purpose: None,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(at),
            edited_at: None,
            deleted_at: None,
            deleted_reason: None,
        }
    }

    fn graph() -> AnnotationGraph {
        let mut g = AnnotationGraph::new();
        g.add_highlight(highlight("h2", 50.0)).unwrap();
        g.add_highlight_with_root_comment(
            highlight("h1", 10.0),
            comment("c1", "h1", None, Author::user("u"), 0),
        )
        .unwrap();
        g.add_comment(comment("c2", "h1", Some("c1"), Author::llm("LLM"), 1))
            .unwrap();
        g
    }

    #[test]
    fn test_option_rows_include_placeholder() {
        let rows = option_rows(&graph());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].highlight_id, "h1");
        assert_eq!(rows[0].highlight_text, "h1 text");
        assert_eq!(rows[2].highlight_id, "h2");
        assert_eq!(rows[2].comment_text, NO_COMMENT);
        assert_eq!(rows[2].comment_id, None);
    }

    #[test]
    fn test_deliberation_rows_need_llm_last_word() {
        let mut g = graph();
        assert_eq!(deliberation_rows(&g).len(), 2);
        g.add_comment(comment("c3", "h1", Some("c2"), Author::user("u"), 2))
            .unwrap();
        assert!(deliberation_rows(&g).is_empty());
    }

    #[test]
    fn test_parse_plain_and_fenced_json() {
        let plain = r#"{"highlight_feedback": [{"highlight_id": 4, "intervention_needed": true,
                        "suggestion": "s", "suggestion_reason": "r"}],
                        "unhighlighted_feedback": [{"unhighlighted_text": "x", "suggestion": "y"}]}"#;
        let parsed: OptionFeedback = parse_analysis(plain).unwrap();
        assert_eq!(parsed.highlighted[0].highlight_id, "4");
        assert!(parsed.highlighted[0].intervention_needed);
        assert_eq!(parsed.non_highlighted[0].unhighlighted_text, "x");

        let fenced = "Here you go:\n```json\n{\"suggestions\": [{\"comment_id\": \"c2\", \"suggestion\": \"think\"}]}\n```\nthanks";
        let parsed: DeliberationFeedback = parse_analysis(fenced).unwrap();
        assert_eq!(parsed.suggestions[0].comment_id.as_deref(), Some("c2"));
    }

    #[test]
    fn test_parse_garbage_is_malformed() {
        let err = parse_analysis::<DialogueFeedback>("sorry, I cannot help").unwrap_err();
        assert!(matches!(err, AnnotationError::MalformedResponse(_)));
    }

    #[test]
    fn test_dialogue_threads_follow_selection() {
        let mut g = graph();
        assert!(dialogue_threads(&g).is_empty());
        g.toggle_root_selection("c1").unwrap();
        let threads = dialogue_threads(&g);
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].comments.len(), 2);
        assert_eq!(threads[0].comments[1].author, "LLM");
    }

    #[test]
    fn test_request_serializes_without_empty_lists() {
        let req = FeedbackRequest {
            kind: FeedbackKind::OptionAnalyze,
            mt_text: "doc".into(),
            highlights: option_rows(&graph()),
            text_lines: vec![],
            selected_threads: vec![],
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["mt_text"], "doc");
        assert!(v.get("text_lines").is_none());
        assert!(v.get("kind").is_none());
        assert_eq!(v["highlights"][2]["comment_id"], serde_json::Value::Null);
    }
}
