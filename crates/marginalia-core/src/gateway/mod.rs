//! Persistence abstraction for highlights, comments, and document stage.
//!
//! The [`PersistenceGateway`] trait covers every backend call the editor
//! and the feedback orchestrator make, so the core can be exercised against
//! [`memory::InMemoryGateway`] and run against the REST backend through the
//! application crate's `HttpGateway`.
//!
//! Wire types are camelCase JSON. Ids may arrive as numbers or strings and
//! are normalized to `String`; snake_case field names from older backend
//! builds are accepted as aliases.
//!
//! # Operations
//!
//! | Method | HTTP |
//! |--------|------|
//! | [`create_highlight`](PersistenceGateway::create_highlight) | `POST /highlights` |
//! | [`delete_highlight`](PersistenceGateway::delete_highlight) | `DELETE /highlights/{id}` |
//! | [`create_comment`](PersistenceGateway::create_comment) | `POST /comments` |
//! | [`update_comment`](PersistenceGateway::update_comment) | `PUT /comments/{id}` |
//! | [`delete_comment`](PersistenceGateway::delete_comment) | `DELETE /comments/{id}[?reason=]` |
//! | [`restore_latest_comment`](PersistenceGateway::restore_latest_comment) | `POST /comments/restore-latest` |
//! | [`list_highlights`](PersistenceGateway::list_highlights) | `GET /highlights/file/{fileId}` |
//! | [`fetch_document`](PersistenceGateway::fetch_document) | `GET /documents/{id}` |
//! | [`update_completion_stage`](PersistenceGateway::update_completion_stage) | `PATCH /documents/{id}/update-completion-stage` |
//! | [`export_document`](PersistenceGateway::export_document) | `GET /documents/{id}/files/{fileId}/export` |

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::anchor::{GeometricAnchor, PageRect};
use crate::error::AnnotationError;
use crate::graph::AnnotationGraph;
use crate::models::{
    de_id, de_opt_id, parse_timestamp, Author, Comment, CommentId, CommentPurpose,
    CompletionStage, Highlight, HighlightId, HighlightKind,
};

/// One rectangle as stored by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RectDto {
    #[serde(alias = "page_num")]
    pub page_num: u32,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl From<&PageRect> for RectDto {
    fn from(r: &PageRect) -> Self {
        Self {
            page_num: r.page_number,
            x1: r.x1,
            y1: r.y1,
            x2: r.x2,
            y2: r.y2,
        }
    }
}

impl From<&RectDto> for PageRect {
    fn from(r: &RectDto) -> Self {
        PageRect::new(r.page_num, r.x1, r.y1, r.x2, r.y2)
    }
}

pub fn rects_of(anchor: &GeometricAnchor) -> Vec<RectDto> {
    anchor.rects().iter().map(RectDto::from).collect()
}

/// Body of `POST /highlights`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHighlight {
    pub file_id: String,
    pub created_by: String,
    pub memo: String,
    pub text: String,
    pub rects: Vec<RectDto>,
    pub element_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<CommentPurpose>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedHighlight {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, alias = "created_at")]
    pub created_at: Option<String>,
    /// Root comment created alongside the highlight, when the backend does so.
    #[serde(default, alias = "comment_id", deserialize_with = "de_opt_id")]
    pub comment_id: Option<String>,
}

/// Body of `POST /comments`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub highlight_id: String,
    pub parent_id: Option<String>,
    pub author: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<CommentPurpose>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedComment {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, alias = "created_at")]
    pub created_at: Option<String>,
}

/// A comment as returned by list/update/restore calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(alias = "highlight_id", deserialize_with = "de_id")]
    pub highlight_id: String,
    #[serde(default, alias = "parent_id", deserialize_with = "de_opt_id")]
    pub parent_id: Option<String>,
    pub author: String,
    pub text: String,
    #[serde(default)]
    pub purpose: Option<u8>,
    #[serde(alias = "created_at")]
    pub created_at: String,
    #[serde(default, alias = "updated_at")]
    pub updated_at: Option<String>,
    #[serde(default, alias = "deleted_at")]
    pub deleted_at: Option<String>,
    #[serde(default, alias = "deleted_reason")]
    pub deleted_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightRecord {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, alias = "document_file_id", deserialize_with = "de_opt_id")]
    pub file_id: Option<String>,
    #[serde(alias = "created_by")]
    pub created_by: String,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub rects: Vec<RectDto>,
    #[serde(default, alias = "element_type")]
    pub element_type: Option<String>,
    #[serde(alias = "created_at")]
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightWithComments {
    pub highlight: HighlightRecord,
    #[serde(default)]
    pub comments: Vec<CommentRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(alias = "document_name")]
    pub document_name: String,
    #[serde(default, alias = "completion_stage")]
    pub completion_stage: Option<CompletionStage>,
}

/// Backend operations used by the editor and the feedback orchestrator.
///
/// Every failure is an [`AnnotationError`]; implementations classify HTTP
/// failures with [`crate::error::classify_failure`]. No method retries.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn create_highlight(&self, req: &NewHighlight)
        -> Result<CreatedHighlight, AnnotationError>;

    /// A body containing `Cannot delete` surfaces as
    /// [`AnnotationError::BusinessRule`].
    async fn delete_highlight(&self, id: &str) -> Result<(), AnnotationError>;

    async fn create_comment(&self, req: &NewComment) -> Result<CreatedComment, AnnotationError>;

    async fn update_comment(&self, id: &str, text: &str) -> Result<CommentRecord, AnnotationError>;

    /// Delete a comment. `reason` turns the delete of an LLM reply into a
    /// soft delete on the backend.
    async fn delete_comment(&self, id: &str, reason: Option<&str>) -> Result<(), AnnotationError>;

    /// Undo the most recent soft delete. `None` when nothing was restorable.
    async fn restore_latest_comment(&self) -> Result<Option<CommentRecord>, AnnotationError>;

    /// All highlights of a file. A missing file yields an empty list.
    async fn list_highlights(
        &self,
        file_id: &str,
    ) -> Result<Vec<HighlightWithComments>, AnnotationError>;

    async fn fetch_document(&self, document_id: &str) -> Result<DocumentRecord, AnnotationError>;

    /// Persist the stage and return the value the server confirmed.
    async fn update_completion_stage(
        &self,
        document_id: &str,
        stage: CompletionStage,
    ) -> Result<CompletionStage, AnnotationError>;

    async fn export_document(
        &self,
        document_id: &str,
        file_id: &str,
    ) -> Result<Vec<u8>, AnnotationError>;
}

// ============ Highlight + root comment ============

/// Everything needed to persist a new highlight with its root comment.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightDraft {
    pub file_id: String,
    pub author: Author,
    pub kind: HighlightKind,
    pub source_text: String,
    pub anchor: GeometricAnchor,
    /// Also the text of the root comment.
    pub memo: String,
    pub purpose: Option<CommentPurpose>,
    pub suggestion_reason: Option<String>,
}

/// Server timestamp if it parses, otherwise now.
pub fn created_or_now(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(parse_timestamp).unwrap_or_else(Utc::now)
}

/// Persist a highlight and its root comment, then insert both into the graph.
///
/// When the backend does not return a `commentId`, the root comment is
/// created with a second call. If that call fails the highlight is deleted
/// again (best effort) and the graph is left untouched.
///
/// # Errors
///
/// The first gateway error, or a graph validation error.
pub async fn create_highlight_with_root(
    gateway: &dyn PersistenceGateway,
    graph: &mut AnnotationGraph,
    draft: HighlightDraft,
) -> Result<(HighlightId, CommentId), AnnotationError> {
    let req = NewHighlight {
        file_id: draft.file_id.clone(),
        created_by: draft.author.name.clone(),
        memo: draft.memo.clone(),
        text: draft.source_text.clone(),
        rects: rects_of(&draft.anchor),
        element_type: draft.kind.element_type().to_string(),
        purpose: draft.purpose,
        suggestion_reason: draft.suggestion_reason.clone(),
    };
    let created = gateway.create_highlight(&req).await?;
    let created_at = created_or_now(created.created_at.as_deref());

    let (root_id, root_created_at) = match created.comment_id {
        Some(cid) => (cid, created_at),
        None => {
            let root = NewComment {
                highlight_id: created.id.clone(),
                parent_id: None,
                author: draft.author.name.clone(),
                text: draft.memo.clone(),
                purpose: draft.purpose,
                suggestion_reason: draft.suggestion_reason.clone(),
            };
            match gateway.create_comment(&root).await {
                Ok(c) => {
                    let at = created_or_now(c.created_at.as_deref());
                    (c.id, at)
                }
                Err(e) => {
                    log::error!(
                        "root comment for highlight {} failed: {}; deleting highlight",
                        created.id,
                        e
                    );
                    if let Err(cleanup) = gateway.delete_highlight(&created.id).await {
                        log::warn!("cleanup of highlight {} failed: {}", created.id, cleanup);
                    }
                    return Err(e);
                }
            }
        }
    };

    let highlight = Highlight {
        id: created.id.clone(),
        kind: draft.kind,
        source_text: draft.source_text,
        anchor: Some(draft.anchor),
        memo: draft.memo.clone(),
        created_at,
        created_by: draft.author.clone(),
        has_user_reply: false,
    };
    let root = Comment {
        id: root_id.clone(),
        highlight_id: created.id.clone(),
        parent_id: None,
        author: draft.author,
        text: draft.memo,
        purpose: draft.purpose,
        created_at: root_created_at,
        edited_at: None,
        deleted_at: None,
        deleted_reason: None,
    };
    graph.add_highlight_with_root_comment(highlight, root)?;
    log::info!("created highlight {} with root comment {}", created.id, root_id);
    Ok((created.id, root_id))
}

// ============ Rehydration ============

fn timestamp_or_epoch(raw: &str, what: &str) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap_or_else(|| {
        log::warn!("unparseable timestamp {:?} on {}", raw, what);
        DateTime::<Utc>::default()
    })
}

impl CommentRecord {
    pub fn into_comment(self, llm_label: &str) -> Comment {
        let created_at = timestamp_or_epoch(&self.created_at, &self.id);
        let edited_at = self.updated_at.as_deref().and_then(parse_timestamp);
        let deleted_at = self.deleted_at.as_deref().and_then(parse_timestamp);
        Comment {
            author: Author::classify(&self.author, llm_label),
            purpose: self.purpose.and_then(|p| CommentPurpose::try_from(p).ok()),
            id: self.id,
            highlight_id: self.highlight_id,
            parent_id: self.parent_id,
            text: self.text,
            created_at,
            // backends stamp updated_at on insert; only treat later values as edits
            edited_at: edited_at.filter(|e| *e > created_at),
            deleted_at,
            deleted_reason: self.deleted_reason,
        }
    }
}

impl HighlightRecord {
    pub fn into_highlight(self, llm_label: &str) -> Highlight {
        let rects: Vec<PageRect> = self.rects.iter().map(PageRect::from).collect();
        let kind = HighlightKind::from_element_type(self.element_type.as_deref().unwrap_or("pdf"));
        Highlight {
            created_at: timestamp_or_epoch(&self.created_at, &self.id),
            created_by: Author::classify(&self.created_by, llm_label),
            anchor: GeometricAnchor::from_lossy(rects),
            source_text: self.text.unwrap_or_default(),
            memo: self.memo,
            kind,
            id: self.id,
            has_user_reply: false,
        }
    }
}

/// Convert a list response into graph records.
pub fn rehydrate(
    records: Vec<HighlightWithComments>,
    llm_label: &str,
) -> (Vec<Highlight>, Vec<Comment>) {
    let mut highlights = Vec::with_capacity(records.len());
    let mut comments = Vec::new();
    for rec in records {
        let hid = rec.highlight.id.clone();
        highlights.push(rec.highlight.into_highlight(llm_label));
        for c in rec.comments {
            let mut c = c.into_comment(llm_label);
            if c.highlight_id.is_empty() {
                c.highlight_id = hid.clone();
            }
            comments.push(c);
        }
    }
    (highlights, comments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuthorKind;

    #[test]
    fn test_list_response_accepts_snake_and_numeric_ids() {
        let body = r#"[{
            "highlight": {"id": 7, "document_file_id": 3, "created_by": "LLM",
                          "memo": "m", "text": "t", "element_type": "pdf",
                          "created_at": "2025-01-02T03:04:05",
                          "rects": [{"page_num": 2, "x1": 1, "y1": 2, "x2": 30, "y2": 12}]},
            "comments": [
                {"id": 11, "highlight_id": 7, "parent_id": null, "author": "llm",
                 "text": "root", "created_at": "2025-01-02T03:04:05",
                 "updated_at": "2025-01-02T03:04:05", "deleted_at": null},
                {"id": 12, "highlight_id": 7, "parent_id": 11, "author": "bob",
                 "text": "reply", "purpose": 3, "created_at": "2025-01-02T03:05:00"}
            ]
        }]"#;
        let records: Vec<HighlightWithComments> = serde_json::from_str(body).unwrap();
        let (hs, cs) = rehydrate(records, "LLM");
        assert_eq!(hs[0].id, "7");
        assert_eq!(hs[0].created_by.kind, AuthorKind::Llm);
        assert_eq!(hs[0].anchor.as_ref().unwrap().first_page(), 2);
        assert_eq!(cs[0].author.kind, AuthorKind::Llm);
        assert_eq!(cs[0].edited_at, None);
        assert_eq!(cs[1].parent_id.as_deref(), Some("11"));
        assert_eq!(cs[1].purpose, Some(CommentPurpose::Deliberation));
    }

    #[test]
    fn test_empty_rects_rehydrate_without_anchor() {
        let rec = HighlightRecord {
            id: "1".into(),
            file_id: None,
            created_by: "alice".into(),
            memo: String::new(),
            text: None,
            rects: vec![],
            element_type: None,
            created_at: "2025-01-01T00:00:00Z".into(),
        };
        assert!(rec.into_highlight("LLM").anchor.is_none());
    }

    #[test]
    fn test_new_highlight_is_camel_case() {
        let req = NewHighlight {
            file_id: "f1".into(),
            created_by: "alice".into(),
            memo: "m".into(),
            text: "t".into(),
            rects: vec![RectDto {
                page_num: 1,
                x1: 0.0,
                y1: 0.0,
                x2: 1.0,
                y2: 1.0,
            }],
            element_type: "pdf".into(),
            purpose: None,
            suggestion_reason: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["fileId"], "f1");
        assert_eq!(v["elementType"], "pdf");
        assert_eq!(v["rects"][0]["pageNum"], 1);
        assert!(v.get("purpose").is_none());
    }

    fn draft() -> HighlightDraft {
        HighlightDraft {
            file_id: "f1".into(),
            author: Author::user("alice"),
            kind: HighlightKind::PdfText,
            source_text: "quoted".into(),
            anchor: GeometricAnchor::new(vec![PageRect::new(1, 0.0, 0.0, 10.0, 10.0)]).unwrap(),
            memo: "why this?".into(),
            purpose: None,
            suggestion_reason: None,
        }
    }

    #[tokio::test]
    async fn test_create_with_root_uses_returned_comment_id() {
        let gw = memory::InMemoryGateway::default();
        let mut graph = AnnotationGraph::new();
        let (hid, cid) = create_highlight_with_root(&gw, &mut graph, draft())
            .await
            .unwrap();
        assert_eq!(graph.root_for(&hid).unwrap().id, cid);
        assert_eq!(gw.call_count(memory::GatewayOp::CreateComment), 0);
    }

    #[tokio::test]
    async fn test_create_with_root_creates_missing_root() {
        let gw = memory::InMemoryGateway::default();
        gw.omit_comment_id(true);
        let mut graph = AnnotationGraph::new();
        let (hid, _) = create_highlight_with_root(&gw, &mut graph, draft())
            .await
            .unwrap();
        assert_eq!(gw.call_count(memory::GatewayOp::CreateComment), 1);
        assert_eq!(graph.root_for(&hid).unwrap().text, "why this?");
    }

    #[tokio::test]
    async fn test_failed_root_rolls_back_highlight() {
        let gw = memory::InMemoryGateway::default();
        gw.omit_comment_id(true);
        gw.fail_nth(memory::GatewayOp::CreateComment, 1);
        let mut graph = AnnotationGraph::new();
        let result = create_highlight_with_root(&gw, &mut graph, draft()).await;
        assert!(result.is_err());
        assert!(graph.highlights().is_empty());
        assert!(gw.stored_highlights().is_empty());
        assert_eq!(gw.call_count(memory::GatewayOp::DeleteHighlight), 1);
    }
}
