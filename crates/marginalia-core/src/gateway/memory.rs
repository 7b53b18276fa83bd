//! In-memory [`PersistenceGateway`] for tests and offline use.
//!
//! Mirrors the backend's delete rules and id assignment, and supports
//! failure injection so callers can exercise partial-batch and rollback
//! paths. Timestamps come from a deterministic clock (one second per
//! created record) so ordering in tests is stable.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::error::AnnotationError;
use crate::models::{CompletionStage, HighlightKind};

use super::{
    CommentRecord, CreatedComment, CreatedHighlight, DocumentRecord, HighlightRecord,
    HighlightWithComments, NewComment, NewHighlight, PersistenceGateway,
};

/// Gateway operation, used to target failure injection and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    CreateHighlight,
    DeleteHighlight,
    CreateComment,
    UpdateComment,
    DeleteComment,
    RestoreLatest,
    ListHighlights,
    FetchDocument,
    UpdateStage,
    Export,
}

#[derive(Default)]
struct State {
    next_id: u64,
    highlights: Vec<HighlightRecord>,
    comments: Vec<CommentRecord>,
    documents: HashMap<String, DocumentRecord>,
    calls: HashMap<GatewayOp, usize>,
    /// op -> 1-based call numbers that fail
    failures: HashMap<GatewayOp, Vec<usize>>,
    omit_comment_id: bool,
}

/// In-memory backend.
pub struct InMemoryGateway {
    llm_label: String,
    state: Mutex<State>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new("LLM")
    }
}

fn clock(tick: u64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
        + Duration::seconds(tick as i64)
}

fn stamp(tick: u64) -> String {
    clock(tick).to_rfc3339()
}

impl InMemoryGateway {
    pub fn new(llm_label: impl Into<String>) -> Self {
        Self {
            llm_label: llm_label.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a document so stage and fetch calls succeed.
    pub fn with_document(self, id: &str, name: &str, stage: CompletionStage) -> Self {
        self.lock().documents.insert(
            id.to_string(),
            DocumentRecord {
                id: id.to_string(),
                document_name: name.to_string(),
                completion_stage: Some(stage),
            },
        );
        self
    }

    /// Make the `nth` (1-based, counted from now on) call of `op` fail.
    pub fn fail_nth(&self, op: GatewayOp, nth: usize) {
        let mut st = self.lock();
        let done = st.calls.get(&op).copied().unwrap_or(0);
        st.failures.entry(op).or_default().push(done + nth);
    }

    /// Respond to `create_highlight` without a `commentId`, so the caller
    /// has to create the root comment itself.
    pub fn omit_comment_id(&self, omit: bool) {
        self.lock().omit_comment_id = omit;
    }

    pub fn call_count(&self, op: GatewayOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn stored_highlights(&self) -> Vec<HighlightRecord> {
        self.lock().highlights.clone()
    }

    pub fn stored_comments(&self) -> Vec<CommentRecord> {
        self.lock().comments.clone()
    }

    pub fn document_stage(&self, id: &str) -> Option<CompletionStage> {
        self.lock()
            .documents
            .get(id)
            .and_then(|d| d.completion_stage)
    }

    fn is_llm(&self, label: &str) -> bool {
        label.trim().eq_ignore_ascii_case(self.llm_label.trim())
    }

    /// Count the call and apply any injected failure.
    fn enter(&self, op: GatewayOp) -> Result<MutexGuard<'_, State>, AnnotationError> {
        let mut st = self.lock();
        let n = {
            let count = st.calls.entry(op).or_insert(0);
            *count += 1;
            *count
        };
        if st.failures.get(&op).is_some_and(|f| f.contains(&n)) {
            return Err(AnnotationError::transport(
                Some(500),
                format!("injected failure for {:?} call {}", op, n),
            ));
        }
        Ok(st)
    }
}

impl State {
    fn tick(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn create_highlight(
        &self,
        req: &NewHighlight,
    ) -> Result<CreatedHighlight, AnnotationError> {
        if req.rects.is_empty() {
            return Err(AnnotationError::transport(
                Some(422),
                "rects must not be empty",
            ));
        }
        let mut st = self.enter(GatewayOp::CreateHighlight)?;
        let hid = st.tick();
        let created_at = stamp(hid);
        st.highlights.push(HighlightRecord {
            id: hid.to_string(),
            file_id: Some(req.file_id.clone()),
            created_by: req.created_by.clone(),
            memo: req.memo.clone(),
            text: Some(req.text.clone()),
            rects: req.rects.clone(),
            element_type: Some(req.element_type.clone()),
            created_at: created_at.clone(),
        });
        if st.omit_comment_id {
            return Ok(CreatedHighlight {
                id: hid.to_string(),
                created_at: Some(created_at),
                comment_id: None,
            });
        }
        let cid = st.tick();
        st.comments.push(CommentRecord {
            id: cid.to_string(),
            highlight_id: hid.to_string(),
            parent_id: None,
            author: req.created_by.clone(),
            text: req.memo.clone(),
            purpose: req.purpose.map(u8::from),
            created_at: created_at.clone(),
            updated_at: None,
            deleted_at: None,
            deleted_reason: None,
        });
        Ok(CreatedHighlight {
            id: hid.to_string(),
            created_at: Some(created_at),
            comment_id: Some(cid.to_string()),
        })
    }

    async fn delete_highlight(&self, id: &str) -> Result<(), AnnotationError> {
        let mut st = self.enter(GatewayOp::DeleteHighlight)?;
        let Some(h) = st.highlights.iter().find(|h| h.id == id) else {
            return Err(AnnotationError::transport(Some(404), "Highlight not found"));
        };
        let llm_highlight = self.is_llm(&h.created_by);
        let has_user_reply = st.comments.iter().any(|c| {
            c.highlight_id == id && c.parent_id.is_some() && !self.is_llm(&c.author)
        });
        if llm_highlight && has_user_reply {
            return Err(AnnotationError::BusinessRule(
                "Cannot delete an AI highlight that has user replies".to_string(),
            ));
        }
        st.highlights.retain(|h| h.id != id);
        st.comments.retain(|c| c.highlight_id != id);
        Ok(())
    }

    async fn create_comment(&self, req: &NewComment) -> Result<CreatedComment, AnnotationError> {
        let mut st = self.enter(GatewayOp::CreateComment)?;
        if !st.highlights.iter().any(|h| h.id == req.highlight_id) {
            return Err(AnnotationError::transport(Some(404), "Highlight not found"));
        }
        if let Some(parent) = &req.parent_id {
            if !st.comments.iter().any(|c| &c.id == parent) {
                return Err(AnnotationError::transport(Some(404), "Parent comment not found"));
            }
        }
        let cid = st.tick();
        let created_at = stamp(cid);
        st.comments.push(CommentRecord {
            id: cid.to_string(),
            highlight_id: req.highlight_id.clone(),
            parent_id: req.parent_id.clone(),
            author: req.author.clone(),
            text: req.text.clone(),
            purpose: req.purpose.map(u8::from),
            created_at: created_at.clone(),
            updated_at: None,
            deleted_at: None,
            deleted_reason: None,
        });
        Ok(CreatedComment {
            id: cid.to_string(),
            created_at: Some(created_at),
        })
    }

    async fn update_comment(&self, id: &str, text: &str) -> Result<CommentRecord, AnnotationError> {
        let mut st = self.enter(GatewayOp::UpdateComment)?;
        let tick = st.tick();
        let Some(c) = st.comments.iter_mut().find(|c| c.id == id) else {
            return Err(AnnotationError::transport(Some(404), "Comment not found"));
        };
        c.text = text.to_string();
        c.updated_at = Some(stamp(tick));
        Ok(c.clone())
    }

    async fn delete_comment(&self, id: &str, reason: Option<&str>) -> Result<(), AnnotationError> {
        let mut st = self.enter(GatewayOp::DeleteComment)?;
        let tick = st.tick();
        let Some(c) = st.comments.iter().find(|c| c.id == id).cloned() else {
            return Err(AnnotationError::transport(Some(404), "Comment not found"));
        };
        let llm = self.is_llm(&c.author);
        if llm && c.parent_id.is_none() {
            st.comments
                .retain(|x| x.id != id && x.parent_id.as_deref() != Some(id));
        } else if llm {
            let reason = reason.map(str::trim).unwrap_or_default();
            if reason.is_empty() {
                return Err(AnnotationError::transport(
                    Some(400),
                    "A reason is required to delete an AI comment",
                ));
            }
            if let Some(c) = st.comments.iter_mut().find(|c| c.id == id) {
                c.deleted_at = Some(stamp(tick));
                c.deleted_reason = Some(reason.to_string());
            }
        } else {
            st.comments.retain(|x| x.id != id);
        }
        Ok(())
    }

    async fn restore_latest_comment(&self) -> Result<Option<CommentRecord>, AnnotationError> {
        let mut st = self.enter(GatewayOp::RestoreLatest)?;
        let latest = st
            .comments
            .iter()
            .enumerate()
            .filter(|(_, c)| c.deleted_at.is_some() && c.parent_id.is_some())
            .filter(|(_, c)| self.is_llm(&c.author))
            .max_by(|(_, a), (_, b)| a.deleted_at.cmp(&b.deleted_at))
            .map(|(i, _)| i);
        Ok(latest.map(|i| {
            let c = &mut st.comments[i];
            c.deleted_at = None;
            c.deleted_reason = None;
            c.clone()
        }))
    }

    async fn list_highlights(
        &self,
        file_id: &str,
    ) -> Result<Vec<HighlightWithComments>, AnnotationError> {
        let st = self.enter(GatewayOp::ListHighlights)?;
        Ok(st
            .highlights
            .iter()
            .filter(|h| h.file_id.as_deref() == Some(file_id))
            .map(|h| HighlightWithComments {
                highlight: h.clone(),
                comments: st
                    .comments
                    .iter()
                    .filter(|c| c.highlight_id == h.id)
                    .cloned()
                    .collect(),
            })
            .collect())
    }

    async fn fetch_document(&self, document_id: &str) -> Result<DocumentRecord, AnnotationError> {
        let st = self.enter(GatewayOp::FetchDocument)?;
        st.documents
            .get(document_id)
            .cloned()
            .ok_or_else(|| AnnotationError::NotFound(format!("document {}", document_id)))
    }

    async fn update_completion_stage(
        &self,
        document_id: &str,
        stage: CompletionStage,
    ) -> Result<CompletionStage, AnnotationError> {
        let mut st = self.enter(GatewayOp::UpdateStage)?;
        let doc = st
            .documents
            .entry(document_id.to_string())
            .or_insert_with(|| DocumentRecord {
                id: document_id.to_string(),
                document_name: String::new(),
                completion_stage: None,
            });
        doc.completion_stage = Some(stage);
        Ok(stage)
    }

    async fn export_document(
        &self,
        document_id: &str,
        file_id: &str,
    ) -> Result<Vec<u8>, AnnotationError> {
        let st = self.enter(GatewayOp::Export)?;
        let mut out = format!("document {} file {}\n", document_id, file_id);
        for h in st
            .highlights
            .iter()
            .filter(|h| h.file_id.as_deref() == Some(file_id))
        {
            let kind = HighlightKind::from_element_type(h.element_type.as_deref().unwrap_or("pdf"));
            out.push_str(&format!(
                "[{:?}] {}: {}\n",
                kind,
                h.text.as_deref().unwrap_or_default(),
                h.memo
            ));
        }
        Ok(out.into_bytes())
    }
}
