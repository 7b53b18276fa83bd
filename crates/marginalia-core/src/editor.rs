//! One open document: graph, render state, selection and the backend.
//!
//! [`EditorSession`] is what a front end drives. Every mutating operation
//! validates locally first, then calls the [`PersistenceGateway`], and only
//! touches the [`AnnotationGraph`] once the backend has confirmed. A failed
//! call leaves the graph as it was.

use std::sync::Arc;

use crate::anchor::PageRect;
use crate::error::AnnotationError;
use crate::gateway::{
    create_highlight_with_root, created_or_now, rehydrate, HighlightDraft, HighlightWithComments,
    NewComment, PersistenceGateway,
};
use crate::graph::{AnnotationGraph, CollapsePolicy, ThreadView};
use crate::models::{Author, Comment, CommentId, CompletionStage, HighlightId};
use crate::orchestrator::{FeedbackOrchestrator, StageReport};
use crate::render::{Generation, PageExtraction, PageRenderCoordinator, RenderEvent, RenderSurface};
use crate::selection::{CaptureOutcome, PendingHighlight, PointerUp, SelectionCapture};

pub struct EditorSession {
    gateway: Arc<dyn PersistenceGateway>,
    file_id: String,
    user: Author,
    llm_label: String,
    collapse: CollapsePolicy,
    graph: AnnotationGraph,
    render: PageRenderCoordinator,
    capture: SelectionCapture,
    stage: CompletionStage,
    pending: Option<PendingHighlight>,
}

impl EditorSession {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        file_id: impl Into<String>,
        user_name: impl Into<String>,
        llm_label: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            file_id: file_id.into(),
            user: Author::user(user_name),
            llm_label: llm_label.into(),
            collapse: CollapsePolicy::default(),
            graph: AnnotationGraph::new(),
            render: PageRenderCoordinator::new(),
            capture: SelectionCapture::new(),
            stage: CompletionStage::OptionTips,
            pending: None,
        }
    }

    pub fn with_collapse_policy(mut self, policy: CollapsePolicy) -> Self {
        self.collapse = policy;
        self
    }

    // ============ Accessors ============

    pub fn graph(&self) -> &AnnotationGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut AnnotationGraph {
        &mut self.graph
    }

    pub fn render(&self) -> &PageRenderCoordinator {
        &self.render
    }

    pub fn stage(&self) -> CompletionStage {
        self.stage
    }

    pub fn pending(&self) -> Option<&PendingHighlight> {
        self.pending.as_ref()
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// Replies of a thread as the comment panel shows them.
    pub fn thread_view(&self, root_id: &str) -> ThreadView<'_> {
        self.graph.collapsed_replies(root_id, self.collapse)
    }

    // ============ Document lifecycle ============

    /// Start a new document. Anything still in flight for the previous one
    /// is discarded when it arrives.
    pub fn open_document(&mut self, page_count: u32, stage: CompletionStage) -> Generation {
        self.graph.replace_all(Vec::new(), Vec::new());
        self.pending = None;
        self.stage = stage;
        let generation = self.render.load_document(page_count);
        log::info!(
            "editor: opened file {} ({} page(s), stage {})",
            self.file_id,
            page_count,
            stage
        );
        generation
    }

    pub fn page_extracted(
        &mut self,
        generation: Generation,
        page_number: u32,
        extraction: PageExtraction,
        surface: &dyn RenderSurface,
    ) -> Vec<RenderEvent> {
        self.render
            .page_extracted(generation, page_number, extraction, surface)
    }

    pub fn viewport_changed(
        &mut self,
        generation: Generation,
        surface: &dyn RenderSurface,
    ) -> Vec<RenderEvent> {
        self.render.viewport_changed(generation, surface)
    }

    /// Replace the graph with records fetched for `generation`.
    ///
    /// Returns `false` and changes nothing when another document was opened
    /// since the fetch started.
    pub fn apply_rehydration(
        &mut self,
        generation: Generation,
        records: Vec<HighlightWithComments>,
    ) -> bool {
        if generation != self.render.generation() {
            log::debug!(
                "editor: dropping rehydration for stale generation {}",
                generation.0
            );
            return false;
        }
        let (highlights, comments) = rehydrate(records, &self.llm_label);
        log::info!(
            "editor: loaded {} highlight(s), {} comment(s)",
            highlights.len(),
            comments.len()
        );
        self.graph.replace_all(highlights, comments);
        true
    }

    /// Fetch the file's highlights and comments and rehydrate the graph.
    pub async fn load_annotations(&mut self) -> Result<bool, AnnotationError> {
        let generation = self.render.generation();
        let records = self.gateway.list_highlights(&self.file_id).await?;
        Ok(self.apply_rehydration(generation, records))
    }

    // ============ Selection ============

    /// Classify a pointer-up. A click on a highlight focuses it; a new
    /// selection replaces any pending candidate.
    pub fn handle_pointer_up(&mut self, event: &PointerUp) -> CaptureOutcome {
        let scales = self.render.scale_map();
        let outcome = self.capture.capture(event, &self.graph, &scales);
        match &outcome {
            CaptureOutcome::HighlightClicked {
                highlight_id,
                scroll_target,
            } => {
                if let Err(e) = self
                    .graph
                    .focus_highlight(highlight_id, scroll_target.clone())
                {
                    log::warn!("editor: cannot focus {}: {}", highlight_id, e);
                }
            }
            CaptureOutcome::Candidate(pending) => {
                self.pending = Some(pending.clone());
            }
            CaptureOutcome::Ignored => {}
        }
        outcome
    }

    /// Offer shape rectangles as the pending candidate.
    pub fn propose_shape(
        &mut self,
        page_number: u32,
        rects: &[PageRect],
    ) -> Option<&PendingHighlight> {
        let pending = self.capture.capture_shape(page_number, rects)?;
        self.pending = Some(pending);
        self.pending.as_ref()
    }

    pub fn cancel_pending(&mut self) {
        self.pending = None;
    }

    /// Persist the pending candidate with `memo` as its first comment.
    ///
    /// # Errors
    ///
    /// [`AnnotationError::Validation`] when nothing is pending or the memo is
    /// blank; no network call is made. The candidate stays pending when the
    /// backend call fails.
    pub async fn confirm_pending(
        &mut self,
        memo: &str,
    ) -> Result<(HighlightId, CommentId), AnnotationError> {
        let pending = self
            .pending
            .clone()
            .ok_or_else(|| AnnotationError::validation("Select some text or a shape first."))?;
        let confirmed = pending.confirm(memo)?;
        let draft = HighlightDraft {
            file_id: self.file_id.clone(),
            author: self.user.clone(),
            kind: confirmed.kind,
            source_text: confirmed.source_text,
            anchor: confirmed.anchor,
            memo: confirmed.memo,
            purpose: None,
            suggestion_reason: None,
        };
        let ids = create_highlight_with_root(self.gateway.as_ref(), &mut self.graph, draft).await?;
        self.pending = None;
        Ok(ids)
    }

    // ============ Comments ============

    /// Reply as the user under `parent_id`.
    pub async fn reply(&mut self, parent_id: &str, text: &str) -> Result<CommentId, AnnotationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AnnotationError::validation("Please enter a reply."));
        }
        let parent = self
            .graph
            .comment(parent_id)
            .ok_or_else(|| AnnotationError::NotFound(format!("comment {}", parent_id)))?;
        let req = NewComment {
            highlight_id: parent.highlight_id.clone(),
            parent_id: Some(parent.id.clone()),
            author: self.user.name.clone(),
            text: text.to_string(),
            purpose: None,
            suggestion_reason: None,
        };
        let created = self.gateway.create_comment(&req).await?;
        self.graph.add_comment(Comment {
            id: created.id.clone(),
            highlight_id: req.highlight_id,
            parent_id: req.parent_id,
            author: self.user.clone(),
            text: req.text,
            purpose: None,
            created_at: created_or_now(created.created_at.as_deref()),
            edited_at: None,
            deleted_at: None,
            deleted_reason: None,
        })?;
        Ok(created.id)
    }

    pub async fn edit_comment(&mut self, id: &str, text: &str) -> Result<(), AnnotationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AnnotationError::validation("A comment cannot be empty."));
        }
        if self.graph.comment(id).is_none() {
            return Err(AnnotationError::NotFound(format!("comment {}", id)));
        }
        let record = self.gateway.update_comment(id, text).await?;
        self.graph.update_comment(id, &record.text);
        Ok(())
    }

    /// Remove a comment the way its kind requires.
    ///
    /// | Comment | Effect |
    /// |---------|--------|
    /// | root | the whole highlight is deleted |
    /// | AI reply | soft delete, `reason` required |
    /// | user reply | hard delete |
    pub async fn remove_comment(
        &mut self,
        id: &str,
        reason: Option<&str>,
    ) -> Result<(), AnnotationError> {
        let comment = self
            .graph
            .comment(id)
            .ok_or_else(|| AnnotationError::NotFound(format!("comment {}", id)))?;

        if comment.is_root() {
            let hid = comment.highlight_id.clone();
            self.gateway.delete_highlight(&hid).await?;
            self.graph.delete_highlight(&hid)?;
            log::info!("editor: deleted highlight {}", hid);
        } else if comment.author.is_llm() {
            let reason = reason.map(str::trim).filter(|r| !r.is_empty()).ok_or_else(|| {
                AnnotationError::validation("A reason is required to delete an AI comment.")
            })?;
            self.gateway.delete_comment(id, Some(reason)).await?;
            self.graph.soft_delete_comment(id, reason)?;
            log::info!("editor: hid AI comment {}", id);
        } else {
            self.gateway.delete_comment(id, None).await?;
            self.graph.delete_comment(id)?;
            log::info!("editor: deleted comment {}", id);
        }
        Ok(())
    }

    /// Undo the most recent AI comment soft delete.
    pub async fn restore_latest(&mut self) -> Result<Option<CommentId>, AnnotationError> {
        let Some(record) = self.gateway.restore_latest_comment().await? else {
            return Ok(None);
        };
        if self.graph.comment(&record.id).is_some() {
            self.graph.restore_comment(&record.id)?;
        } else {
            self.graph
                .add_comment(record.clone().into_comment(&self.llm_label))?;
        }
        Ok(Some(record.id))
    }

    /// Change a highlight's memo, which is also its root comment's text.
    pub async fn edit_memo(&mut self, highlight_id: &str, memo: &str) -> Result<(), AnnotationError> {
        let memo = memo.trim();
        if memo.is_empty() {
            return Err(AnnotationError::validation("A memo cannot be empty."));
        }
        if self.graph.highlight(highlight_id).is_none() {
            return Err(AnnotationError::NotFound(format!("highlight {}", highlight_id)));
        }
        let root_id = self
            .graph
            .root_for(highlight_id)
            .map(|c| c.id.clone())
            .ok_or_else(|| AnnotationError::NotFound(format!("root of highlight {}", highlight_id)))?;
        let record = self.gateway.update_comment(&root_id, memo).await?;
        self.graph.update_comment(&root_id, &record.text);
        self.graph.update_highlight_memo(highlight_id, &record.text);
        Ok(())
    }

    // ============ Feedback ============

    pub async fn run_feedback(
        &mut self,
        orchestrator: &FeedbackOrchestrator,
    ) -> Result<StageReport, AnnotationError> {
        orchestrator
            .run_stage(&mut self.stage, &mut self.graph, &self.render)
            .await
    }

    pub async fn run_dialogue(
        &mut self,
        orchestrator: &FeedbackOrchestrator,
    ) -> Result<StageReport, AnnotationError> {
        orchestrator
            .run_dialogue(self.stage, &mut self.graph, &self.render)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::{GatewayOp, InMemoryGateway};
    use crate::graph::HighlightTone;
    use crate::models::HighlightKind;
    use crate::selection::{ClientRect, PageFrame};

    fn session(gw: &Arc<InMemoryGateway>) -> EditorSession {
        let mut s = EditorSession::new(gw.clone(), "f1", "alice", "LLM");
        let g = s.open_document(1, CompletionStage::OptionTips);
        let surface = |_: u32| -> Option<f64> { Some(1200.0) };
        s.page_extracted(
            g,
            1,
            PageExtraction {
                width: 600.0,
                height: 800.0,
                ..Default::default()
            },
            &surface,
        );
        s
    }

    fn select(s: &mut EditorSession) -> CaptureOutcome {
        s.handle_pointer_up(&PointerUp::Selection {
            text: "quoted words".into(),
            client_rects: vec![ClientRect {
                left: 200.0,
                top: 300.0,
                width: 100.0,
                height: 20.0,
            }],
            page: Some(PageFrame {
                page_number: 1,
                left: 0.0,
                top: 0.0,
            }),
        })
    }

    #[tokio::test]
    async fn test_confirm_pending_persists_then_updates_graph() {
        let gw = Arc::new(InMemoryGateway::default());
        let mut s = session(&gw);
        assert!(matches!(select(&mut s), CaptureOutcome::Candidate(_)));

        let err = s.confirm_pending("   ").await.unwrap_err();
        assert!(matches!(err, AnnotationError::Validation(_)));
        assert_eq!(gw.call_count(GatewayOp::CreateHighlight), 0);
        assert!(s.pending().is_some());

        let (hid, cid) = s.confirm_pending("why this?").await.unwrap();
        assert!(s.pending().is_none());
        let h = s.graph().highlight(&hid).unwrap();
        assert_eq!(h.kind, HighlightKind::PdfText);
        // 1200 / 600 = scale 2
        assert_eq!(h.anchor.as_ref().unwrap().rects()[0].x1, 100.0);
        assert_eq!(s.graph().root_for(&hid).unwrap().id, cid);
    }

    #[tokio::test]
    async fn test_click_focuses_highlight() {
        let gw = Arc::new(InMemoryGateway::default());
        let mut s = session(&gw);
        select(&mut s);
        let (hid, _) = s.confirm_pending("memo").await.unwrap();

        let outcome = s.handle_pointer_up(&PointerUp::Click {
            x: 250.0,
            y: 310.0,
            page: Some(PageFrame {
                page_number: 1,
                left: 0.0,
                top: 0.0,
            }),
        });
        assert!(matches!(outcome, CaptureOutcome::HighlightClicked { .. }));
        assert_eq!(
            s.graph().selection().active_highlight_id.as_deref(),
            Some(hid.as_str())
        );
    }

    #[tokio::test]
    async fn test_failed_create_keeps_pending() {
        let gw = Arc::new(InMemoryGateway::default());
        let mut s = session(&gw);
        select(&mut s);
        gw.fail_nth(GatewayOp::CreateHighlight, 1);
        assert!(s.confirm_pending("memo").await.is_err());
        assert!(s.pending().is_some());
        assert!(s.graph().highlights().is_empty());
    }

    #[tokio::test]
    async fn test_remove_comment_by_kind() {
        let gw = Arc::new(InMemoryGateway::default());
        let mut s = session(&gw);
        let pending = s
            .propose_shape(1, &[PageRect::new(1, 10.0, 10.0, 50.0, 50.0)])
            .cloned()
            .unwrap();
        assert_eq!(pending.kind, HighlightKind::PdfShape);
        let (hid, root) = s.confirm_pending("shape memo").await.unwrap();

        let llm_reply = gw
            .create_comment(&NewComment {
                highlight_id: hid.clone(),
                parent_id: Some(root.clone()),
                author: "LLM".into(),
                text: "tip".into(),
                purpose: None,
                suggestion_reason: None,
            })
            .await
            .unwrap();
        s.graph_mut()
            .add_comment(Comment {
                id: llm_reply.id.clone(),
                highlight_id: hid.clone(),
                parent_id: Some(root.clone()),
                author: Author::llm("LLM"),
                text: "tip".into(),
                purpose: None,
                created_at: created_or_now(llm_reply.created_at.as_deref()),
                edited_at: None,
                deleted_at: None,
                deleted_reason: None,
            })
            .unwrap();
        let user_reply = s.reply(&llm_reply.id, "thanks").await.unwrap();
        assert_eq!(s.graph().highlight_tone(&hid), HighlightTone::Answered);

        // AI reply needs a reason before any network call
        let before = gw.call_count(GatewayOp::DeleteComment);
        assert!(s.remove_comment(&llm_reply.id, None).await.is_err());
        assert_eq!(gw.call_count(GatewayOp::DeleteComment), before);

        s.remove_comment(&llm_reply.id, Some("off topic")).await.unwrap();
        assert!(s.graph().comment(&llm_reply.id).unwrap().is_soft_deleted());

        let restored = s.restore_latest().await.unwrap();
        assert_eq!(restored.as_deref(), Some(llm_reply.id.as_str()));
        assert!(!s.graph().comment(&llm_reply.id).unwrap().is_soft_deleted());

        s.remove_comment(&user_reply, None).await.unwrap();
        assert!(s.graph().comment(&user_reply).is_none());

        s.remove_comment(&root, None).await.unwrap();
        assert!(s.graph().highlight(&hid).is_none());
        assert!(s.graph().comments().is_empty());
    }

    #[tokio::test]
    async fn test_edit_comment_and_memo() {
        let gw = Arc::new(InMemoryGateway::default());
        let mut s = session(&gw);
        select(&mut s);
        let (hid, root) = s.confirm_pending("first").await.unwrap();

        s.edit_memo(&hid, " second ").await.unwrap();
        assert_eq!(s.graph().highlight(&hid).unwrap().memo, "second");
        let root_comment = s.graph().comment(&root).unwrap();
        assert_eq!(root_comment.text, "second");
        assert!(root_comment.edited_at.is_some());

        assert!(s.edit_comment(&root, "").await.is_err());
        assert!(s.edit_comment("missing", "x").await.is_err());
        assert_eq!(gw.call_count(GatewayOp::UpdateComment), 1);
    }

    #[tokio::test]
    async fn test_rehydration_ignores_stale_generation() {
        let gw = Arc::new(InMemoryGateway::default());
        let mut s = session(&gw);
        select(&mut s);
        s.confirm_pending("saved").await.unwrap();

        let stale = s.render().generation();
        let records = gw.list_highlights("f1").await.unwrap();
        s.open_document(2, CompletionStage::OptionTips);
        assert!(!s.apply_rehydration(stale, records));
        assert!(s.graph().highlights().is_empty());

        assert!(s.load_annotations().await.unwrap());
        assert_eq!(s.graph().highlights().len(), 1);
        assert_eq!(s.graph().comments().len(), 1);
    }
}
