//! LLM feedback workflow bound to the document's [`CompletionStage`].
//!
//! Each call to [`FeedbackOrchestrator::run_stage`] performs the action of
//! the current stage and then asks the backend to advance it:
//!
//! ```text
//! OptionTips ──option round──▶ DeliberationTips ──deliberation round──▶
//! MoreDeliberationTips ──export──▶ Export ──export (stage unchanged)
//! ```
//!
//! Items inside a round are persisted one at a time, each awaited before the
//! next. A failing item stops the loop with
//! [`AnnotationError::PartialBatch`]; everything already persisted stays in
//! the backend and in the graph. Suggestions that cannot be placed (unknown
//! parent, text not found in the document) are skipped and reported as
//! [`FeedbackWarning`]s.
//!
//! The local stage is only changed after the backend confirms the new value,
//! and never moves backwards.

use std::fmt;
use std::sync::Arc;

use crate::error::AnnotationError;
use crate::feedback::{
    deliberation_rows, dialogue_threads, option_rows, parse_analysis, DeliberationFeedback,
    DialogueFeedback, FeedbackKind, FeedbackRequest, FeedbackService, OptionFeedback,
};
use crate::gateway::{
    create_highlight_with_root, created_or_now, HighlightDraft, NewComment, PersistenceGateway,
};
use crate::graph::AnnotationGraph;
use crate::models::{
    Author, Comment, CommentId, CommentPurpose, CompletionStage, HighlightId, HighlightKind,
};
use crate::render::PageRenderCoordinator;
use crate::text_layout::{document_lines, locate_text};

/// A suggestion that was skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackWarning {
    /// No comment to attach a reply to.
    MissingParent {
        highlight_id: Option<HighlightId>,
        comment_id: Option<CommentId>,
    },
    /// Suggested text does not occur in the document.
    TextNotFound { text: String },
    /// A dialogue response named a root that is not in the graph.
    MissingRoot { root_comment_id: CommentId },
}

impl fmt::Display for FeedbackWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackWarning::MissingParent {
                highlight_id,
                comment_id,
            } => write!(
                f,
                "no parent comment for highlight {:?} / comment {:?}",
                highlight_id, comment_id
            ),
            FeedbackWarning::TextNotFound { text } => {
                write!(f, "text not found in document: {:?}", text)
            }
            FeedbackWarning::MissingRoot { root_comment_id } => {
                write!(f, "root comment {} not found", root_comment_id)
            }
        }
    }
}

/// Outcome of one stage action or dialogue round.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage_before: CompletionStage,
    pub stage_after: CompletionStage,
    pub comments_created: Vec<CommentId>,
    pub highlights_created: Vec<HighlightId>,
    pub warnings: Vec<FeedbackWarning>,
    /// Export artifact, for the export actions.
    pub export: Option<Vec<u8>>,
}

impl StageReport {
    fn new(stage: CompletionStage) -> Self {
        Self {
            stage_before: stage,
            stage_after: stage,
            comments_created: Vec::new(),
            highlights_created: Vec::new(),
            warnings: Vec::new(),
            export: None,
        }
    }

    fn committed(&self) -> usize {
        self.comments_created.len() + self.highlights_created.len()
    }

    fn warn(&mut self, warning: FeedbackWarning) {
        log::warn!("feedback: {}", warning);
        self.warnings.push(warning);
    }

    fn partial(&self, source: AnnotationError) -> AnnotationError {
        log::error!(
            "feedback: batch stopped after {} item(s): {}",
            self.committed(),
            source
        );
        AnnotationError::PartialBatch {
            completed: self.committed(),
            source: Box::new(source),
        }
    }
}

pub struct FeedbackOrchestrator {
    gateway: Arc<dyn PersistenceGateway>,
    service: Arc<dyn FeedbackService>,
    document_id: String,
    file_id: String,
    llm_author: Author,
}

impl FeedbackOrchestrator {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        service: Arc<dyn FeedbackService>,
        document_id: impl Into<String>,
        file_id: impl Into<String>,
        llm_label: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            service,
            document_id: document_id.into(),
            file_id: file_id.into(),
            llm_author: Author::llm(llm_label),
        }
    }

    /// Run the action of `*stage` and advance it on success.
    ///
    /// # Errors
    ///
    /// - [`AnnotationError::InvalidStage`] when the document text needed by a
    ///   feedback round is not available yet.
    /// - Transport or malformed-response errors from the feedback call.
    /// - [`AnnotationError::PartialBatch`] when a persistence call inside a
    ///   round fails.
    pub async fn run_stage(
        &self,
        stage: &mut CompletionStage,
        graph: &mut AnnotationGraph,
        render: &PageRenderCoordinator,
    ) -> Result<StageReport, AnnotationError> {
        let mut report = StageReport::new(*stage);
        log::info!("feedback: running stage {}", stage);
        match *stage {
            CompletionStage::OptionTips => {
                self.option_round(graph, render, &mut report).await?;
                self.advance(stage, &mut report).await?;
            }
            CompletionStage::DeliberationTips => {
                self.deliberation_round(graph, render, &mut report).await?;
                self.advance(stage, &mut report).await?;
            }
            CompletionStage::MoreDeliberationTips => {
                report.export = Some(self.export().await?);
                self.advance(stage, &mut report).await?;
            }
            CompletionStage::Export => {
                report.export = Some(self.export().await?);
            }
        }
        Ok(report)
    }

    /// Send the selected threads for a dialogue round and attach the replies.
    ///
    /// Available in the two deliberation stages. Clears the root selection
    /// on success; the stage does not change.
    pub async fn run_dialogue(
        &self,
        stage: CompletionStage,
        graph: &mut AnnotationGraph,
        render: &PageRenderCoordinator,
    ) -> Result<StageReport, AnnotationError> {
        let (kind, purpose) = match stage {
            CompletionStage::DeliberationTips => {
                (FeedbackKind::OptionDialogue, CommentPurpose::OtherOptions)
            }
            CompletionStage::MoreDeliberationTips => {
                (FeedbackKind::DeliberationDialogue, CommentPurpose::Deliberation)
            }
            other => {
                return Err(AnnotationError::InvalidStage {
                    stage: other.to_string(),
                    reason: "Dialogue is available after the first feedback round.".to_string(),
                })
            }
        };
        let threads = dialogue_threads(graph);
        if threads.is_empty() {
            return Err(AnnotationError::validation(
                "Select at least one thread to continue the dialogue.",
            ));
        }
        let req = FeedbackRequest {
            kind,
            mt_text: render
                .document_text()
                .map(|d| d.text.clone())
                .unwrap_or_default(),
            highlights: Vec::new(),
            text_lines: Vec::new(),
            selected_threads: threads,
        };
        let raw = self.service.request(&req).await?;
        let parsed: DialogueFeedback = parse_analysis(&raw)?;

        let mut report = StageReport::new(stage);
        for resp in parsed.dialogue_responses {
            if resp.response_text.trim().is_empty() {
                continue;
            }
            let Some(root) = graph.comment(&resp.root_comment_id).filter(|c| c.is_root()) else {
                report.warn(FeedbackWarning::MissingRoot {
                    root_comment_id: resp.root_comment_id,
                });
                continue;
            };
            let highlight_id = root.highlight_id.clone();
            let parent_id = root.id.clone();
            match self
                .reply(graph, &highlight_id, &parent_id, &resp.response_text, None, purpose)
                .await
            {
                Ok(id) => report.comments_created.push(id),
                Err(e) => return Err(report.partial(e)),
            }
        }
        graph.clear_root_selection();
        log::info!(
            "feedback: dialogue added {} repl(ies)",
            report.comments_created.len()
        );
        Ok(report)
    }

    async fn option_round(
        &self,
        graph: &mut AnnotationGraph,
        render: &PageRenderCoordinator,
        report: &mut StageReport,
    ) -> Result<(), AnnotationError> {
        let doc = render.document_text().ok_or_else(|| AnnotationError::InvalidStage {
            stage: CompletionStage::OptionTips.to_string(),
            reason: "The document text has not been extracted yet.".to_string(),
        })?;
        let req = FeedbackRequest {
            kind: FeedbackKind::OptionAnalyze,
            mt_text: doc.text.clone(),
            highlights: option_rows(graph),
            text_lines: document_lines(render.pages()),
            selected_threads: Vec::new(),
        };
        let raw = self.service.request(&req).await?;
        let parsed: OptionFeedback = parse_analysis(&raw)?;
        log::debug!(
            "feedback: {} highlighted / {} unhighlighted suggestion(s)",
            parsed.highlighted.len(),
            parsed.non_highlighted.len()
        );

        for hf in parsed.highlighted {
            if !hf.intervention_needed || hf.suggestion.trim().is_empty() {
                continue;
            }
            let parent = hf
                .comment_id
                .as_deref()
                .and_then(|cid| graph.comment(cid))
                .filter(|c| c.highlight_id == hf.highlight_id)
                .or_else(|| graph.root_for(&hf.highlight_id))
                .map(|c| c.id.clone());
            let Some(parent_id) = parent else {
                report.warn(FeedbackWarning::MissingParent {
                    highlight_id: Some(hf.highlight_id),
                    comment_id: hf.comment_id,
                });
                continue;
            };
            match self
                .reply(
                    graph,
                    &hf.highlight_id,
                    &parent_id,
                    &hf.suggestion,
                    hf.suggestion_reason,
                    CommentPurpose::OtherOptions,
                )
                .await
            {
                Ok(id) => report.comments_created.push(id),
                Err(e) => return Err(report.partial(e)),
            }
        }

        for uf in parsed.non_highlighted {
            let text = uf.unhighlighted_text.trim();
            if text.is_empty() || uf.suggestion.trim().is_empty() {
                continue;
            }
            let Some(anchor) = locate_text(&doc, render.pages(), text) else {
                report.warn(FeedbackWarning::TextNotFound {
                    text: text.to_string(),
                });
                continue;
            };
            let draft = HighlightDraft {
                file_id: self.file_id.clone(),
                author: self.llm_author.clone(),
                kind: HighlightKind::PdfText,
                source_text: text.to_string(),
                anchor,
                memo: uf.suggestion.trim().to_string(),
                purpose: Some(CommentPurpose::OtherOptions),
                suggestion_reason: uf.suggestion_reason,
            };
            match create_highlight_with_root(self.gateway.as_ref(), graph, draft).await {
                Ok((hid, _)) => report.highlights_created.push(hid),
                Err(e) => return Err(report.partial(e)),
            }
        }
        Ok(())
    }

    async fn deliberation_round(
        &self,
        graph: &mut AnnotationGraph,
        render: &PageRenderCoordinator,
        report: &mut StageReport,
    ) -> Result<(), AnnotationError> {
        let doc = render.document_text().ok_or_else(|| AnnotationError::InvalidStage {
            stage: CompletionStage::DeliberationTips.to_string(),
            reason: "The document text has not been extracted yet.".to_string(),
        })?;
        let rows = deliberation_rows(graph);
        if rows.is_empty() {
            log::info!("feedback: no thread ends with an AI comment, skipping request");
            return Ok(());
        }
        let req = FeedbackRequest {
            kind: FeedbackKind::DeliberationAnalyze,
            mt_text: doc.text.clone(),
            highlights: rows,
            text_lines: Vec::new(),
            selected_threads: Vec::new(),
        };
        let raw = self.service.request(&req).await?;
        let parsed: DeliberationFeedback = parse_analysis(&raw)?;

        for s in parsed.suggestions {
            if s.suggestion.trim().is_empty() {
                continue;
            }
            let parent = match (&s.comment_id, &s.highlight_id) {
                (Some(cid), _) => graph.comment(cid),
                (None, Some(hid)) => graph.root_for(hid),
                (None, None) => None,
            }
            .map(|c| (c.highlight_id.clone(), c.id.clone()));
            let Some((highlight_id, parent_id)) = parent else {
                report.warn(FeedbackWarning::MissingParent {
                    highlight_id: s.highlight_id,
                    comment_id: s.comment_id,
                });
                continue;
            };
            match self
                .reply(
                    graph,
                    &highlight_id,
                    &parent_id,
                    &s.suggestion,
                    s.suggestion_reason,
                    CommentPurpose::Deliberation,
                )
                .await
            {
                Ok(id) => report.comments_created.push(id),
                Err(e) => return Err(report.partial(e)),
            }
        }
        Ok(())
    }

    /// Persist one LLM reply, then add it to the graph.
    async fn reply(
        &self,
        graph: &mut AnnotationGraph,
        highlight_id: &str,
        parent_id: &str,
        text: &str,
        suggestion_reason: Option<String>,
        purpose: CommentPurpose,
    ) -> Result<CommentId, AnnotationError> {
        let req = NewComment {
            highlight_id: highlight_id.to_string(),
            parent_id: Some(parent_id.to_string()),
            author: self.llm_author.name.clone(),
            text: text.trim().to_string(),
            purpose: Some(purpose),
            suggestion_reason,
        };
        let created = self.gateway.create_comment(&req).await?;
        graph.add_comment(Comment {
            id: created.id.clone(),
            highlight_id: req.highlight_id,
            parent_id: req.parent_id,
            author: self.llm_author.clone(),
            text: req.text,
            purpose: Some(purpose),
            created_at: created_or_now(created.created_at.as_deref()),
            edited_at: None,
            deleted_at: None,
            deleted_reason: None,
        })?;
        Ok(created.id)
    }

    async fn export(&self) -> Result<Vec<u8>, AnnotationError> {
        let bytes = self
            .gateway
            .export_document(&self.document_id, &self.file_id)
            .await?;
        log::info!("feedback: export artifact of {} byte(s)", bytes.len());
        Ok(bytes)
    }

    async fn advance(
        &self,
        stage: &mut CompletionStage,
        report: &mut StageReport,
    ) -> Result<(), AnnotationError> {
        let Some(next) = stage.next() else {
            return Ok(());
        };
        let confirmed = self
            .gateway
            .update_completion_stage(&self.document_id, next)
            .await?;
        if confirmed > *stage {
            *stage = confirmed;
        } else {
            log::warn!(
                "feedback: server confirmed stage {} which does not advance {}",
                confirmed,
                stage
            );
        }
        report.stage_after = *stage;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::{GatewayOp, InMemoryGateway};
    use crate::render::{PageExtraction, RenderSurface};
    use crate::text_layout::TextRun;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns canned responses and records requests.
    struct ScriptedService {
        responses: Mutex<Vec<String>>,
        seen: Mutex<Vec<FeedbackKind>>,
    }

    impl ScriptedService {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl FeedbackService for ScriptedService {
        async fn request(&self, req: &FeedbackRequest) -> Result<String, AnnotationError> {
            self.seen.lock().unwrap().push(req.kind);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| AnnotationError::transport(Some(503), "no scripted response"))
        }
    }

    fn rendered() -> PageRenderCoordinator {
        let mut render = PageRenderCoordinator::new();
        let g = render.load_document(1);
        let surface = |_: u32| -> Option<f64> { Some(600.0) };
        render.page_extracted(
            g,
            1,
            PageExtraction {
                width: 600.0,
                height: 800.0,
                text_runs: vec![
                    TextRun {
                        text: "The market grew fast. ".into(),
                        x1: 10.0,
                        y1: 100.0,
                        x2: 230.0,
                        y2: 110.0,
                    },
                    TextRun {
                        text: "Costs stayed flat.".into(),
                        x1: 10.0,
                        y1: 120.0,
                        x2: 190.0,
                        y2: 130.0,
                    },
                ],
                shapes: vec![],
            },
            &surface as &dyn RenderSurface,
        );
        render
    }

    async fn seeded(gw: &InMemoryGateway) -> (AnnotationGraph, String, String) {
        let mut graph = AnnotationGraph::new();
        let (hid, cid) = create_highlight_with_root(
            gw,
            &mut graph,
            HighlightDraft {
                file_id: "f1".into(),
                author: Author::user("alice"),
                kind: HighlightKind::PdfText,
                source_text: "market grew".into(),
                anchor: crate::anchor::GeometricAnchor::new(vec![crate::anchor::PageRect::new(
                    1, 50.0, 100.0, 120.0, 110.0,
                )])
                .unwrap(),
                memo: "is this the key point?".into(),
                purpose: None,
                suggestion_reason: None,
            },
        )
        .await
        .unwrap();
        (graph, hid, cid)
    }

    fn orchestrator(gw: Arc<InMemoryGateway>, svc: Arc<ScriptedService>) -> FeedbackOrchestrator {
        FeedbackOrchestrator::new(gw, svc, "d1", "f1", "LLM")
    }

    #[tokio::test]
    async fn test_option_round_adds_replies_and_highlights() {
        let gw = Arc::new(InMemoryGateway::default().with_document(
            "d1",
            "essay",
            CompletionStage::OptionTips,
        ));
        let (mut graph, hid, cid) = seeded(&gw).await;
        let response = format!(
            r#"{{"highlight_feedback": [
                {{"highlight_id": "{hid}", "intervention_needed": true, "suggestion": "Consider the cost side."}},
                {{"highlight_id": "{hid}", "intervention_needed": false, "suggestion": "skip me"}},
                {{"highlight_id": "404", "intervention_needed": true, "suggestion": "nowhere"}}
              ],
              "unhighlighted_feedback": [
                {{"unhighlighted_text": "costs stayed flat", "suggestion": "Why flat?"}},
                {{"unhighlighted_text": "not in the text", "suggestion": "lost"}}
              ]}}"#
        );
        let svc = Arc::new(ScriptedService::new(&[&response]));
        let orch = orchestrator(gw.clone(), svc);
        let render = rendered();
        let mut stage = CompletionStage::OptionTips;

        let report = orch.run_stage(&mut stage, &mut graph, &render).await.unwrap();

        assert_eq!(stage, CompletionStage::DeliberationTips);
        assert_eq!(report.stage_after, CompletionStage::DeliberationTips);
        assert_eq!(report.comments_created.len(), 1);
        assert_eq!(report.highlights_created.len(), 1);
        assert_eq!(report.warnings.len(), 2);
        let reply = graph.comment(&report.comments_created[0]).unwrap();
        assert_eq!(reply.parent_id.as_deref(), Some(cid.as_str()));
        assert_eq!(reply.purpose, Some(CommentPurpose::OtherOptions));
        let llm_h = graph.highlight(&report.highlights_created[0]).unwrap();
        assert!(llm_h.created_by.is_llm());
        assert_eq!(llm_h.anchor.as_ref().unwrap().rects()[0].y1, 120.0);
        assert_eq!(gw.document_stage("d1"), Some(CompletionStage::DeliberationTips));
    }

    #[tokio::test]
    async fn test_partial_batch_keeps_committed_items() {
        let gw = Arc::new(InMemoryGateway::default());
        let (mut graph, hid, _) = seeded(&gw).await;
        gw.fail_nth(GatewayOp::CreateComment, 2);
        let response = format!(
            r#"{{"highlighted": [
                {{"highlight_id": "{hid}", "intervention_needed": true, "suggestion": "one"}},
                {{"highlight_id": "{hid}", "intervention_needed": true, "suggestion": "two"}},
                {{"highlight_id": "{hid}", "intervention_needed": true, "suggestion": "three"}}
              ]}}"#
        );
        let svc = Arc::new(ScriptedService::new(&[&response]));
        let orch = orchestrator(gw.clone(), svc);
        let mut stage = CompletionStage::OptionTips;

        let err = orch
            .run_stage(&mut stage, &mut graph, &rendered())
            .await
            .unwrap_err();

        match err {
            AnnotationError::PartialBatch { completed, .. } => assert_eq!(completed, 1),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(stage, CompletionStage::OptionTips);
        assert_eq!(graph.replies(&graph.root_for(&hid).unwrap().id.clone()).len(), 1);
        assert_eq!(gw.call_count(GatewayOp::UpdateStage), 0);
    }

    #[tokio::test]
    async fn test_option_round_needs_document_text() {
        let gw = Arc::new(InMemoryGateway::default());
        let svc = Arc::new(ScriptedService::new(&[]));
        let orch = orchestrator(gw, svc.clone());
        let mut stage = CompletionStage::OptionTips;
        let err = orch
            .run_stage(&mut stage, &mut AnnotationGraph::new(), &PageRenderCoordinator::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AnnotationError::InvalidStage { .. }));
        assert!(svc.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deliberation_round_attaches_to_existing_comment() {
        let gw = Arc::new(InMemoryGateway::default());
        let (mut graph, hid, cid) = seeded(&gw).await;
        let orch_setup = orchestrator(gw.clone(), Arc::new(ScriptedService::new(&[])));
        let llm_reply = orch_setup
            .reply(&mut graph, &hid, &cid, "first tip", None, CommentPurpose::OtherOptions)
            .await
            .unwrap();
        let response = format!(
            r#"```json
            {{"suggestions": [
                {{"comment_id": "{llm_reply}", "suggestion": "Weigh both options."}},
                {{"comment_id": "999", "suggestion": "orphan"}}
            ]}}
            ```"#
        );
        let svc = Arc::new(ScriptedService::new(&[&response]));
        let orch = orchestrator(gw.clone(), svc.clone());
        let mut stage = CompletionStage::DeliberationTips;

        let report = orch.run_stage(&mut stage, &mut graph, &rendered()).await.unwrap();

        assert_eq!(stage, CompletionStage::MoreDeliberationTips);
        assert_eq!(report.comments_created.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        let c = graph.comment(&report.comments_created[0]).unwrap();
        assert_eq!(c.parent_id.as_deref(), Some(llm_reply.as_str()));
        assert_eq!(c.purpose, Some(CommentPurpose::Deliberation));
        assert_eq!(
            svc.seen.lock().unwrap().as_slice(),
            &[FeedbackKind::DeliberationAnalyze]
        );
    }

    #[tokio::test]
    async fn test_export_stages() {
        let gw = Arc::new(InMemoryGateway::default());
        let svc = Arc::new(ScriptedService::new(&[]));
        let orch = orchestrator(gw.clone(), svc);
        let mut graph = AnnotationGraph::new();
        let render = PageRenderCoordinator::new();

        let mut stage = CompletionStage::MoreDeliberationTips;
        let report = orch.run_stage(&mut stage, &mut graph, &render).await.unwrap();
        assert_eq!(stage, CompletionStage::Export);
        assert!(report.export.is_some());

        let report = orch.run_stage(&mut stage, &mut graph, &render).await.unwrap();
        assert_eq!(stage, CompletionStage::Export);
        assert_eq!(report.stage_before, report.stage_after);
        assert_eq!(gw.call_count(GatewayOp::Export), 2);
        assert_eq!(gw.call_count(GatewayOp::UpdateStage), 1);
    }

    #[tokio::test]
    async fn test_dialogue_round() {
        let gw = Arc::new(InMemoryGateway::default());
        let (mut graph, _, cid) = seeded(&gw).await;
        let response = format!(
            r#"{{"dialogue_responses": [
                {{"root_comment_id": "{cid}", "response_text": "Good question."}},
                {{"root_comment_id": "nope", "response_text": "lost"}}
            ]}}"#
        );
        let svc = Arc::new(ScriptedService::new(&[&response]));
        let orch = orchestrator(gw, svc.clone());
        let render = rendered();

        let err = orch
            .run_dialogue(CompletionStage::OptionTips, &mut graph, &render)
            .await
            .unwrap_err();
        assert!(matches!(err, AnnotationError::InvalidStage { .. }));
        let err = orch
            .run_dialogue(CompletionStage::DeliberationTips, &mut graph, &render)
            .await
            .unwrap_err();
        assert!(matches!(err, AnnotationError::Validation(_)));

        graph.toggle_root_selection(&cid).unwrap();
        let report = orch
            .run_dialogue(CompletionStage::DeliberationTips, &mut graph, &render)
            .await
            .unwrap();
        assert_eq!(report.comments_created.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(graph.selection().selected_root_ids.is_empty());
        assert_eq!(
            svc.seen.lock().unwrap().as_slice(),
            &[FeedbackKind::OptionDialogue]
        );
    }
}
