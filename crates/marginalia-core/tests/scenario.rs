//! End-to-end scenarios across render, selection, graph and the feedback
//! orchestrator, using the in-memory gateway.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use marginalia_core::anchor::PageRect;
use marginalia_core::editor::EditorSession;
use marginalia_core::error::AnnotationError;
use marginalia_core::feedback::{FeedbackRequest, FeedbackService};
use marginalia_core::gateway::memory::InMemoryGateway;
use marginalia_core::models::{CommentPurpose, CompletionStage};
use marginalia_core::orchestrator::FeedbackOrchestrator;
use marginalia_core::render::{PageExtraction, RenderEvent, RenderPhase};
use marginalia_core::selection::{CaptureOutcome, ClientRect, PageFrame, PointerUp};
use marginalia_core::text_layout::TextRun;

fn page(text: &str, y: f64) -> PageExtraction {
    PageExtraction {
        width: 500.0,
        height: 700.0,
        text_runs: vec![TextRun {
            text: text.to_string(),
            x1: 50.0,
            y1: y,
            x2: 50.0 + 10.0 * text.chars().count() as f64,
            y2: y + 12.0,
        }],
        shapes: vec![],
    }
}

struct OneShot(Mutex<Option<String>>);

#[async_trait]
impl FeedbackService for OneShot {
    async fn request(&self, _req: &FeedbackRequest) -> Result<String, AnnotationError> {
        self.0
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| AnnotationError::transport(None, "exhausted"))
    }
}

#[tokio::test]
async fn test_out_of_order_pages_then_highlight_and_feedback() {
    let gw = Arc::new(
        InMemoryGateway::default().with_document("d1", "report", CompletionStage::OptionTips),
    );
    let mut session = EditorSession::new(gw.clone(), "f1", "alice", "LLM");
    let generation = session.open_document(3, CompletionStage::OptionTips);
    let surface = |_: u32| -> Option<f64> { Some(1000.0) };

    let mut events = Vec::new();
    events.extend(session.page_extracted(generation, 2, page("Second page body.", 40.0), &surface));
    assert_eq!(session.render().phase(), RenderPhase::PartiallyRendered);
    events.extend(session.page_extracted(generation, 1, page("Opening claim here.", 20.0), &surface));
    assert!(session.render().document_text().is_none());
    let scales_before = session.render().scale_map();
    events.extend(session.page_extracted(generation, 3, page("Closing remark.", 60.0), &surface));

    assert!(matches!(events.first(), Some(RenderEvent::DocumentTextReady(_))));
    assert!(events.contains(&RenderEvent::FullyRendered));
    let doc = session.render().document_text().unwrap();
    assert_eq!(
        doc.text,
        "Opening claim here.\n\n--- Page 2 ---\n\nSecond page body.\n\n--- Page 3 ---\n\nClosing remark."
    );

    // page 3 changed the map; a same-width viewport change must not
    let scales = session.render().scale_map();
    assert!(!Arc::ptr_eq(&scales_before, &scales));
    session.viewport_changed(generation, &surface);
    assert!(Arc::ptr_eq(&scales, &session.render().scale_map()));
    assert_eq!(scales.scale_for(3), 2.0);

    // select "Second" on page 2 at scale 2, frame at y=2000
    let outcome = session.handle_pointer_up(&PointerUp::Selection {
        text: "Second".into(),
        client_rects: vec![ClientRect {
            left: 100.0,
            top: 2080.0,
            width: 120.0,
            height: 24.0,
        }],
        page: Some(PageFrame {
            page_number: 2,
            left: 0.0,
            top: 2000.0,
        }),
    });
    let CaptureOutcome::Candidate(pending) = outcome else {
        panic!("expected a candidate");
    };
    assert_eq!(pending.anchor.rects()[0], PageRect::new(2, 50.0, 40.0, 110.0, 52.0));
    let (hid, root) = session.confirm_pending("Is this the main point?").await.unwrap();

    let response = format!(
        r#"{{"highlighted":[{{"highlight_id":"{hid}","comment_id":"{root}","intervention_needed":true,"suggestion":"What else could it mean?"}}],
            "nonHighlighted":[{{"unhighlighted_text":"closing remark","suggestion":"Does this follow?"}}]}}"#
    );
    let orchestrator = FeedbackOrchestrator::new(
        gw.clone(),
        Arc::new(OneShot(Mutex::new(Some(response)))),
        "d1",
        "f1",
        "LLM",
    );
    let report = session.run_feedback(&orchestrator).await.unwrap();

    assert_eq!(session.stage(), CompletionStage::DeliberationTips);
    assert_eq!(gw.document_stage("d1"), Some(CompletionStage::DeliberationTips));
    assert_eq!(report.comments_created.len(), 1);
    assert_eq!(report.highlights_created.len(), 1);

    let roots: Vec<_> = session
        .graph()
        .roots_in_document_order()
        .iter()
        .map(|c| c.highlight_id.clone())
        .collect();
    assert_eq!(roots, vec![hid.clone(), report.highlights_created[0].clone()]);

    let llm_highlight = session.graph().highlight(&report.highlights_created[0]).unwrap();
    assert_eq!(llm_highlight.anchor.as_ref().unwrap().first_page(), 3);
    let tip = session.graph().comment(&report.comments_created[0]).unwrap();
    assert_eq!(tip.purpose, Some(CommentPurpose::OtherOptions));

    // the user answers the AI on the AI's own highlight
    let llm_root = session
        .graph()
        .root_for(&report.highlights_created[0])
        .unwrap()
        .id
        .clone();
    session.reply(&llm_root, "It follows from page 2.").await.unwrap();
    assert!(session
        .graph()
        .highlight(&report.highlights_created[0])
        .unwrap()
        .has_user_reply);

    // the backend refuses to delete an answered AI highlight
    let err = session.remove_comment(&llm_root, None).await.unwrap_err();
    assert!(matches!(err, AnnotationError::BusinessRule(_)));
    assert!(session.graph().highlight(&report.highlights_created[0]).is_some());
}

#[tokio::test]
async fn test_stale_pages_are_ignored_after_reopen() {
    let gw = Arc::new(InMemoryGateway::default());
    let mut session = EditorSession::new(gw, "f1", "alice", "LLM");
    let surface = |_: u32| -> Option<f64> { Some(500.0) };

    let old = session.open_document(1, CompletionStage::OptionTips);
    let current = session.open_document(1, CompletionStage::OptionTips);
    assert!(session
        .page_extracted(old, 1, page("stale", 10.0), &surface)
        .is_empty());
    assert!(session.render().page(1).is_none());

    let events = session.page_extracted(current, 1, page("fresh", 10.0), &surface);
    assert_eq!(events.len(), 2);
    assert_eq!(session.render().document_text().unwrap().text, "fresh");
}
