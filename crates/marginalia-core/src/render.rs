//! Page render coordination.
//!
//! Pages of a document are rendered and text-extracted independently and
//! may complete in any order. [`PageRenderCoordinator`] merges those
//! completions by page number, keeps the committed page scales in an
//! immutable [`ScaleMap`], and emits two one-shot events per load:
//!
//! | Event | Fires when |
//! |-------|-----------|
//! | [`RenderEvent::DocumentTextReady`] | every page has extracted text |
//! | [`RenderEvent::FullyRendered`] | every page has dimensions and a committed scale |
//!
//! # Generations
//!
//! Each [`load_document`](PageRenderCoordinator::load_document) returns a
//! new [`Generation`]. Completions and viewport changes tagged with an
//! older generation belong to a previous document and are dropped.
//!
//! # Scale commits
//!
//! A page's scale is `rendered_width / reference_width`. It is committed
//! only when it differs from the previously committed value (0 when none)
//! by more than [`SCALE_EPSILON`]. When no page changes, the shared
//! `Arc<ScaleMap>` is left untouched so consumers can skip re-projection.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::anchor::{PageRect, ScaleMap};
use crate::text_layout::TextRun;

pub const SCALE_EPSILON: f64 = 0.001;

/// Identifies one document load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Unloaded,
    Loading { page_count: u32 },
    PartiallyRendered,
    FullyRendered,
}

/// What the renderer reports for one page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageExtraction {
    pub width: f64,
    pub height: f64,
    pub text_runs: Vec<TextRun>,
    /// Shape regions in reference coordinates.
    pub shapes: Vec<PageRect>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageRenderState {
    pub width: f64,
    pub height: f64,
    pub text_runs: Vec<TextRun>,
    pub shapes: Vec<PageRect>,
    /// Concatenation of the runs' text.
    pub extracted_text: String,
}

impl PageRenderState {
    pub fn from_extraction(extraction: PageExtraction) -> Self {
        let extracted_text = extraction
            .text_runs
            .iter()
            .map(|r| r.text.as_str())
            .collect::<String>();
        Self {
            width: extraction.width,
            height: extraction.height,
            text_runs: extraction.text_runs,
            shapes: extraction.shapes,
            extracted_text,
        }
    }
}

/// Rendered pixel width of a page, when the page is on screen.
pub trait RenderSurface {
    fn rendered_width(&self, page_number: u32) -> Option<f64>;
}

impl<F> RenderSurface for F
where
    F: Fn(u32) -> Option<f64>,
{
    fn rendered_width(&self, page_number: u32) -> Option<f64> {
        self(page_number)
    }
}

/// Char range of one page inside [`DocumentText::text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSegment {
    pub page_number: u32,
    pub start: usize,
    pub len: usize,
}

/// Whole-document text with page markers and per-page offsets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentText {
    pub text: String,
    pub segments: Vec<PageSegment>,
}

impl DocumentText {
    /// Join page texts in the given order.
    ///
    /// Every page after the first is preceded by `"\n\n--- Page N ---\n\n"`.
    pub fn assemble<'a>(pages: impl IntoIterator<Item = (u32, &'a str)>) -> Self {
        let mut text = String::new();
        let mut segments = Vec::new();
        let mut offset = 0usize;
        for (i, (page_number, page_text)) in pages.into_iter().enumerate() {
            if i > 0 {
                let marker = format!("\n\n--- Page {} ---\n\n", page_number);
                offset += marker.chars().count();
                text.push_str(&marker);
            }
            let len = page_text.chars().count();
            segments.push(PageSegment {
                page_number,
                start: offset,
                len,
            });
            text.push_str(page_text);
            offset += len;
        }
        Self { text, segments }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    DocumentTextReady(Arc<DocumentText>),
    FullyRendered,
}

pub struct PageRenderCoordinator {
    generation: Generation,
    phase: RenderPhase,
    page_count: u32,
    pages: BTreeMap<u32, PageRenderState>,
    scales: Arc<ScaleMap>,
    document_text: Option<Arc<DocumentText>>,
    fully_rendered_sent: bool,
}

impl Default for PageRenderCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl PageRenderCoordinator {
    pub fn new() -> Self {
        Self {
            generation: Generation::default(),
            phase: RenderPhase::Unloaded,
            page_count: 0,
            pages: BTreeMap::new(),
            scales: Arc::new(ScaleMap::new()),
            document_text: None,
            fully_rendered_sent: false,
        }
    }

    /// Reset for a new document and return its generation.
    pub fn load_document(&mut self, page_count: u32) -> Generation {
        self.generation = Generation(self.generation.0 + 1);
        self.phase = RenderPhase::Loading { page_count };
        self.page_count = page_count;
        self.pages.clear();
        self.scales = Arc::new(ScaleMap::new());
        self.document_text = None;
        self.fully_rendered_sent = false;
        log::debug!(
            "render: loading {} page(s), generation {}",
            page_count,
            self.generation.0
        );
        self.generation
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn pages(&self) -> &BTreeMap<u32, PageRenderState> {
        &self.pages
    }

    pub fn page(&self, page_number: u32) -> Option<&PageRenderState> {
        self.pages.get(&page_number)
    }

    /// The committed scales. Same `Arc` until some scale changes.
    pub fn scale_map(&self) -> Arc<ScaleMap> {
        Arc::clone(&self.scales)
    }

    pub fn document_text(&self) -> Option<Arc<DocumentText>> {
        self.document_text.clone()
    }

    /// Record one page's extraction result.
    pub fn page_extracted(
        &mut self,
        generation: Generation,
        page_number: u32,
        extraction: PageExtraction,
        surface: &dyn RenderSurface,
    ) -> Vec<RenderEvent> {
        if generation != self.generation {
            log::debug!(
                "render: dropping page {} from stale generation {}",
                page_number,
                generation.0
            );
            return Vec::new();
        }
        if page_number == 0 || page_number > self.page_count {
            log::warn!(
                "render: page {} outside 1..={}, ignored",
                page_number,
                self.page_count
            );
            return Vec::new();
        }
        self.pages
            .insert(page_number, PageRenderState::from_extraction(extraction));
        if self.phase != RenderPhase::FullyRendered {
            self.phase = RenderPhase::PartiallyRendered;
        }

        self.recompute_scales(surface);
        let mut events = Vec::new();
        if let Some(ev) = self.refresh_document_text() {
            events.push(ev);
        }
        if let Some(ev) = self.check_fully_rendered() {
            events.push(ev);
        }
        events
    }

    /// Zoom or resize: recompute scales against the current surface.
    pub fn viewport_changed(
        &mut self,
        generation: Generation,
        surface: &dyn RenderSurface,
    ) -> Vec<RenderEvent> {
        if generation != self.generation {
            return Vec::new();
        }
        self.recompute_scales(surface);
        self.check_fully_rendered().into_iter().collect()
    }

    fn recompute_scales(&mut self, surface: &dyn RenderSurface) {
        let mut next: Option<ScaleMap> = None;
        for (&page_number, state) in &self.pages {
            if state.width <= 0.0 {
                continue;
            }
            let Some(rendered) = surface.rendered_width(page_number) else {
                continue;
            };
            let scale = rendered / state.width;
            let current = next.as_ref().unwrap_or(self.scales.as_ref());
            let previous = current.get(page_number).unwrap_or(0.0);
            if (scale - previous).abs() > SCALE_EPSILON {
                next = Some(current.with(page_number, scale));
            }
        }
        if let Some(map) = next {
            log::debug!("render: committed scales for {} page(s)", map.len());
            self.scales = Arc::new(map);
        }
    }

    fn refresh_document_text(&mut self) -> Option<RenderEvent> {
        if (self.pages.len() as u32) < self.page_count {
            return None;
        }
        let text = DocumentText::assemble(
            self.pages
                .iter()
                .map(|(n, p)| (*n, p.extracted_text.as_str())),
        );
        if self.document_text.as_deref() == Some(&text) {
            return None;
        }
        let text = Arc::new(text);
        self.document_text = Some(Arc::clone(&text));
        log::info!(
            "render: document text ready ({} chars)",
            text.text.chars().count()
        );
        Some(RenderEvent::DocumentTextReady(text))
    }

    fn check_fully_rendered(&mut self) -> Option<RenderEvent> {
        if self.fully_rendered_sent || self.page_count == 0 {
            return None;
        }
        let complete = (1..=self.page_count).all(|n| {
            self.pages.get(&n).is_some_and(|p| p.width > 0.0 && p.height > 0.0)
                && self.scales.get(n).is_some()
        });
        if !complete {
            return None;
        }
        self.fully_rendered_sent = true;
        self.phase = RenderPhase::FullyRendered;
        Some(RenderEvent::FullyRendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extraction(text: &str) -> PageExtraction {
        PageExtraction {
            width: 600.0,
            height: 800.0,
            text_runs: vec![TextRun {
                text: text.to_string(),
                x1: 10.0,
                y1: 10.0,
                x2: 100.0,
                y2: 20.0,
            }],
            shapes: vec![],
        }
    }

    fn surface(width: f64) -> impl Fn(u32) -> Option<f64> {
        move |_| Some(width)
    }

    #[test]
    fn test_assemble_inserts_page_markers() {
        let doc = DocumentText::assemble([(1, "ab"), (2, "cd")]);
        assert_eq!(doc.text, "ab\n\n--- Page 2 ---\n\ncd");
        assert_eq!(doc.segments[1].start, doc.text.chars().count() - 2);
        assert_eq!(doc.segments[1].len, 2);
    }

    #[test]
    fn test_out_of_order_pages_merge() {
        let mut c = PageRenderCoordinator::new();
        let g = c.load_document(2);
        let s = surface(900.0);
        assert!(c.page_extracted(g, 2, extraction("two"), &s).is_empty());
        assert_eq!(c.phase(), RenderPhase::PartiallyRendered);
        let events = c.page_extracted(g, 1, extraction("one"), &s);
        assert_eq!(events.len(), 2);
        match &events[0] {
            RenderEvent::DocumentTextReady(doc) => {
                assert_eq!(doc.text, "one\n\n--- Page 2 ---\n\ntwo")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(events[1], RenderEvent::FullyRendered);
        assert_eq!(c.phase(), RenderPhase::FullyRendered);
        assert_eq!(c.scale_map().scale_for(1), 1.5);
    }

    #[test]
    fn test_identical_text_not_reemitted() {
        let mut c = PageRenderCoordinator::new();
        let g = c.load_document(1);
        let s = surface(600.0);
        assert_eq!(c.page_extracted(g, 1, extraction("same"), &s).len(), 2);
        assert!(c.page_extracted(g, 1, extraction("same"), &s).is_empty());
        let events = c.page_extracted(g, 1, extraction("changed"), &s);
        assert!(matches!(events[0], RenderEvent::DocumentTextReady(_)));
    }

    #[test]
    fn test_small_scale_change_keeps_arc() {
        let mut c = PageRenderCoordinator::new();
        let g = c.load_document(1);
        c.page_extracted(g, 1, extraction("x"), &surface(600.0));
        let before = c.scale_map();
        c.viewport_changed(g, &surface(600.3));
        assert!(Arc::ptr_eq(&before, &c.scale_map()));
        c.viewport_changed(g, &surface(1200.0));
        assert!(!Arc::ptr_eq(&before, &c.scale_map()));
        assert_eq!(c.scale_map().scale_for(1), 2.0);
    }

    #[test]
    fn test_stale_generation_ignored() {
        let mut c = PageRenderCoordinator::new();
        let old = c.load_document(1);
        let new = c.load_document(1);
        assert!(c
            .page_extracted(old, 1, extraction("x"), &surface(600.0))
            .is_empty());
        assert!(c.pages().is_empty());
        assert_eq!(c.page_extracted(new, 1, extraction("x"), &surface(600.0)).len(), 2);
    }

    #[test]
    fn test_fully_rendered_waits_for_scale() {
        let mut c = PageRenderCoordinator::new();
        let g = c.load_document(1);
        let hidden = |_: u32| -> Option<f64> { None };
        let events = c.page_extracted(g, 1, extraction("x"), &hidden);
        assert_eq!(events.len(), 1);
        assert_eq!(c.viewport_changed(g, &surface(600.0)), vec![RenderEvent::FullyRendered]);
        assert!(c.viewport_changed(g, &surface(900.0)).is_empty());
    }
}
