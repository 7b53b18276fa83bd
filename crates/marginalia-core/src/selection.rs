//! Turning pointer events into highlight candidates or highlight clicks.
//!
//! The presentation layer reports each pointer-up as a [`PointerUp`]: either
//! a non-collapsed text selection with its client rects, or a plain click.
//! [`SelectionCapture::capture`] converts the event into reference page
//! coordinates using the committed [`ScaleMap`] and decides what happened:
//!
//! | Event | Outcome |
//! |-------|---------|
//! | selection with usable rects | [`CaptureOutcome::Candidate`] |
//! | click inside an existing highlight | [`CaptureOutcome::HighlightClicked`] |
//! | anything else | [`CaptureOutcome::Ignored`] |

use serde::Serialize;

use crate::anchor::{page_coordinate, GeometricAnchor, PageRect, ScaleMap};
use crate::error::AnnotationError;
use crate::graph::AnnotationGraph;
use crate::models::{HighlightId, HighlightKind};

/// A rectangle reported by the selection API, in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// The rendered page an event belongs to, with its viewport origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFrame {
    pub page_number: u32,
    pub left: f64,
    pub top: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointerUp {
    Selection {
        text: String,
        client_rects: Vec<ClientRect>,
        page: Option<PageFrame>,
    },
    Click {
        x: f64,
        y: f64,
        page: Option<PageFrame>,
    },
}

/// Where the viewer should scroll to reveal a highlight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrollTarget {
    pub highlight_id: HighlightId,
    pub page_number: u32,
    pub pdf_y1: f64,
    pub page_scale: f64,
    pub page_top_offset: f64,
    pub viewer_y: f64,
}

impl ScrollTarget {
    pub fn new(
        highlight_id: impl Into<HighlightId>,
        page_number: u32,
        pdf_y1: f64,
        page_scale: f64,
        page_top_offset: f64,
    ) -> Self {
        Self {
            highlight_id: highlight_id.into(),
            page_number,
            pdf_y1,
            page_scale,
            page_top_offset,
            viewer_y: page_top_offset + pdf_y1 * page_scale,
        }
    }
}

/// A highlight the user is about to create; not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingHighlight {
    /// Client-local id used until the server assigns one.
    pub placeholder_id: String,
    pub kind: HighlightKind,
    pub source_text: String,
    pub anchor: GeometricAnchor,
}

/// A pending highlight with the memo the user typed.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedHighlight {
    pub placeholder_id: String,
    pub kind: HighlightKind,
    pub source_text: String,
    pub anchor: GeometricAnchor,
    pub memo: String,
}

impl PendingHighlight {
    /// Attach the memo. An empty (after trimming) memo is rejected.
    pub fn confirm(self, memo: &str) -> Result<ConfirmedHighlight, AnnotationError> {
        let memo = memo.trim();
        if memo.is_empty() {
            return Err(AnnotationError::validation(
                "Please enter a comment before saving the highlight.",
            ));
        }
        Ok(ConfirmedHighlight {
            placeholder_id: self.placeholder_id,
            kind: self.kind,
            source_text: self.source_text,
            anchor: self.anchor,
            memo: memo.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    HighlightClicked {
        highlight_id: HighlightId,
        scroll_target: ScrollTarget,
    },
    Candidate(PendingHighlight),
    Ignored,
}

/// Per-session selection state. Owns the placeholder id counter.
#[derive(Debug, Default)]
pub struct SelectionCapture {
    next_placeholder: u64,
}

impl SelectionCapture {
    pub fn new() -> Self {
        Self::default()
    }

    fn placeholder(&mut self) -> String {
        self.next_placeholder += 1;
        format!("pending-{}", self.next_placeholder)
    }

    /// Classify a pointer-up event.
    pub fn capture(
        &mut self,
        event: &PointerUp,
        graph: &AnnotationGraph,
        scales: &ScaleMap,
    ) -> CaptureOutcome {
        match event {
            PointerUp::Selection {
                text,
                client_rects,
                page,
            } => {
                let text = text.trim();
                let Some(frame) = page else {
                    return CaptureOutcome::Ignored;
                };
                if text.is_empty() {
                    return CaptureOutcome::Ignored;
                }
                let scale = scales.scale_for(frame.page_number);
                let rects: Vec<PageRect> = client_rects
                    .iter()
                    .filter(|r| r.width > 0.0 && r.height > 0.0)
                    .map(|r| {
                        PageRect::new(
                            frame.page_number,
                            page_coordinate(r.left, frame.left, scale),
                            page_coordinate(r.top, frame.top, scale),
                            page_coordinate(r.left + r.width, frame.left, scale),
                            page_coordinate(r.top + r.height, frame.top, scale),
                        )
                    })
                    .collect();
                match GeometricAnchor::new(rects) {
                    Ok(anchor) => {
                        let placeholder_id = self.placeholder();
                        log::debug!(
                            "selection captured on page {} as {}",
                            frame.page_number,
                            placeholder_id
                        );
                        CaptureOutcome::Candidate(PendingHighlight {
                            placeholder_id,
                            kind: HighlightKind::PdfText,
                            source_text: text.to_string(),
                            anchor,
                        })
                    }
                    Err(_) => CaptureOutcome::Ignored,
                }
            }
            PointerUp::Click { x, y, page } => {
                let Some(frame) = page else {
                    return CaptureOutcome::Ignored;
                };
                let scale = scales.scale_for(frame.page_number);
                let px = page_coordinate(*x, frame.left, scale);
                let py = page_coordinate(*y, frame.top, scale);
                for h in graph.highlights() {
                    let Some(anchor) = &h.anchor else { continue };
                    if !anchor.contains_point(frame.page_number, px, py) {
                        continue;
                    }
                    let pdf_y1 = anchor
                        .rects()
                        .iter()
                        .filter(|r| r.page_number == frame.page_number)
                        .map(|r| r.y1)
                        .fold(f64::INFINITY, f64::min);
                    return CaptureOutcome::HighlightClicked {
                        highlight_id: h.id.clone(),
                        scroll_target: ScrollTarget::new(
                            h.id.clone(),
                            frame.page_number,
                            pdf_y1,
                            scale,
                            frame.top,
                        ),
                    };
                }
                CaptureOutcome::Ignored
            }
        }
    }

    /// Build a candidate from shape rectangles detected by the renderer.
    ///
    /// Rects are already in reference coordinates. Returns `None` when none
    /// of them has an area.
    pub fn capture_shape(&mut self, page_number: u32, rects: &[PageRect]) -> Option<PendingHighlight> {
        let anchor = GeometricAnchor::from_lossy(rects.to_vec())?;
        Some(PendingHighlight {
            placeholder_id: self.placeholder(),
            kind: HighlightKind::PdfShape,
            source_text: format!("Shape highlight (p. {})", page_number),
            anchor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Author, Highlight};
    use chrono::Utc;

    fn frame(page: u32) -> Option<PageFrame> {
        Some(PageFrame {
            page_number: page,
            left: 100.0,
            top: 1000.0,
        })
    }

    fn highlight(id: &str, page: u32, x1: f64, y1: f64, x2: f64, y2: f64) -> Highlight {
        Highlight {
            id: id.to_string(),
            kind: HighlightKind::PdfText,
            source_text: id.to_string(),
            anchor: Some(
                GeometricAnchor::new(vec![PageRect::new(page, x1, y1, x2, y2)]).unwrap(),
            ),
            memo: String::new(),
            created_at: Utc::now(),
            created_by: Author::user("u"),
            has_user_reply: false,
        }
    }

    #[test]
    fn test_selection_becomes_candidate_in_page_coords() {
        let mut capture = SelectionCapture::new();
        let graph = AnnotationGraph::new();
        let scales = ScaleMap::from_pairs([(3, 2.0)]);
        let event = PointerUp::Selection {
            text: "  hello  ".into(),
            client_rects: vec![
                ClientRect {
                    left: 120.0,
                    top: 1040.0,
                    width: 40.0,
                    height: 20.0,
                },
                ClientRect {
                    left: 0.0,
                    top: 0.0,
                    width: 0.0,
                    height: 10.0,
                },
            ],
            page: frame(3),
        };
        match capture.capture(&event, &graph, &scales) {
            CaptureOutcome::Candidate(p) => {
                assert_eq!(p.placeholder_id, "pending-1");
                assert_eq!(p.source_text, "hello");
                let r = p.anchor.rects()[0];
                assert_eq!(p.anchor.rects().len(), 1);
                assert_eq!((r.x1, r.y1, r.x2, r.y2), (10.0, 20.0, 30.0, 30.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_selection_without_usable_rects_ignored() {
        let mut capture = SelectionCapture::new();
        let graph = AnnotationGraph::new();
        let event = PointerUp::Selection {
            text: "x".into(),
            client_rects: vec![ClientRect {
                left: 1.0,
                top: 1.0,
                width: 5.0,
                height: 0.0,
            }],
            page: frame(1),
        };
        assert_eq!(
            capture.capture(&event, &graph, &ScaleMap::new()),
            CaptureOutcome::Ignored
        );
    }

    #[test]
    fn test_click_first_matching_highlight_wins() {
        let mut capture = SelectionCapture::new();
        let mut graph = AnnotationGraph::new();
        graph.add_highlight(highlight("h1", 1, 0.0, 0.0, 50.0, 50.0)).unwrap();
        graph.add_highlight(highlight("h2", 1, 10.0, 10.0, 60.0, 60.0)).unwrap();
        let event = PointerUp::Click {
            x: 120.0,
            y: 1020.0,
            page: frame(1),
        };
        match capture.capture(&event, &graph, &ScaleMap::new()) {
            CaptureOutcome::HighlightClicked {
                highlight_id,
                scroll_target,
            } => {
                assert_eq!(highlight_id, "h1");
                assert_eq!(scroll_target.viewer_y, 1000.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_click_hits_or_misses_highlight() {
        let mut capture = SelectionCapture::new();
        let mut graph = AnnotationGraph::new();
        graph.add_highlight(highlight("h1", 1, 10.0, 10.0, 50.0, 30.0)).unwrap();
        let scales = ScaleMap::from_pairs([(1, 1.0)]);
        let origin = Some(PageFrame {
            page_number: 1,
            left: 0.0,
            top: 0.0,
        });

        let hit = PointerUp::Click {
            x: 30.0,
            y: 20.0,
            page: origin,
        };
        assert!(matches!(
            capture.capture(&hit, &graph, &scales),
            CaptureOutcome::HighlightClicked { highlight_id, .. } if highlight_id == "h1"
        ));

        let miss = PointerUp::Click {
            x: 60.0,
            y: 20.0,
            page: origin,
        };
        assert_eq!(capture.capture(&miss, &graph, &scales), CaptureOutcome::Ignored);
    }

    #[test]
    fn test_click_outside_page_ignored() {
        let mut capture = SelectionCapture::new();
        let mut graph = AnnotationGraph::new();
        graph.add_highlight(highlight("h1", 1, 0.0, 0.0, 50.0, 50.0)).unwrap();
        let event = PointerUp::Click {
            x: 120.0,
            y: 1020.0,
            page: None,
        };
        assert_eq!(
            capture.capture(&event, &graph, &ScaleMap::new()),
            CaptureOutcome::Ignored
        );
    }

    #[test]
    fn test_shape_label_and_counter_are_per_instance() {
        let mut a = SelectionCapture::new();
        let mut b = SelectionCapture::new();
        let rects = [PageRect::new(4, 0.0, 0.0, 10.0, 10.0)];
        let first = a.capture_shape(4, &rects).unwrap();
        let second = a.capture_shape(4, &rects).unwrap();
        let other = b.capture_shape(4, &rects).unwrap();
        assert_eq!(first.source_text, "Shape highlight (p. 4)");
        assert_eq!(first.kind, HighlightKind::PdfShape);
        assert_eq!(second.placeholder_id, "pending-2");
        assert_eq!(other.placeholder_id, "pending-1");
    }

    #[test]
    fn test_confirm_requires_memo() {
        let mut capture = SelectionCapture::new();
        let pending = capture
            .capture_shape(1, &[PageRect::new(1, 0.0, 0.0, 10.0, 10.0)])
            .unwrap();
        let err = pending.clone().confirm("   ").unwrap_err();
        assert!(matches!(err, AnnotationError::Validation(_)));
        let ok = pending.confirm(" why? ").unwrap();
        assert_eq!(ok.memo, "why?");
    }
}
