//! Text runs, line grouping, and locating text on rendered pages.
//!
//! The renderer reports each page's text as a list of [`TextRun`]s with
//! glyph boxes. Page text is the concatenation of the runs' strings, so a
//! char offset into a page maps back onto exactly one run. [`locate_text`]
//! uses that to turn a string from an LLM response into a
//! [`GeometricAnchor`]:
//!
//! ```text
//! "needle" ─▶ first match in DocumentText ─▶ page segments ─▶ runs
//!          ─▶ per-char glyph boxes ─▶ one rect per visual line
//! ```
//!
//! Only the first case-insensitive occurrence is anchored. Repeated phrases
//! land on the earliest copy.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::anchor::{GeometricAnchor, PageRect};
use crate::render::{DocumentText, PageRenderState};

/// Max vertical distance for two boxes to count as the same line.
pub const LINE_THRESHOLD: f64 = 3.0;

/// One text item on a page, in reference coordinates (y down).
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct TextRun {
    pub text: String,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl TextRun {
    /// Build a run from a PDF text transform (origin bottom-left).
    ///
    /// `tx`/`ty` are the translation components of the item's transform.
    pub fn from_pdf_transform(
        text: impl Into<String>,
        tx: f64,
        ty: f64,
        width: f64,
        height: f64,
        page_height: f64,
    ) -> Self {
        let bottom = page_height - ty;
        Self {
            text: text.into(),
            x1: tx,
            y1: bottom - height,
            x2: tx + width,
            y2: bottom,
        }
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    fn y_center(&self) -> f64 {
        (self.y1 + self.y2) / 2.0
    }
}

/// A visual line assembled from runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextLine {
    pub page_number: u32,
    pub text: String,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// Group one page's runs into lines, top to bottom.
///
/// Runs whose vertical centers are within `threshold` join the same line.
/// Inside a line runs are ordered by x, and a space is inserted where the
/// horizontal gap is wider than `max(2, 10% of the previous run's width)`.
pub fn group_text_lines(page_number: u32, runs: &[TextRun], threshold: f64) -> Vec<TextLine> {
    let mut sorted: Vec<&TextRun> = runs.iter().collect();
    sorted.sort_by(|a, b| {
        a.y_center()
            .total_cmp(&b.y_center())
            .then(a.x1.total_cmp(&b.x1))
    });

    struct Acc<'a> {
        items: Vec<&'a TextRun>,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
    }

    let mut lines: Vec<Acc> = Vec::new();
    for run in sorted {
        let center = run.y_center();
        match lines
            .iter_mut()
            .find(|l| ((l.y1 + l.y2) / 2.0 - center).abs() <= threshold)
        {
            Some(line) => {
                line.items.push(run);
                line.x1 = line.x1.min(run.x1);
                line.x2 = line.x2.max(run.x2);
                line.y1 = line.y1.min(run.y1);
                line.y2 = line.y2.max(run.y2);
            }
            None => lines.push(Acc {
                items: vec![run],
                x1: run.x1,
                y1: run.y1,
                x2: run.x2,
                y2: run.y2,
            }),
        }
    }

    lines
        .into_iter()
        .map(|mut acc| {
            acc.items.sort_by(|a, b| a.x1.total_cmp(&b.x1));
            let mut text = String::new();
            for (i, cur) in acc.items.iter().enumerate() {
                if i > 0 {
                    let prev = acc.items[i - 1];
                    let gap = cur.x1 - prev.x2;
                    if gap > f64::max(2.0, (prev.x2 - prev.x1) * 0.1) {
                        text.push(' ');
                    }
                }
                text.push_str(&cur.text);
            }
            TextLine {
                page_number,
                text: text.trim_end().to_string(),
                x1: acc.x1,
                y1: acc.y1,
                x2: acc.x2,
                y2: acc.y2,
            }
        })
        .collect()
}

/// Lines for every page, in page order.
pub fn document_lines(pages: &BTreeMap<u32, PageRenderState>) -> Vec<TextLine> {
    pages
        .iter()
        .flat_map(|(n, p)| group_text_lines(*n, &p.text_runs, LINE_THRESHOLD))
        .collect()
}

fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Char offset of the first case-insensitive occurrence of `needle`.
fn find_folded(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&i| {
        haystack[i..i + needle.len()]
            .iter()
            .zip(needle)
            .all(|(a, b)| a == b)
    })
}

/// Anchor the first occurrence of `needle` in the document text.
///
/// Returns `None` when the text is absent or no glyph box could be derived
/// for it.
pub fn locate_text(
    doc: &DocumentText,
    pages: &BTreeMap<u32, PageRenderState>,
    needle: &str,
) -> Option<GeometricAnchor> {
    let needle: Vec<char> = needle.trim().chars().map(fold_char).collect();
    let haystack: Vec<char> = doc.text.chars().map(fold_char).collect();
    let start = find_folded(&haystack, &needle)?;
    let end = start + needle.len();

    let mut rects = Vec::new();
    for seg in &doc.segments {
        let seg_end = seg.start + seg.len;
        if seg_end <= start || seg.start >= end {
            continue;
        }
        let Some(page) = pages.get(&seg.page_number) else {
            continue;
        };
        let rel_start = start.saturating_sub(seg.start);
        let rel_end = (end - seg.start).min(seg.len);
        let boxes = glyph_boxes(&page.text_runs, rel_start, rel_end);
        rects.extend(merge_lines(seg.page_number, &boxes, LINE_THRESHOLD));
    }
    GeometricAnchor::from_lossy(rects)
}

/// Boxes covering chars `[from, to)` of the page text.
fn glyph_boxes(runs: &[TextRun], from: usize, to: usize) -> Vec<PageRect> {
    let mut out = Vec::new();
    let mut offset = 0;
    for run in runs {
        let len = run.char_len();
        let run_end = offset + len;
        if run_end > from && offset < to && len > 0 {
            let first = from.saturating_sub(offset);
            let last = (to - offset).min(len);
            let per_char = (run.x2 - run.x1) / len as f64;
            out.push(PageRect::new(
                0,
                run.x1 + first as f64 * per_char,
                run.y1,
                run.x1 + last as f64 * per_char,
                run.y2,
            ));
        }
        offset = run_end;
    }
    out
}

/// Merge boxes whose bottoms are within `threshold` into one rect per line.
fn merge_lines(page_number: u32, boxes: &[PageRect], threshold: f64) -> Vec<PageRect> {
    let mut lines: Vec<(f64, PageRect)> = Vec::new();
    for b in boxes {
        match lines
            .iter_mut()
            .find(|(baseline, _)| (baseline - b.y2).abs() <= threshold)
        {
            Some((_, r)) => {
                *r = PageRect::new(
                    page_number,
                    r.x1.min(b.x1),
                    r.y1.min(b.y1),
                    r.x2.max(b.x2),
                    r.y2.max(b.y2),
                );
            }
            None => lines.push((
                b.y2,
                PageRect::new(page_number, b.x1, b.y1, b.x2, b.y2),
            )),
        }
    }
    lines.into_iter().map(|(_, r)| r).collect()
}
