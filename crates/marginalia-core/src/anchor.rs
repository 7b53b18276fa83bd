//! Resolution-independent highlight anchors and page projection.
//!
//! Every highlight is stored as a [`GeometricAnchor`]: an ordered list of
//! [`PageRect`]s in **reference coordinates** (the page rendered at scale 1,
//! origin top-left, y growing downward). Rendering at any zoom level is a
//! pure multiplication by the page's committed scale from a [`ScaleMap`].
//!
//! ```text
//!  capture:    page = (pixel - page_origin) / scale
//!  projection: pixel = page * scale + page_origin
//! ```
//!
//! Anchors never reference renderer nodes, so they survive re-renders, zoom
//! changes, and reloads.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AnnotationError;

/// An axis-aligned rectangle on one page, in reference coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageRect {
    pub page_number: u32,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl PageRect {
    /// Build a rect, swapping corners so that `x1 <= x2` and `y1 <= y2`.
    pub fn new(page_number: u32, x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            page_number,
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Inclusive bounds test.
    pub fn contains(&self, page_number: u32, x: f64, y: f64) -> bool {
        self.page_number == page_number
            && x >= self.x1
            && x <= self.x2
            && y >= self.y1
            && y <= self.y2
    }
}

/// A rect projected to device pixels on a rendered page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub page_number: u32,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Ordered, non-empty set of page rectangles locating a highlight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometricAnchor {
    rects: Vec<PageRect>,
}

impl GeometricAnchor {
    /// Build an anchor from rects.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotationError::Validation`] when `rects` is empty or any
    /// rect has zero width or height.
    pub fn new(rects: Vec<PageRect>) -> Result<Self, AnnotationError> {
        if rects.is_empty() {
            return Err(AnnotationError::validation(
                "a highlight needs at least one rectangle",
            ));
        }
        if let Some(bad) = rects.iter().find(|r| r.is_degenerate()) {
            return Err(AnnotationError::validation(format!(
                "degenerate rectangle on page {}",
                bad.page_number
            )));
        }
        Ok(Self { rects })
    }

    /// Like [`new`](Self::new) but drops degenerate rects first; `None` when
    /// nothing usable remains.
    pub fn from_lossy(rects: Vec<PageRect>) -> Option<Self> {
        let kept: Vec<PageRect> = rects.into_iter().filter(|r| !r.is_degenerate()).collect();
        if kept.is_empty() {
            None
        } else {
            Some(Self { rects: kept })
        }
    }

    pub fn rects(&self) -> &[PageRect] {
        &self.rects
    }

    pub fn into_rects(self) -> Vec<PageRect> {
        self.rects
    }

    /// First page touched by the anchor.
    pub fn first_page(&self) -> u32 {
        self.rects.iter().map(|r| r.page_number).min().unwrap_or(0)
    }

    pub fn contains_point(&self, page_number: u32, x: f64, y: f64) -> bool {
        self.rects.iter().any(|r| r.contains(page_number, x, y))
    }

    /// Project every rect to pixels using the committed page scales.
    pub fn to_pixel_rects(&self, scales: &ScaleMap) -> Vec<PixelRect> {
        self.rects
            .iter()
            .map(|r| {
                let s = scales.scale_for(r.page_number);
                PixelRect {
                    page_number: r.page_number,
                    left: r.x1 * s,
                    top: r.y1 * s,
                    width: r.width() * s,
                    height: r.height() * s,
                }
            })
            .collect()
    }

    /// Document-order key: lowest page, then the lowest `y1` on that page.
    pub fn sort_key(&self) -> (u32, f64) {
        let page = self.first_page();
        let y = self
            .rects
            .iter()
            .filter(|r| r.page_number == page)
            .map(|r| r.y1)
            .fold(f64::INFINITY, f64::min);
        (page, y)
    }
}

/// Compare two optional anchors in document order. Anchorless items sort last
/// and keep their relative order under a stable sort.
pub fn document_order(a: Option<&GeometricAnchor>, b: Option<&GeometricAnchor>) -> Ordering {
    match (a.map(|x| x.sort_key()), b.map(|x| x.sort_key())) {
        (Some((pa, ya)), Some((pb, yb))) => pa.cmp(&pb).then(ya.total_cmp(&yb)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Immutable page → committed scale map.
///
/// Shared as `Arc<ScaleMap>`; a new map is built only when some page's scale
/// actually changes, so consumers can compare with `Arc::ptr_eq`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScaleMap {
    scales: BTreeMap<u32, f64>,
}

impl ScaleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, f64)>) -> Self {
        Self {
            scales: pairs.into_iter().collect(),
        }
    }

    /// Committed scale for `page`, or 1.0 when none has been committed.
    pub fn scale_for(&self, page: u32) -> f64 {
        self.scales.get(&page).copied().unwrap_or(1.0)
    }

    pub fn get(&self, page: u32) -> Option<f64> {
        self.scales.get(&page).copied()
    }

    pub fn len(&self) -> usize {
        self.scales.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scales.is_empty()
    }

    pub(crate) fn with(&self, page: u32, scale: f64) -> Self {
        let mut scales = self.scales.clone();
        scales.insert(page, scale);
        Self { scales }
    }
}

/// Convert a viewport pixel coordinate to reference page coordinates.
pub fn page_coordinate(pixel: f64, page_origin: f64, scale: f64) -> f64 {
    (pixel - page_origin) / scale
}

/// Inverse of [`page_coordinate`].
pub fn pixel_coordinate(page: f64, page_origin: f64, scale: f64) -> f64 {
    page * scale + page_origin
}
