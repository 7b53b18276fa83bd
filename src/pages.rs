//! Loading page dumps produced by a PDF text extractor.
//!
//! The CLI has no renderer of its own. Instead it reads a JSON dump with one
//! entry per page, in whatever order the extractor finished them:
//!
//! ```json
//! {
//!   "pages": [
//!     { "page_number": 2, "width": 612, "height": 792,
//!       "text_runs": [ { "text": "Hello", "x1": 72, "y1": 90, "x2": 110, "y2": 102 } ] },
//!     { "page_number": 1, "width": 612, "height": 792, "rendered_width": 918,
//!       "text_runs": [ { "str": "Title", "transform": [12, 0, 0, 12, 72, 700],
//!                        "width": 40, "height": 12 } ],
//!       "shapes": [ { "page_number": 1, "x1": 100, "y1": 200, "x2": 300, "y2": 260 } ] }
//!   ]
//! }
//! ```
//!
//! Runs may be given as boxes in reference coordinates or in pdf.js
//! `getTextContent()` form (transform origin at the bottom left).

use anyhow::{bail, Context, Result};
use marginalia_core::anchor::PageRect;
use marginalia_core::render::{PageExtraction, PageRenderCoordinator, RenderSurface};
use marginalia_core::text_layout::TextRun;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct PageDump {
    pub pages: Vec<DumpedPage>,
}

#[derive(Debug, Deserialize)]
pub struct DumpedPage {
    pub page_number: u32,
    pub width: f64,
    pub height: f64,
    /// Width the page was drawn at; defaults to `width` (scale 1).
    #[serde(default)]
    pub rendered_width: Option<f64>,
    #[serde(default)]
    pub text_runs: Vec<DumpedRun>,
    #[serde(default)]
    pub shapes: Vec<PageRect>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DumpedRun {
    Box(TextRun),
    PdfJs {
        str: String,
        transform: [f64; 6],
        width: f64,
        height: f64,
    },
}

impl DumpedRun {
    fn into_run(self, page_height: f64) -> TextRun {
        match self {
            DumpedRun::Box(run) => run,
            DumpedRun::PdfJs {
                str,
                transform,
                width,
                height,
            } => TextRun::from_pdf_transform(str, transform[4], transform[5], width, height, page_height),
        }
    }
}

pub fn load_pages(path: &Path) -> Result<PageDump> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read page dump: {}", path.display()))?;
    let dump: PageDump = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse page dump: {}", path.display()))?;
    if dump.pages.is_empty() {
        bail!("page dump {} contains no pages", path.display());
    }
    Ok(dump)
}

impl PageDump {
    /// Highest page number in the dump.
    pub fn page_count(&self) -> u32 {
        self.pages.iter().map(|p| p.page_number).max().unwrap_or(0)
    }

    /// Hand every page to `sink` in dump order, together with a surface
    /// reporting the dumped rendered widths.
    pub fn replay(self, mut sink: impl FnMut(u32, PageExtraction, &dyn RenderSurface)) {
        let widths: Vec<(u32, f64)> = self
            .pages
            .iter()
            .map(|p| (p.page_number, p.rendered_width.unwrap_or(p.width)))
            .collect();
        let surface = move |page: u32| -> Option<f64> {
            widths
                .iter()
                .find(|(n, _)| *n == page)
                .map(|(_, w)| *w)
        };
        for page in self.pages {
            let height = page.height;
            let extraction = PageExtraction {
                width: page.width,
                height,
                text_runs: page
                    .text_runs
                    .into_iter()
                    .map(|r| r.into_run(height))
                    .collect(),
                shapes: page.shapes,
            };
            sink(page.page_number, extraction, &surface);
        }
    }

    /// Feed every page into `render` under a fresh generation.
    pub fn feed(self, render: &mut PageRenderCoordinator) {
        let generation = render.load_document(self.page_count());
        self.replay(|page_number, extraction, surface| {
            render.page_extracted(generation, page_number, extraction, surface);
        });
    }

    pub fn into_coordinator(self) -> PageRenderCoordinator {
        let mut render = PageRenderCoordinator::new();
        self.feed(&mut render);
        render
    }
}
