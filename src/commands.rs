//! Implementations of the `mrg` subcommands.
//!
//! Each command builds an [`EditorSession`] over the HTTP gateway, drives it
//! through the core crate and prints a plain-text summary to stdout.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use marginalia_core::editor::EditorSession;
use marginalia_core::error::AnnotationError;
use marginalia_core::gateway::PersistenceGateway;
use marginalia_core::models::CompletionStage;
use marginalia_core::orchestrator::{FeedbackOrchestrator, StageReport};
use marginalia_core::text_layout::locate_text;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::feedback_client::HttpFeedbackService;
use crate::http_gateway::HttpGateway;
use crate::pages::load_pages;

fn gateway(config: &Config) -> Result<Arc<dyn PersistenceGateway>> {
    Ok(Arc::new(HttpGateway::from_config(config)?))
}

fn session(config: &Config, gateway: Arc<dyn PersistenceGateway>, file_id: &str) -> EditorSession {
    EditorSession::new(
        gateway,
        file_id,
        config.authors.user_label.clone(),
        config.authors.llm_label.clone(),
    )
    .with_collapse_policy(config.collapse_policy())
}

/// Turn a core error into an `anyhow` error carrying the user-facing text.
fn user_error(err: AnnotationError) -> anyhow::Error {
    anyhow::anyhow!("{} ({})", err.user_message(), err)
}

fn stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

/// Render every thread, roots in document order.
pub fn print_threads(session: &EditorSession, expand: bool) {
    let graph = session.graph();
    let roots = graph.roots_in_document_order();
    if roots.is_empty() {
        println!("No highlights.");
        return;
    }
    for root in roots {
        let Some(h) = graph.highlight(&root.highlight_id) else {
            continue;
        };
        let page = h.anchor.as_ref().map(|a| a.first_page()).unwrap_or(0);
        println!(
            "[{}] p.{} {:?} \"{}\"",
            h.id,
            page,
            graph.highlight_tone(&h.id),
            h.source_text
        );
        println!(
            "  {} {} ({}): {}",
            root.id,
            root.author.name,
            stamp(root.created_at),
            root.text
        );
        let (replies, hidden) = if expand {
            (graph.replies(&root.id), 0)
        } else {
            let view = session.thread_view(&root.id);
            (view.replies, view.hidden)
        };
        if hidden > 0 {
            println!("    ... {} earlier repl(ies)", hidden);
        }
        for c in replies {
            println!(
                "    {} {} ({}){}: {}",
                c.id,
                c.author.name,
                stamp(c.created_at),
                if c.edited_at.is_some() { " edited" } else { "" },
                c.text
            );
        }
    }
}

fn print_report(report: &StageReport) {
    println!("stage: {} -> {}", report.stage_before, report.stage_after);
    println!("comments created: {}", report.comments_created.len());
    println!("highlights created: {}", report.highlights_created.len());
    for w in &report.warnings {
        println!("warning: {}", w);
    }
}

/// `mrg threads <file-id>`
pub async fn run_threads(config: &Config, file_id: &str, expand: bool) -> Result<()> {
    let mut session = session(config, gateway(config)?, file_id);
    session.load_annotations().await.map_err(user_error)?;
    print_threads(&session, expand);
    Ok(())
}

/// Open `file_id` of `document_id` with the dumped pages and its saved
/// annotations.
async fn open(
    config: &Config,
    document_id: &str,
    file_id: &str,
    pages: &Path,
) -> Result<(EditorSession, FeedbackOrchestrator)> {
    let gateway = gateway(config)?;
    let document = gateway
        .fetch_document(document_id)
        .await
        .map_err(user_error)
        .with_context(|| format!("Failed to fetch document {}", document_id))?;
    let stage = document
        .completion_stage
        .unwrap_or(CompletionStage::OptionTips);
    log::info!("document '{}' at stage {}", document.document_name, stage);

    let dump = load_pages(pages)?;
    let mut session = session(config, gateway.clone(), file_id);
    let generation = session.open_document(dump.page_count(), stage);
    dump.replay(|page_number, extraction, surface| {
        session.page_extracted(generation, page_number, extraction, surface);
    });
    if session.render().document_text().is_none() {
        bail!(
            "page dump {} is missing pages; document text is incomplete",
            pages.display()
        );
    }
    session.load_annotations().await.map_err(user_error)?;

    let orchestrator = FeedbackOrchestrator::new(
        gateway,
        Arc::new(HttpFeedbackService::from_config(config)?),
        document_id,
        file_id,
        config.authors.llm_label.clone(),
    );
    Ok((session, orchestrator))
}

/// `mrg feedback`: run the action of the document's current stage.
pub async fn run_feedback(
    config: &Config,
    document_id: &str,
    file_id: &str,
    pages: &Path,
    out: Option<&Path>,
) -> Result<()> {
    let (mut session, orchestrator) = open(config, document_id, file_id, pages).await?;
    let report = session.run_feedback(&orchestrator).await.map_err(user_error)?;
    print_report(&report);
    if let Some(bytes) = &report.export {
        write_export(bytes, out)?;
    }
    Ok(())
}

/// `mrg dialogue`: continue the selected threads.
pub async fn run_dialogue(
    config: &Config,
    document_id: &str,
    file_id: &str,
    pages: &Path,
    roots: &[String],
) -> Result<()> {
    let (mut session, orchestrator) = open(config, document_id, file_id, pages).await?;
    for root in roots {
        session
            .graph_mut()
            .toggle_root_selection(root)
            .map_err(user_error)
            .with_context(|| format!("Cannot select thread {}", root))?;
    }
    let report = session.run_dialogue(&orchestrator).await.map_err(user_error)?;
    print_report(&report);
    Ok(())
}

/// `mrg export`
pub async fn run_export(
    config: &Config,
    document_id: &str,
    file_id: &str,
    out: Option<&Path>,
) -> Result<()> {
    let bytes = gateway(config)?
        .export_document(document_id, file_id)
        .await
        .map_err(user_error)?;
    write_export(&bytes, out)
}

fn write_export(bytes: &[u8], out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, bytes)
                .with_context(|| format!("Failed to write export: {}", path.display()))?;
            println!("export written: {} ({} bytes)", path.display(), bytes.len());
        }
        None => println!("export ready: {} bytes (use --out to save)", bytes.len()),
    }
    Ok(())
}

/// `mrg locate`: find text in a page dump and print its rectangles.
pub fn run_locate(pages: &Path, text: &str) -> Result<()> {
    let render = load_pages(pages)?.into_coordinator();
    let Some(doc) = render.document_text() else {
        bail!("page dump {} is missing pages", pages.display());
    };
    match locate_text(&doc, render.pages(), text) {
        Some(anchor) => {
            for r in anchor.rects() {
                println!(
                    "page {} x1={:.2} y1={:.2} x2={:.2} y2={:.2}",
                    r.page_number, r.x1, r.y1, r.x2, r.y2
                );
            }
            Ok(())
        }
        None => bail!("text not found: {:?}", text),
    }
}
