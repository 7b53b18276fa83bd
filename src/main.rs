//! # Marginalia CLI (`mrg`)
//!
//! Headless driver for the annotation backend: list comment threads, run the
//! staged LLM feedback rounds, continue selected threads, export, and locate
//! text in a page dump.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mrg threads <file-id>` | Print a file's highlights and comment threads |
//! | `mrg feedback` | Run the action of the document's current stage |
//! | `mrg dialogue` | Ask for replies on selected threads |
//! | `mrg export` | Download the export artifact |
//! | `mrg locate --pages <dump> <text>` | Find text and print its rectangles |
//!
//! ## Examples
//!
//! ```bash
//! mrg threads 42 --config ./config/mrg.toml
//! mrg feedback --document-id 7 --file-id 42 --pages ./dump.json
//! mrg dialogue --document-id 7 --file-id 42 --pages ./dump.json --root 311 --root 315
//! mrg export --document-id 7 --file-id 42 --out review.pdf
//! mrg locate --pages ./dump.json "market share"
//! ```

use clap::{Parser, Subcommand};
use log::LevelFilter;
use marginalia::{commands, config};
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use std::path::PathBuf;

/// Marginalia CLI: PDF highlights, comment threads and staged LLM feedback.
#[derive(Parser)]
#[command(name = "mrg", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mrg.toml")]
    config: PathBuf,

    /// Log at debug level regardless of `[logging] level`.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a file's highlights and comment threads in document order.
    Threads {
        /// Document file id.
        file_id: String,

        /// Show every reply instead of collapsing long threads.
        #[arg(long)]
        all: bool,
    },

    /// Run the action of the document's current completion stage.
    ///
    /// Option and deliberation stages request LLM feedback and write the
    /// suggestions back as comments and highlights; later stages export.
    Feedback {
        #[arg(long)]
        document_id: String,
        #[arg(long)]
        file_id: String,
        /// Page dump (JSON) of the file.
        #[arg(long)]
        pages: PathBuf,
        /// Where to write the export artifact, for export stages.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Ask the LLM to continue the selected threads.
    Dialogue {
        #[arg(long)]
        document_id: String,
        #[arg(long)]
        file_id: String,
        #[arg(long)]
        pages: PathBuf,
        /// Root comment id of a thread to include (repeatable).
        #[arg(long = "root", required = true)]
        roots: Vec<String>,
    },

    /// Download the export artifact.
    Export {
        #[arg(long)]
        document_id: String,
        #[arg(long)]
        file_id: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Find text in a page dump and print its rectangles. Needs no backend.
    Locate {
        #[arg(long)]
        pages: PathBuf,
        text: String,
    },
}

fn init_logging(level: LevelFilter) {
    if let Err(e) = TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("logging disabled: {}", e);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Locate { pages, text } = &cli.command {
        init_logging(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        });
        return commands::run_locate(pages, text);
    }

    let cfg = config::load_config(&cli.config)?;
    init_logging(if cli.verbose {
        LevelFilter::Debug
    } else {
        cfg.log_level()
    });

    match cli.command {
        Commands::Threads { file_id, all } => {
            commands::run_threads(&cfg, &file_id, all).await?;
        }
        Commands::Feedback {
            document_id,
            file_id,
            pages,
            out,
        } => {
            commands::run_feedback(&cfg, &document_id, &file_id, &pages, out.as_deref()).await?;
        }
        Commands::Dialogue {
            document_id,
            file_id,
            pages,
            roots,
        } => {
            commands::run_dialogue(&cfg, &document_id, &file_id, &pages, &roots).await?;
        }
        Commands::Export {
            document_id,
            file_id,
            out,
        } => {
            commands::run_export(&cfg, &document_id, &file_id, out.as_deref()).await?;
        }
        Commands::Locate { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
