//! # Marginalia
//!
//! Command-line front end for the Marginalia annotation engine.
//!
//! The document model, anchors, comment graph and feedback workflow live in
//! [`marginalia_core`]. This crate adds what needs a native runtime: TOML
//! configuration, the reqwest-backed backend and feedback clients, loading
//! page dumps from disk, and the `mrg` binary.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ page dump  │──▶│  EditorSession   │──▶│ HttpGateway  │──▶ backend
//! │  (JSON)    │   │ (marginalia-core)│   └──────────────┘
//! └────────────┘   │                  │   ┌──────────────────────┐
//!                  │   orchestrator   │──▶│ HttpFeedbackService  │──▶ LLM
//!                  └──────────────────┘   └──────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`http_gateway`] | REST persistence gateway |
//! | [`feedback_client`] | LLM feedback service client |
//! | [`pages`] | Page dump loading |
//! | [`commands`] | `mrg` subcommands |

pub mod commands;
pub mod config;
pub mod feedback_client;
pub mod http_gateway;
pub mod pages;
