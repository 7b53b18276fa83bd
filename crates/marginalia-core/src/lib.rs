//! # Marginalia Core
//!
//! Shared, WASM-safe logic for Marginalia: the highlight/comment data model,
//! resolution-independent anchors, selection capture, page render
//! coordination, the annotation graph, and the LLM feedback orchestrator.
//!
//! This crate contains no tokio, reqwest, filesystem I/O, or other
//! native-only dependencies. Network access happens behind the
//! [`gateway::PersistenceGateway`] and [`feedback::FeedbackService`] traits,
//! which the application crate implements over HTTP.
//!
//! ## Data flow
//!
//! ```text
//! pointer-up ──▶ selection ──▶ PendingHighlight ──▶ editor ──▶ gateway
//!                    ▲                                 │
//!                    │ ScaleMap                        ▼
//!               render (pages)                       graph ◀── orchestrator
//! ```

pub mod anchor;
pub mod editor;
pub mod error;
pub mod feedback;
pub mod gateway;
pub mod graph;
pub mod models;
pub mod orchestrator;
pub mod render;
pub mod selection;
pub mod text_layout;
