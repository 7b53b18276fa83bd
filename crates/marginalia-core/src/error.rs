//! Error taxonomy for annotation operations.
//!
//! Every failure that can reach a user-facing action is one of the
//! [`AnnotationError`] variants. Gateway implementations convert transport
//! failures at the call site with [`classify_failure`], so nothing escapes as
//! a panic into the presentation layer.
//!
//! | Variant | Category |
//! |---------|----------|
//! | [`Validation`](AnnotationError::Validation) | blocks the action locally, no network call |
//! | [`NotFound`](AnnotationError::NotFound) | validation (missing id) |
//! | [`InvalidStage`](AnnotationError::InvalidStage) | validation (workflow gate) |
//! | [`Transport`](AnnotationError::Transport) | network failure or non-2xx |
//! | [`MalformedResponse`](AnnotationError::MalformedResponse) | recoverable transport failure |
//! | [`BusinessRule`](AnnotationError::BusinessRule) | server refused the operation |
//! | [`PartialBatch`](AnnotationError::PartialBatch) | one item of a feedback loop failed |
//!
//! Consistency warnings (missing parent, text not found) are not errors; see
//! [`crate::orchestrator::FeedbackWarning`].

use thiserror::Error;

/// Substring the backend uses when a delete is forbidden by business rules.
pub const CANNOT_DELETE_MARKER: &str = "Cannot delete";

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation not available in stage {stage}: {reason}")]
    InvalidStage { stage: String, reason: String },

    #[error("transport error (status {status:?}): {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("rejected by server: {0}")]
    BusinessRule(String),

    #[error("feedback batch stopped after {completed} committed item(s): {source}")]
    PartialBatch {
        completed: usize,
        #[source]
        source: Box<AnnotationError>,
    },
}

/// Coarse grouping used for user messaging and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Transport,
    PartialBatch,
    BusinessRule,
}

impl AnnotationError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) | Self::NotFound(_) | Self::InvalidStage { .. } => {
                ErrorCategory::Validation
            }
            Self::Transport { .. } | Self::MalformedResponse(_) => ErrorCategory::Transport,
            Self::BusinessRule(_) => ErrorCategory::BusinessRule,
            Self::PartialBatch { .. } => ErrorCategory::PartialBatch,
        }
    }

    /// Message suitable for a dismissible error banner.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::NotFound(what) => format!("{} no longer exists.", what),
            Self::InvalidStage { reason, .. } => reason.clone(),
            Self::BusinessRule(_) => {
                "This item cannot be deleted because other comments depend on it.".to_string()
            }
            Self::PartialBatch { completed, .. } => format!(
                "Feedback was only partially saved ({} item(s) saved). Please try again.",
                completed
            ),
            Self::Transport { .. } | Self::MalformedResponse(_) => {
                "The request failed. Please try again.".to_string()
            }
        }
    }
}

/// Convert a failed backend response into the matching error variant.
///
/// Bodies mentioning [`CANNOT_DELETE_MARKER`] are business-rule refusals;
/// anything else is a transport failure carrying the status code.
pub fn classify_failure(status: u16, body: &str) -> AnnotationError {
    if body.contains(CANNOT_DELETE_MARKER) {
        return AnnotationError::BusinessRule(body.trim().to_string());
    }
    let message = if body.trim().is_empty() {
        format!("request failed with status {}", status)
    } else {
        body.trim().to_string()
    };
    AnnotationError::transport(Some(status), message)
}
