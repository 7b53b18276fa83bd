//! reqwest-backed [`FeedbackService`].
//!
//! Requests are posted to `<base>/openai/<round>` wrapped as
//! `{"userInput": {...}}`; dialogue rounds add a numeric `purpose`. The
//! service answers `{"analysis": "<model output>"}` and the raw analysis text
//! is handed back for [`marginalia_core::feedback::parse_analysis`].

use anyhow::Result;
use async_trait::async_trait;
use marginalia_core::error::{classify_failure, AnnotationError};
use marginalia_core::feedback::{FeedbackKind, FeedbackRequest, FeedbackService};
use marginalia_core::models::CommentPurpose;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;

pub struct HttpFeedbackService {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a> {
    user_input: &'a FeedbackRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<CommentPurpose>,
}

#[derive(Deserialize)]
struct AnalysisResponse {
    analysis: serde_json::Value,
}

/// Purpose tag the dialogue endpoints expect.
fn dialogue_purpose(kind: FeedbackKind) -> Option<CommentPurpose> {
    match kind {
        FeedbackKind::OptionDialogue => Some(CommentPurpose::OtherOptions),
        FeedbackKind::DeliberationDialogue => Some(CommentPurpose::Deliberation),
        FeedbackKind::OptionAnalyze | FeedbackKind::DeliberationAnalyze => None,
    }
}

impl HttpFeedbackService {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.feedback_url(),
            config.token(),
            Duration::from_secs(config.feedback.timeout_secs),
        )
    }
}

#[async_trait]
impl FeedbackService for HttpFeedbackService {
    async fn request(&self, req: &FeedbackRequest) -> Result<String, AnnotationError> {
        let url = format!("{}{}", self.base_url, req.kind.endpoint());
        let envelope = Envelope {
            user_input: req,
            purpose: dialogue_purpose(req.kind),
        };
        log::info!(
            "feedback: POST {} ({} row(s), {} thread(s))",
            req.kind.endpoint(),
            req.highlights.len(),
            req.selected_threads.len()
        );

        let mut rb = self.client.post(&url).json(&envelope);
        if let Some(token) = &self.token {
            rb = rb.bearer_auth(token);
        }
        let resp = rb.send().await.map_err(|e| {
            log::error!("feedback: request failed: {}", e);
            AnnotationError::transport(e.status().map(|s| s.as_u16()), e.to_string())
        })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| AnnotationError::transport(Some(status.as_u16()), e.to_string()))?;
        if !status.is_success() {
            log::error!("feedback: {} -> {}", req.kind.endpoint(), status);
            return Err(classify_failure(status.as_u16(), &body));
        }

        let parsed: AnalysisResponse = serde_json::from_str(&body).map_err(|e| {
            AnnotationError::MalformedResponse(format!("feedback envelope: {}", e))
        })?;
        match parsed.analysis {
            serde_json::Value::String(text) => Ok(text),
            serde_json::Value::Null => Err(AnnotationError::MalformedResponse(
                "feedback response has no analysis".to_string(),
            )),
            other => Ok(other.to_string()),
        }
    }
}
