//! REST implementation of [`PersistenceGateway`].
//!
//! | Operation | Request |
//! |-----------|---------|
//! | create highlight | `POST /highlights` |
//! | delete highlight | `DELETE /highlights/{id}` |
//! | create comment | `POST /comments` |
//! | update comment | `PUT /comments/{id}` |
//! | delete comment | `DELETE /comments/{id}?reason=...` |
//! | restore latest | `POST /comments/restore-latest` |
//! | list highlights | `GET /highlights/file/{fileId}` |
//! | fetch document | `GET /documents/{id}` |
//! | update stage | `PATCH /documents/{id}/update-completion-stage` |
//! | export | `GET /documents/{id}/files/{fileId}/export` |
//!
//! Every request carries `Authorization: Bearer <token>` when a token is
//! configured. Non-success responses go through
//! [`classify_failure`]; network errors become
//! [`AnnotationError::Transport`] without a status. Nothing is retried.

use anyhow::Result;
use async_trait::async_trait;
use marginalia_core::error::{classify_failure, AnnotationError};
use marginalia_core::gateway::{
    CommentRecord, CreatedComment, CreatedHighlight, DocumentRecord, HighlightWithComments,
    NewComment, NewHighlight, PersistenceGateway,
};
use marginalia_core::models::CompletionStage;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::config::Config;

pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StageAck {
    #[serde(default, alias = "completion_stage")]
    completion_stage: Option<CompletionStage>,
}

impl HttpGateway {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let token = config.token();
        if token.is_none() {
            log::warn!(
                "{} is not set; backend requests are unauthenticated",
                config.backend.token_env
            );
        }
        Self::new(
            &config.backend.base_url,
            token,
            Duration::from_secs(config.backend.timeout_secs),
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let rb = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    /// Send and turn non-success statuses into errors.
    async fn send(&self, rb: RequestBuilder, what: &str) -> Result<Response, AnnotationError> {
        let resp = rb.send().await.map_err(|e| {
            log::error!("gateway: {} failed: {}", what, e);
            AnnotationError::transport(e.status().map(|s| s.as_u16()), e.to_string())
        })?;
        let status = resp.status();
        if status.is_success() {
            log::debug!("gateway: {} -> {}", what, status);
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let err = classify_failure(status.as_u16(), &body);
        log::error!("gateway: {} -> {}: {}", what, status, err);
        Err(err)
    }

    async fn body(resp: Response) -> Result<String, AnnotationError> {
        resp.text()
            .await
            .map_err(|e| AnnotationError::transport(None, e.to_string()))
    }

    fn parse<T: DeserializeOwned>(body: &str, what: &str) -> Result<T, AnnotationError> {
        serde_json::from_str(body).map_err(|e| {
            AnnotationError::MalformedResponse(format!("{} response: {}", what, e))
        })
    }

    async fn json<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T, AnnotationError> {
        Self::parse(&Self::body(resp).await?, what)
    }
}

#[async_trait]
impl PersistenceGateway for HttpGateway {
    async fn create_highlight(
        &self,
        req: &NewHighlight,
    ) -> Result<CreatedHighlight, AnnotationError> {
        let resp = self
            .send(self.request(Method::POST, "/highlights").json(req), "create highlight")
            .await?;
        Self::json(resp, "create highlight").await
    }

    async fn delete_highlight(&self, id: &str) -> Result<(), AnnotationError> {
        self.send(
            self.request(Method::DELETE, &format!("/highlights/{}", id)),
            "delete highlight",
        )
        .await?;
        Ok(())
    }

    async fn create_comment(&self, req: &NewComment) -> Result<CreatedComment, AnnotationError> {
        let resp = self
            .send(self.request(Method::POST, "/comments").json(req), "create comment")
            .await?;
        Self::json(resp, "create comment").await
    }

    async fn update_comment(&self, id: &str, text: &str) -> Result<CommentRecord, AnnotationError> {
        let body = serde_json::json!({ "text": text });
        let resp = self
            .send(
                self.request(Method::PUT, &format!("/comments/{}", id)).json(&body),
                "update comment",
            )
            .await?;
        Self::json(resp, "update comment").await
    }

    async fn delete_comment(&self, id: &str, reason: Option<&str>) -> Result<(), AnnotationError> {
        let mut rb = self.request(Method::DELETE, &format!("/comments/{}", id));
        if let Some(reason) = reason {
            rb = rb.query(&[("reason", reason)]);
        }
        self.send(rb, "delete comment").await?;
        Ok(())
    }

    async fn restore_latest_comment(&self) -> Result<Option<CommentRecord>, AnnotationError> {
        let resp = self
            .send(
                self.request(Method::POST, "/comments/restore-latest"),
                "restore comment",
            )
            .await?;
        let body = Self::body(resp).await?;
        if body.trim().is_empty() || body.trim() == "null" {
            return Ok(None);
        }
        Self::parse(&body, "restore comment").map(Some)
    }

    async fn list_highlights(
        &self,
        file_id: &str,
    ) -> Result<Vec<HighlightWithComments>, AnnotationError> {
        let result = self
            .send(
                self.request(Method::GET, &format!("/highlights/file/{}", file_id)),
                "list highlights",
            )
            .await;
        match result {
            Ok(resp) => Self::json(resp, "list highlights").await,
            Err(AnnotationError::Transport {
                status: Some(404), ..
            }) => {
                log::info!("gateway: no highlights for file {}", file_id);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_document(&self, document_id: &str) -> Result<DocumentRecord, AnnotationError> {
        let resp = self
            .send(
                self.request(Method::GET, &format!("/documents/{}", document_id)),
                "fetch document",
            )
            .await?;
        Self::json(resp, "fetch document").await
    }

    async fn update_completion_stage(
        &self,
        document_id: &str,
        stage: CompletionStage,
    ) -> Result<CompletionStage, AnnotationError> {
        let body = serde_json::json!({ "completionStage": stage });
        let resp = self
            .send(
                self.request(
                    Method::PATCH,
                    &format!("/documents/{}/update-completion-stage", document_id),
                )
                .json(&body),
                "update stage",
            )
            .await?;
        let body = Self::body(resp).await?;
        if body.trim().is_empty() {
            return Ok(stage);
        }
        let ack: StageAck = Self::parse(&body, "update stage")?;
        Ok(ack.completion_stage.unwrap_or(stage))
    }

    async fn export_document(
        &self,
        document_id: &str,
        file_id: &str,
    ) -> Result<Vec<u8>, AnnotationError> {
        let resp = self
            .send(
                self.request(
                    Method::GET,
                    &format!("/documents/{}/files/{}/export", document_id, file_id),
                ),
                "export",
            )
            .await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| AnnotationError::transport(None, e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
