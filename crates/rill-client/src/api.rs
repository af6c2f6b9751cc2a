//! HTTP client for the chat backend

use async_trait::async_trait;
use rill_wire::{StreamEventStream, decode_stream};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::types::{PreviewRequest, PreviewResponse, Session, StagedItem, TokenEstimate};

/// Client for the backend's HTTP API.
///
/// Every method is fatal to at most its own operation; a failed call never
/// takes down other in-flight work.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    session_id: &'a str,
    stream: bool,
    active_context_specification: &'a [StagedItem],
}

impl ApiClient {
    /// Create a client for the backend at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a chat message and return the decoded event stream.
    ///
    /// A non-success status fails here, before any read loop starts. Errors
    /// after this point arrive as terminal `error` events on the stream.
    pub async fn send_chat(
        &self,
        session_id: &str,
        message: &str,
        staged_items: &[StagedItem],
    ) -> Result<StreamEventStream> {
        let body = ChatRequest {
            message,
            session_id,
            stream: true,
            active_context_specification: staged_items,
        };
        tracing::debug!(session_id, staged = staged_items.len(), "sending chat message");
        let response = self
            .http
            .post(self.url("/api/chat"))
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(decode_stream(response.bytes_stream()))
    }

    /// Preview the full context the backend would assemble right now.
    pub async fn preview_context(
        &self,
        session_id: &str,
        request: &PreviewRequest,
    ) -> Result<PreviewResponse> {
        let url = self.url(&format!("/api/sessions/{session_id}/context/preview"));
        let response = check_status(self.http.post(url).json(request).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Lightweight token count for the would-be context.
    pub async fn estimate_tokens(
        &self,
        session_id: &str,
        request: &PreviewRequest,
    ) -> Result<TokenEstimate> {
        let url = self.url(&format!("/api/sessions/{session_id}/context/estimate_tokens"));
        let response = check_status(self.http.post(url).json(request).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Fetch a persisted session with its message history.
    pub async fn fetch_session(&self, session_id: &str) -> Result<Session> {
        let url = self.url(&format!("/api/sessions/{session_id}"));
        let response = check_status(self.http.get(url).send().await?).await?;
        Ok(response.json().await?)
    }
}

/// Session reload seam, so the turn runner can recover a persistent id
/// without knowing about HTTP.
#[async_trait]
pub trait SessionLookup: Send + Sync {
    async fn get_session(&self, session_id: &str) -> Result<Session>;
}

#[async_trait]
impl SessionLookup for ApiClient {
    async fn get_session(&self, session_id: &str) -> Result<Session> {
        self.fetch_session(session_id).await
    }
}

/// Preview round-trip seam used by the sync scheduler.
#[async_trait]
pub trait PreviewApi: Send + Sync {
    async fn preview_context(
        &self,
        session_id: &str,
        request: &PreviewRequest,
    ) -> Result<PreviewResponse>;

    async fn estimate_tokens(
        &self,
        session_id: &str,
        request: &PreviewRequest,
    ) -> Result<TokenEstimate>;
}

#[async_trait]
impl PreviewApi for ApiClient {
    async fn preview_context(
        &self,
        session_id: &str,
        request: &PreviewRequest,
    ) -> Result<PreviewResponse> {
        ApiClient::preview_context(self, session_id, request).await
    }

    async fn estimate_tokens(
        &self,
        session_id: &str,
        request: &PreviewRequest,
    ) -> Result<TokenEstimate> {
        ApiClient::estimate_tokens(self, session_id, request).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::api(status.as_u16(), error_message_from_body(&body)))
}

/// Backend error bodies are `{"error": "..."}`; fall back to the raw text.
fn error_message_from_body(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
            return message.to_string();
        }
    }
    if body.trim().is_empty() {
        "no response body".to_string()
    } else {
        body.trim().to_string()
    }
}
