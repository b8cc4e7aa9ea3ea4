//! Remote answer client
//!
//! One request/response exchange per question against a fixed endpoint.
//! Non-success statuses come back as an error reply; only transport and
//! decoding failures surface as [`AskError`]. No retry happens at this layer.

mod error;
mod types;

pub use error::{AskError, AskErrorKind};
pub use types::{AskMetadata, AskReply, AskRequest, AskResponse, UNKNOWN_ERROR};

use crate::config::ChatConfig;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::sync::Arc;

/// Anything that can answer a question
#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn ask(&self, question: &str) -> Result<AskResponse, AskError>;

    /// Where questions go, for logging
    fn endpoint(&self) -> &str;
}

#[async_trait]
impl<T: AnswerService + ?Sized> AnswerService for Arc<T> {
    async fn ask(&self, question: &str) -> Result<AskResponse, AskError> {
        (**self).ask(question).await
    }

    fn endpoint(&self) -> &str {
        (**self).endpoint()
    }
}

/// reqwest-backed client for the answer endpoint
pub struct HttpAnswerClient {
    client: Client,
    endpoint: String,
    user: String,
}

impl HttpAnswerClient {
    pub fn new(config: &ChatConfig) -> Result<Self, AskError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AskError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            user: config.user.clone(),
        })
    }
}

#[async_trait]
impl AnswerService for HttpAnswerClient {
    async fn ask(&self, question: &str) -> Result<AskResponse, AskError> {
        let request = AskRequest {
            question,
            metadata: AskMetadata { user: &self.user },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AskError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Answer endpoint returned an error status");
            return Ok(AskResponse::http_error(status));
        }

        let reply: AskReply = response.json().await.map_err(|e| AskError::from_reqwest(&e))?;
        Ok(reply.into_response())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Logging wrapper for answer services
pub struct LoggingService {
    inner: Arc<dyn AnswerService>,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn AnswerService>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl AnswerService for LoggingService {
    async fn ask(&self, question: &str) -> Result<AskResponse, AskError> {
        let start = std::time::Instant::now();
        let result = self.inner.ask(question).await;
        let duration = start.elapsed();

        match &result {
            Ok(AskResponse::Answered { payload, answer }) => {
                tracing::info!(
                    endpoint = %self.inner.endpoint(),
                    duration_ms = %duration.as_millis(),
                    intent = %payload.intent(),
                    answer_len = answer.len(),
                    "Question answered"
                );
            }
            Ok(AskResponse::Rejected(error)) => {
                tracing::warn!(
                    endpoint = %self.inner.endpoint(),
                    duration_ms = %duration.as_millis(),
                    intent = %error.intent,
                    error = %error.message,
                    "Question rejected"
                );
            }
            Err(e) => {
                tracing::error!(
                    endpoint = %self.inner.endpoint(),
                    duration_ms = %duration.as_millis(),
                    kind = ?e.kind,
                    error = %e.message,
                    "Answer request failed"
                );
            }
        }

        result
    }

    fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }
}
