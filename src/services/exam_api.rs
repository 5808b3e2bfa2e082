use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::core::config::Settings;
use crate::schemas::session::{SubmitAnswerRequest, TimeRemainingResponse};

#[derive(Debug, Error)]
pub(crate) enum ExamApiError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },
    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Persists a single answer on the exam server.
#[async_trait]
pub(crate) trait AnswerStore: Send + Sync {
    async fn save_answer(
        &self,
        session_id: &str,
        request: &SubmitAnswerRequest,
    ) -> Result<(), ExamApiError>;
}

/// Authoritative remaining time and submission status of a session.
#[async_trait]
pub(crate) trait ServerTimeSource: Send + Sync {
    async fn time_remaining(&self, session_id: &str) -> Result<TimeRemainingResponse, ExamApiError>;
}

/// The final form post that ends an attempt.
#[async_trait]
pub(crate) trait SubmissionGateway: Send + Sync {
    async fn submit_exam(
        &self,
        session_id: &str,
        fields: &[(String, String)],
    ) -> Result<(), ExamApiError>;
}

#[derive(Debug, Clone)]
pub(crate) struct HttpExamApi {
    client: Client,
    base_url: String,
}

impl HttpExamApi {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.server().http_timeout_seconds);
        Self::new(settings.server().base_url.as_str(), timeout)
    }

    pub(crate) fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .timeout(timeout)
            .build()
            .context("Failed to build exam server HTTP client")?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn answer_endpoint(&self, session_id: &str) -> String {
        format!("{}/student/exam/session/{session_id}/submit-answer", self.base_url)
    }

    fn time_endpoint(&self, session_id: &str) -> String {
        format!("{}/api/exam/session/{session_id}/time-remaining", self.base_url)
    }

    fn submit_endpoint(&self, session_id: &str) -> String {
        format!("{}/student/exam/session/{session_id}/submit", self.base_url)
    }
}

#[async_trait]
impl AnswerStore for HttpExamApi {
    async fn save_answer(
        &self,
        session_id: &str,
        request: &SubmitAnswerRequest,
    ) -> Result<(), ExamApiError> {
        let endpoint = self.answer_endpoint(session_id);
        let response = self
            .client
            .post(&endpoint)
            .json(request)
            .send()
            .await
            .map_err(|source| ExamApiError::Transport { endpoint: endpoint.clone(), source })?;

        ensure_success(endpoint, response.status())
    }
}

#[async_trait]
impl ServerTimeSource for HttpExamApi {
    async fn time_remaining(&self, session_id: &str) -> Result<TimeRemainingResponse, ExamApiError> {
        let endpoint = self.time_endpoint(session_id);
        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .map_err(|source| ExamApiError::Transport { endpoint: endpoint.clone(), source })?;

        ensure_success(endpoint.clone(), response.status())?;
        response
            .json::<TimeRemainingResponse>()
            .await
            .map_err(|source| ExamApiError::Decode { endpoint, source })
    }
}

#[async_trait]
impl SubmissionGateway for HttpExamApi {
    async fn submit_exam(
        &self,
        session_id: &str,
        fields: &[(String, String)],
    ) -> Result<(), ExamApiError> {
        let endpoint = self.submit_endpoint(session_id);
        let response = self
            .client
            .post(&endpoint)
            .form(fields)
            .send()
            .await
            .map_err(|source| ExamApiError::Transport { endpoint: endpoint.clone(), source })?;

        ensure_success(endpoint, response.status())
    }
}

fn ensure_success(endpoint: String, status: reqwest::StatusCode) -> Result<(), ExamApiError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ExamApiError::Status { endpoint, status: status.as_u16() })
    }
}

/// Runs `call` in the background. The caller never awaits it; failures are
/// handed to `on_failure`, which decides how (and whether) to surface them.
pub(crate) fn fire_and_forget<F, E>(call: F, on_failure: impl FnOnce(E) + Send + 'static)
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = call.await {
            on_failure(err);
        }
    });
}
