//! HTTP client for the batch job endpoints.
//!
//! Wraps job submission (`POST /jobs/enrollments`) and progress lookup
//! (`GET /jobs/{id}/progress`) using [`reqwest`].

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::api::models::EnrollmentBatchRequest;
use crate::client::poller::ProgressSource;
use crate::client::JobId;
use crate::error::{SubmitError, TransportError};
use crate::jobs::model::{EnrollmentItem, JobProgress};

pub const ENROLLMENTS_PATH: &str = "/jobs/enrollments";

/// HTTP client for one backend.
#[derive(Clone)]
pub struct JobsClient {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl JobsClient {
    /// * `base_url` - e.g. `http://127.0.0.1:8080`; a trailing slash is ignored.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            bearer_token: None,
        }
    }

    /// Attach `Authorization: Bearer <token>` to every request.
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit an enrollment batch as `{ "matriculas": [...] }`.
    ///
    /// Fails with [`SubmitError::EmptyBatch`] before any network call when
    /// `items` is empty.
    pub async fn submit_enrollments(&self, items: &[EnrollmentItem]) -> Result<JobId, SubmitError> {
        if items.is_empty() {
            return Err(SubmitError::EmptyBatch);
        }
        let body = EnrollmentBatchRequest {
            matriculas: items.to_vec(),
        };
        self.submit(ENROLLMENTS_PATH, &body).await
    }

    /// Submit an application-defined batch payload to `path`.
    ///
    /// Every call creates a new job on the backend, identical payloads
    /// included.
    pub async fn submit<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<JobId, SubmitError> {
        let request = self.client.post(self.url(path)).json(payload);
        let response = self.authorize(request).send().await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(SubmitError::Rejected {
                status: status.as_u16(),
                message: error_message(status.as_u16(), &text),
            });
        }

        let body: Value = serde_json::from_str(&text).map_err(|e| {
            SubmitError::ProtocolViolation(format!("submission response is not JSON: {e}"))
        })?;

        let job_id = extract_job_id(&body)?;
        tracing::info!(job_id = %job_id, "batch job submitted");
        Ok(job_id)
    }

    /// Fetch the current snapshot of a job.
    pub async fn fetch_progress(&self, job_id: &JobId) -> Result<JobProgress, TransportError> {
        let url = self.url(&format!("/jobs/{}/progress", job_id.as_str()));
        let response = self.authorize(self.client.get(url)).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()))
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ProgressSource for JobsClient {
    async fn fetch_progress(&self, job_id: &JobId) -> Result<JobProgress, TransportError> {
        JobsClient::fetch_progress(self, job_id).await
    }
}

/// Pull the job id out of a submission response body.
///
/// Accepts a non-empty string or a number under `jobId`.
pub fn extract_job_id(body: &Value) -> Result<JobId, SubmitError> {
    match body.get("jobId") {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(JobId::new(s.trim())),
        Some(Value::Number(n)) => Ok(JobId::new(n.to_string())),
        Some(other) if !other.is_null() => Err(SubmitError::ProtocolViolation(format!(
            "jobId has unexpected type: {other}"
        ))),
        _ => Err(SubmitError::ProtocolViolation(
            "backend accepted the batch but returned no jobId".to_string(),
        )),
    }
}

/// Human-readable message from an error response body.
fn error_message(status: u16, text: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(text).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let message = field("message")
        .or_else(|| field("error"))
        .or_else(|| Some(text.trim().to_string()).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| format!("HTTP {status}"));

    match field("details") {
        Some(details) => format!("{message} ({details})"),
        None => message,
    }
}
