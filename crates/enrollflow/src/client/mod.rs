pub mod http;
pub mod poller;
pub mod retry;

use serde::{Deserialize, Serialize};

pub use http::JobsClient;
pub use poller::{
    PollConfig, PollHandle, ProgressPoller, ProgressPresenter, ProgressSource, SessionState,
};
pub use retry::{track_with_retry, RetryConfig};

/// Opaque job identifier handed out by the submission endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<uuid::Uuid> for JobId {
    fn from(id: uuid::Uuid) -> Self {
        Self(id.to_string())
    }
}
