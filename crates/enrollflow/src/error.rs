//! Errors surfaced by the submission client and the progress poller.

use crate::jobs::model::JobProgress;

/// Failure to submit a batch job.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The batch had no items; nothing was sent.
    #[error("batch is empty")]
    EmptyBatch,

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("submission rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The backend accepted the batch but returned no usable job id.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

/// Failure to fetch one progress snapshot.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("status endpoint error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("malformed progress snapshot: {0}")]
    Decode(String),
}

/// Terminal error of a polling session, delivered through `on_error`.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The backend marked the job failed. Displays the backend message as-is.
    #[error("{message}")]
    JobFailed {
        message: String,
        progress: Box<JobProgress>,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The attempt budget ran out while the job was still processing.
    #[error("timeout")]
    Timeout { attempts: u32 },
}

impl PollError {
    pub fn is_transport(&self) -> bool {
        matches!(self, PollError::Transport(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::Timeout { .. })
    }
}
