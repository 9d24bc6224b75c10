//! Bulk enrollment jobs: batch submission, server-side progress tracking and
//! client-side progress polling.

pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;

pub use client::{JobId, JobsClient, PollConfig, PollHandle, ProgressPoller, ProgressPresenter};
pub use error::{PollError, SubmitError, TransportError};
pub use jobs::{JobProgress, JobStatus};
