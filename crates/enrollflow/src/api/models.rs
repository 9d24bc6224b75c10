// crates/enrollflow/src/api/models.rs
use serde::{Deserialize, Serialize};

use crate::jobs::model::EnrollmentItem;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentBatchRequest {
    #[serde(default)]
    pub matriculas: Vec<EnrollmentItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(rename = "jobId")]
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
