use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::api::models::{EnrollmentBatchRequest, ErrorBody, SubmitResponse};
use crate::jobs::{BatchProcessor, ProgressStore};

pub mod models;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn ProgressStore>,
    pub processor: BatchProcessor,
    pub max_batch_items: usize,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/jobs/enrollments", post(submit_enrollments))
        .route("/jobs/:id/progress", get(get_progress))
        // Health
        .route("/health", get(health))
        .with_state(state)
}

fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
            message: message.into(),
            details: None,
        }),
    )
        .into_response()
}

fn internal_err(e: anyhow::Error) -> Response {
    tracing::error!(error = %e, "request failed");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL",
        format!("internal error: {e}"),
    )
}

pub async fn submit_enrollments(
    State(state): State<ApiState>,
    Json(body): Json<EnrollmentBatchRequest>,
) -> Response {
    let items = body.matriculas;

    if items.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "EMPTY_BATCH",
            "matriculas must contain at least one item",
        );
    }
    if items.len() > state.max_batch_items {
        return error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "BATCH_TOO_LARGE",
            format!(
                "batch has {} items, limit is {}",
                items.len(),
                state.max_batch_items
            ),
        );
    }

    match state.processor.start(items).await {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(SubmitResponse {
                job_id: job_id.to_string(),
            }),
        )
            .into_response(),
        Err(e) => internal_err(e),
    }
}

pub async fn get_progress(Path(id): Path<String>, State(state): State<ApiState>) -> Response {
    let job_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_JOB_ID",
                format!("not a job id: {id}"),
            )
        }
    };

    match state.store.get(job_id).await {
        Ok(Some(progress)) => (StatusCode::OK, Json(progress)).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            "job not found",
            format!("no job with id {job_id}"),
        ),
        Err(e) => internal_err(e),
    }
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
