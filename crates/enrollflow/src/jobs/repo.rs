// crates/enrollflow/src/jobs/repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::jobs::model::{
    FailedItem, JobProgress, JobStatus, ProgressViolation, SucceededItem,
};
use crate::jobs::store::ProgressStore;

#[derive(Debug, sqlx::FromRow)]
struct ProgressRow {
    status: String,
    current: i32,
    total: i32,
    message: String,
    success: Json<Vec<SucceededItem>>,
    errors: Json<Vec<FailedItem>>,
}

impl ProgressRow {
    fn into_progress(self) -> anyhow::Result<JobProgress> {
        let status = JobStatus::from_str(&self.status)
            .ok_or_else(|| anyhow::anyhow!("unknown job status in db: {}", self.status))?;

        Ok(JobProgress {
            status,
            current: self.current.max(0) as u32,
            total: self.total.max(0) as u32,
            message: self.message,
            success: self.success.0,
            errors: self.errors.0,
        })
    }
}

/// Postgres-backed progress store (`job_progress` table).
#[derive(Clone)]
pub struct PgProgressRepo {
    pool: PgPool,
}

impl PgProgressRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ----------------------------
    // Internal helpers
    // ----------------------------

    /// Called when a conditional update touched no row: reload and report why.
    async fn explain_miss(&self, job_id: Uuid, appending: bool) -> anyhow::Error {
        match self.get(job_id).await {
            Ok(None) => ProgressViolation::NotFound(job_id.to_string()).into(),
            Ok(Some(p)) if p.is_terminal() => {
                ProgressViolation::AlreadyTerminal { status: p.status }.into()
            }
            Ok(Some(p)) if appending => {
                ProgressViolation::CapacityExceeded { total: p.total }.into()
            }
            Ok(Some(p)) => ProgressViolation::Incomplete {
                current: p.current,
                total: p.total,
            }
            .into(),
            Err(e) => e,
        }
    }

    async fn append(&self, job_id: Uuid, column: &str, item: serde_json::Value) -> anyhow::Result<()> {
        // column is one of two literals below, never user input
        let sql = format!(
            r#"
            UPDATE job_progress
            SET {column} = {column} || $2::jsonb,
                current = current + 1,
                updated_at = now()
            WHERE id = $1
              AND status = 'processing'
              AND current < total
            "#
        );

        let res = sqlx::query(&sql)
            .bind(job_id)
            .bind(json!([item]))
            .execute(&self.pool)
            .await?;

        if res.rows_affected() == 0 {
            return Err(self.explain_miss(job_id, true).await);
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for PgProgressRepo {
    async fn create(&self, total: u32, message: &str) -> anyhow::Result<Uuid> {
        let total = i32::try_from(total)?;

        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO job_progress (id, status, current, total, message, success, errors)
            VALUES ($1, $2, 0, $3, $4, '[]'::jsonb, '[]'::jsonb)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(JobStatus::Processing.as_str())
        .bind(total)
        .bind(message)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get(&self, job_id: Uuid) -> anyhow::Result<Option<JobProgress>> {
        let row = sqlx::query_as::<_, ProgressRow>(
            r#"
            SELECT status, current, total, message, success, errors
            FROM job_progress
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProgressRow::into_progress).transpose()
    }

    async fn record_success(&self, job_id: Uuid, item: SucceededItem) -> anyhow::Result<()> {
        self.append(job_id, "success", serde_json::to_value(item)?)
            .await
    }

    async fn record_error(&self, job_id: Uuid, item: FailedItem) -> anyhow::Result<()> {
        self.append(job_id, "errors", serde_json::to_value(item)?)
            .await
    }

    async fn set_message(&self, job_id: Uuid, message: &str) -> anyhow::Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE job_progress
            SET message = $2, updated_at = now()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .bind(message)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Err(self.explain_miss(job_id, false).await);
        }
        Ok(())
    }

    async fn complete(&self, job_id: Uuid, message: &str) -> anyhow::Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE job_progress
            SET status = $2, message = $3, updated_at = now()
            WHERE id = $1
              AND status = 'processing'
              AND current = total
            "#,
        )
        .bind(job_id)
        .bind(JobStatus::Completed.as_str())
        .bind(message)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Err(self.explain_miss(job_id, false).await);
        }
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, message: &str) -> anyhow::Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE job_progress
            SET status = $2, message = $3, updated_at = now()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .bind(JobStatus::Failed.as_str())
        .bind(message)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Err(self.explain_miss(job_id, false).await);
        }
        Ok(())
    }

    async fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            DELETE FROM job_progress
            WHERE status <> 'processing'
              AND updated_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected())
    }
}
