// crates/enrollflow/src/jobs/store.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::jobs::model::{FailedItem, JobProgress, ProgressViolation, SucceededItem};

/// Server-side storage of job progress records.
///
/// Implementations reject mutations that would break the progress invariants
/// with a [`ProgressViolation`] wrapped in the returned `anyhow::Error`.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn create(&self, total: u32, message: &str) -> anyhow::Result<Uuid>;

    async fn get(&self, job_id: Uuid) -> anyhow::Result<Option<JobProgress>>;

    async fn record_success(&self, job_id: Uuid, item: SucceededItem) -> anyhow::Result<()>;

    async fn record_error(&self, job_id: Uuid, item: FailedItem) -> anyhow::Result<()>;

    async fn set_message(&self, job_id: Uuid, message: &str) -> anyhow::Result<()>;

    async fn complete(&self, job_id: Uuid, message: &str) -> anyhow::Result<()>;

    async fn fail(&self, job_id: Uuid, message: &str) -> anyhow::Result<()>;

    /// Deletes terminal jobs last touched before `cutoff`. Returns rows removed.
    async fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;
}

struct Entry {
    progress: JobProgress,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryProgressStore {
    jobs: RwLock<HashMap<Uuid, Entry>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    async fn mutate<F>(&self, job_id: Uuid, f: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut JobProgress) -> Result<(), ProgressViolation> + Send,
    {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(&job_id)
            .ok_or_else(|| ProgressViolation::NotFound(job_id.to_string()))?;
        f(&mut entry.progress)?;
        entry.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn create(&self, total: u32, message: &str) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        self.jobs.write().await.insert(
            id,
            Entry {
                progress: JobProgress::started(total, message),
                updated_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get(&self, job_id: Uuid) -> anyhow::Result<Option<JobProgress>> {
        Ok(self
            .jobs
            .read()
            .await
            .get(&job_id)
            .map(|e| e.progress.clone()))
    }

    async fn record_success(&self, job_id: Uuid, item: SucceededItem) -> anyhow::Result<()> {
        self.mutate(job_id, |p| p.push_success(item)).await
    }

    async fn record_error(&self, job_id: Uuid, item: FailedItem) -> anyhow::Result<()> {
        self.mutate(job_id, |p| p.push_error(item)).await
    }

    async fn set_message(&self, job_id: Uuid, message: &str) -> anyhow::Result<()> {
        self.mutate(job_id, |p| p.set_message(message)).await
    }

    async fn complete(&self, job_id: Uuid, message: &str) -> anyhow::Result<()> {
        self.mutate(job_id, |p| p.complete(message)).await
    }

    async fn fail(&self, job_id: Uuid, message: &str) -> anyhow::Result<()> {
        self.mutate(job_id, |p| p.fail(message)).await
    }

    async fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, e| !(e.progress.is_terminal() && e.updated_at < cutoff));
        Ok((before - jobs.len()) as u64)
    }
}
