// crates/enrollflow/src/jobs/processor.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use uuid::Uuid;

use crate::jobs::handlers::{EnrollmentHandler, ItemError};
use crate::jobs::model::{EnrollmentItem, FailedItem, SucceededItem};
use crate::jobs::store::ProgressStore;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Upper bound for a single `enroll` call.
    pub item_timeout: Duration,
    /// Pause between items (zero disables it).
    pub item_delay: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            item_timeout: Duration::from_secs(10),
            item_delay: Duration::ZERO,
        }
    }
}

/// Runs enrollment batches against a handler and records progress in a store.
#[derive(Clone)]
pub struct BatchProcessor {
    store: Arc<dyn ProgressStore>,
    handler: Arc<dyn EnrollmentHandler>,
    cfg: ProcessorConfig,
}

impl BatchProcessor {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        handler: Arc<dyn EnrollmentHandler>,
        cfg: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            handler,
            cfg,
        }
    }

    pub fn store(&self) -> &Arc<dyn ProgressStore> {
        &self.store
    }

    /// Creates the progress record and processes the batch in the background.
    pub async fn start(&self, items: Vec<EnrollmentItem>) -> anyhow::Result<Uuid> {
        let total = u32::try_from(items.len())?;
        let job_id = self
            .store
            .create(total, &format!("processing {total} item(s)"))
            .await?;

        tracing::info!(job_id = %job_id, total, "batch job started");

        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.run(job_id, items).await {
                tracing::error!(job_id = %job_id, error = %e, "batch job aborted");
                let msg = format!("internal error: {e}");
                if let Err(e) = this.store.fail(job_id, &msg).await {
                    tracing::warn!(job_id = %job_id, error = %e, "could not mark job failed");
                }
            }
        });

        Ok(job_id)
    }

    /// Works through `items` in order. Returns early once the job is failed.
    pub async fn run(&self, job_id: Uuid, items: Vec<EnrollmentItem>) -> anyhow::Result<()> {
        let mut succeeded = 0usize;
        let mut failed = 0usize;

        for (idx, item) in items.iter().enumerate() {
            if idx > 0 && !self.cfg.item_delay.is_zero() {
                tokio::time::sleep(self.cfg.item_delay).await;
            }

            match self.enroll_one(item).await {
                Ok(()) => {
                    self.store
                        .record_success(job_id, SucceededItem::from_item(item))
                        .await?;
                    succeeded += 1;
                }
                Err(ItemError::Rejected(reason)) => {
                    tracing::debug!(job_id = %job_id, codigo = %item.codigo, %reason, "item rejected");
                    self.store
                        .record_error(job_id, FailedItem::from_item(item, reason))
                        .await?;
                    failed += 1;
                }
                Err(ItemError::Fatal(reason)) => {
                    tracing::warn!(job_id = %job_id, codigo = %item.codigo, %reason, "batch job failed");
                    self.store.fail(job_id, &reason).await?;
                    return Ok(());
                }
            }
        }

        let message = format!("completed: {succeeded} succeeded, {failed} failed");
        self.store.complete(job_id, &message).await?;
        tracing::info!(job_id = %job_id, succeeded, failed, "batch job completed");
        Ok(())
    }

    async fn enroll_one(&self, item: &EnrollmentItem) -> Result<(), ItemError> {
        let dur = self.cfg.item_timeout;
        match timeout(dur, self.handler.enroll(item)).await {
            Ok(inner) => inner,
            Err(_) => Err(ItemError::Rejected(format!(
                "timeout after {}ms",
                dur.as_millis()
            ))),
        }
    }
}
