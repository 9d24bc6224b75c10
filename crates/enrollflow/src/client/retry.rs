//! Transport-error retry layered on top of fresh polling sessions.
//!
//! A single session never retries. [`track_with_retry`] watches a job with
//! one session at a time and, when a session dies on a transport error,
//! backs off and starts a new one.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

use crate::client::poller::{ProgressPoller, ProgressPresenter, SessionState};
use crate::client::JobId;
use crate::error::PollError;
use crate::jobs::model::{JobProgress, JobStatus};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub base: Duration,
    pub max: Duration,
    pub jitter_pct: f64,
    /// Fresh sessions allowed after the first one fails on transport.
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(15),
            jitter_pct: 0.20,
            max_retries: 5,
        }
    }
}

pub fn next_delay(retry_no: u32, cfg: &RetryConfig, rng: &mut impl Rng) -> Duration {
    let retry_no = retry_no.max(1);

    // first retry waits `base`, each later one doubles it
    let exp = retry_no.saturating_sub(1);
    let pow2 = 1_u64.checked_shl(exp).unwrap_or(u64::MAX);

    let base_ms = cfg.base.as_millis() as u64;
    let max_ms = cfg.max.as_millis() as u64;

    let delay = base_ms.saturating_mul(pow2).min(max_ms);

    // +/- jitter_pct of the capped delay, clamped to [0, max] below
    let jitter_range = (delay as f64) * cfg.jitter_pct;
    let jitter = if jitter_range > 0.0 {
        rng.gen_range(-jitter_range..=jitter_range)
    } else {
        0.0
    };

    let jittered = (delay as f64 + jitter).round().max(0.0) as u64;
    Duration::from_millis(jittered.min(max_ms))
}

/// Forwards everything except transport errors, which it keeps for the
/// retry loop to decide on. Keeps `current` monotonic across sessions.
struct RetryPresenter {
    inner: Arc<dyn ProgressPresenter>,
    held: Mutex<Option<PollError>>,
    last_current: Mutex<Option<u32>>,
}

impl RetryPresenter {
    fn new(inner: Arc<dyn ProgressPresenter>) -> Self {
        Self {
            inner,
            held: Mutex::new(None),
            last_current: Mutex::new(None),
        }
    }

    fn take_held(&self) -> Option<PollError> {
        self.held.lock().ok().and_then(|mut h| h.take())
    }
}

impl ProgressPresenter for RetryPresenter {
    fn on_update(&self, progress: &JobProgress) {
        let mut last = match self.last_current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if progress.status == JobStatus::Processing
            && last.is_some_and(|prev| progress.current < prev)
        {
            tracing::warn!(
                current = progress.current,
                previous = ?*last,
                "dropping out-of-order progress snapshot after restart",
            );
            return;
        }
        *last = Some(progress.current);
        drop(last);

        self.inner.on_update(progress);
    }

    fn on_complete(&self, progress: &JobProgress) {
        self.inner.on_complete(progress);
    }

    fn on_error(&self, error: PollError) {
        if error.is_transport() {
            if let Ok(mut held) = self.held.lock() {
                *held = Some(error);
                return;
            }
        }
        self.inner.on_error(error);
    }
}

/// Watch `job_id` until it ends, retrying transport failures with backoff.
///
/// The presenter sees the same contract as a single session: `current`
/// never goes backwards and at most one `on_complete` or `on_error` fires.
/// Sessions started here are private to this call even when `poller`
/// already polls `job_id` for someone else. Returns the final state.
pub async fn track_with_retry(
    poller: &ProgressPoller,
    job_id: JobId,
    presenter: Arc<dyn ProgressPresenter>,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> SessionState {
    let wrapper = Arc::new(RetryPresenter::new(presenter.clone()));
    let mut rng = StdRng::from_entropy();
    let mut retries = 0u32;

    loop {
        let handle = poller.start_private(job_id.clone(), wrapper.clone());

        let state = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                handle.cancel();
                return SessionState::Cancelled;
            }
            state = handle.wait() => state,
        };

        let transport_err = match (state, wrapper.take_held()) {
            (SessionState::Failed, Some(err)) => err,
            (state, _) => return state,
        };

        if retries >= retry.max_retries {
            tracing::warn!(job_id = %job_id, retries, "giving up on progress polling");
            if !cancel.is_cancelled() {
                presenter.on_error(transport_err);
            }
            return SessionState::Failed;
        }

        retries += 1;
        let delay = next_delay(retries, retry, &mut rng);
        tracing::info!(
            job_id = %job_id,
            retry = retries,
            delay_ms = delay.as_millis() as u64,
            error = %transport_err,
            "restarting progress polling",
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionState::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
