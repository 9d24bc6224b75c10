//! Progress polling for submitted batch jobs.
//!
//! A polling session fetches a job's [`JobProgress`] once immediately and
//! then again `interval` after each response has been handled, feeding a
//! [`ProgressPresenter`] until the job reaches a terminal state, the attempt
//! budget runs out, a transport error occurs or the session is cancelled.
//!
//! One session has at most one request in flight and dispatches callbacks
//! from a single task, so the presenter sees snapshots in arrival order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::client::JobId;
use crate::error::{PollError, TransportError};
use crate::jobs::model::{JobProgress, JobStatus};

/// Where snapshots come from. [`crate::client::JobsClient`] is the HTTP
/// implementation.
#[async_trait]
pub trait ProgressSource: Send + Sync {
    async fn fetch_progress(&self, job_id: &JobId) -> Result<JobProgress, TransportError>;
}

/// Receiver of a session's snapshots.
///
/// `on_complete` and `on_error` are mutually exclusive and fire at most once
/// per session, after the last `on_update`.
pub trait ProgressPresenter: Send + Sync {
    /// Every delivered `processing` snapshot and the final `completed` one.
    /// May repeat a snapshot with an unchanged `current`.
    fn on_update(&self, progress: &JobProgress);

    fn on_complete(&self, progress: &JobProgress);

    fn on_error(&self, error: PollError);
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max_attempts: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Polling,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Idle | SessionState::Polling)
    }
}

/// Cancellation and observation handle for one polling session.
#[derive(Clone)]
pub struct PollHandle {
    job_id: JobId,
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
}

impl PollHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Stop the session. Once the session observes the cancellation no
    /// callback starts and no request is issued; a callback already running
    /// on another thread may still finish. Safe to call any number of times,
    /// including after the session ended on its own.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Resolves once the session reached a terminal state.
    pub async fn wait(&self) -> SessionState {
        let mut rx = self.state.clone();
        loop {
            let current = *rx.borrow_and_update();
            if current.is_terminal() {
                return current;
            }
            if rx.changed().await.is_err() {
                // session task is gone; report whatever it left behind
                let last = *rx.borrow();
                return if last.is_terminal() {
                    last
                } else {
                    SessionState::Cancelled
                };
            }
        }
    }
}

/// Starts polling sessions against one [`ProgressSource`].
///
/// Starting a job id that already has a live session on the same poller
/// returns that session's handle instead of starting a second one.
#[derive(Clone)]
pub struct ProgressPoller {
    source: Arc<dyn ProgressSource>,
    cfg: PollConfig,
    sessions: Arc<Mutex<HashMap<JobId, PollHandle>>>,
}

impl ProgressPoller {
    pub fn new(source: Arc<dyn ProgressSource>, cfg: PollConfig) -> Self {
        Self {
            source,
            cfg,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.cfg
    }

    /// Number of sessions on this poller that have not finished yet.
    pub fn active_sessions(&self) -> usize {
        self.lock_sessions()
            .values()
            .filter(|h| !h.is_finished())
            .count()
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, PollHandle>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Begin polling `job_id`. Must be called inside a tokio runtime.
    pub fn start(&self, job_id: JobId, presenter: Arc<dyn ProgressPresenter>) -> PollHandle {
        let mut sessions = self.lock_sessions();
        sessions.retain(|_, h| !h.is_finished());

        if let Some(existing) = sessions.get(&job_id) {
            tracing::debug!(job_id = %job_id, "polling session already running, reusing it");
            return existing.clone();
        }

        let handle = self.spawn_session(job_id.clone(), presenter);
        sessions.insert(job_id, handle.clone());
        handle
    }

    /// Like [`ProgressPoller::start`] but never shares: the session is bound
    /// to `presenter` and is not registered for reuse.
    pub(crate) fn start_private(
        &self,
        job_id: JobId,
        presenter: Arc<dyn ProgressPresenter>,
    ) -> PollHandle {
        self.spawn_session(job_id, presenter)
    }

    fn spawn_session(&self, job_id: JobId, presenter: Arc<dyn ProgressPresenter>) -> PollHandle {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let handle = PollHandle {
            job_id: job_id.clone(),
            cancel: cancel.clone(),
            state: state_rx,
        };

        let session = Session {
            job_id,
            source: self.source.clone(),
            presenter,
            cfg: self.cfg.clone(),
            cancel,
            state: state_tx,
        };
        tokio::spawn(session.run());

        handle
    }
}

struct Session {
    job_id: JobId,
    source: Arc<dyn ProgressSource>,
    presenter: Arc<dyn ProgressPresenter>,
    cfg: PollConfig,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
}

impl Session {
    async fn run(self) {
        let final_state = self.poll_loop().await;
        self.state.send_replace(final_state);
        tracing::debug!(job_id = %self.job_id, state = ?final_state, "polling session ended");
    }

    async fn poll_loop(&self) -> SessionState {
        if self.cancel.is_cancelled() {
            return SessionState::Cancelled;
        }
        self.state.send_replace(SessionState::Polling);

        let max_attempts = self.cfg.max_attempts.max(1);
        let mut attempts: u32 = 0;
        let mut last_current: Option<u32> = None;

        loop {
            attempts += 1;

            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return SessionState::Cancelled,
                res = self.source.fetch_progress(&self.job_id) => res,
            };

            let progress = match fetched {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(job_id = %self.job_id, attempt = attempts, error = %e, "progress fetch failed");
                    return self.finish_with_error(PollError::Transport(e), SessionState::Failed);
                }
            };

            let consistent = progress.check_consistency();

            match progress.status {
                JobStatus::Processing => {
                    let regressed = last_current.is_some_and(|prev| progress.current < prev);
                    if let Err(violation) = consistent {
                        tracing::warn!(
                            job_id = %self.job_id,
                            error = %violation,
                            "dropping inconsistent progress snapshot",
                        );
                    } else if regressed {
                        tracing::warn!(
                            job_id = %self.job_id,
                            current = progress.current,
                            previous = ?last_current,
                            "dropping out-of-order progress snapshot",
                        );
                    } else {
                        if !self.dispatch(|p| p.on_update(&progress)) {
                            return SessionState::Cancelled;
                        }
                        last_current = Some(progress.current);
                    }

                    if attempts >= max_attempts {
                        tracing::warn!(job_id = %self.job_id, attempts, "progress polling timed out");
                        return self
                            .finish_with_error(PollError::Timeout { attempts }, SessionState::TimedOut);
                    }
                }
                JobStatus::Completed | JobStatus::Failed if consistent.is_err() => {
                    let reason = consistent.err().map(|v| v.to_string()).unwrap_or_default();
                    tracing::warn!(job_id = %self.job_id, error = %reason, "inconsistent terminal snapshot");
                    let err = TransportError::Decode(format!("inconsistent snapshot: {reason}"));
                    return self.finish_with_error(PollError::Transport(err), SessionState::Failed);
                }
                JobStatus::Completed => {
                    if !self.dispatch(|p| p.on_update(&progress)) {
                        return SessionState::Cancelled;
                    }
                    if !self.dispatch(|p| p.on_complete(&progress)) {
                        return SessionState::Cancelled;
                    }
                    return SessionState::Completed;
                }
                JobStatus::Failed => {
                    let err = PollError::JobFailed {
                        message: progress.message.clone(),
                        progress: Box::new(progress),
                    };
                    return self.finish_with_error(err, SessionState::Failed);
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return SessionState::Cancelled,
                _ = tokio::time::sleep(self.cfg.interval) => {}
            }
        }
    }

    /// Runs `f` unless the session was cancelled. Returns false if cancelled.
    fn dispatch(&self, f: impl FnOnce(&dyn ProgressPresenter)) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        f(self.presenter.as_ref());
        true
    }

    fn finish_with_error(&self, err: PollError, state: SessionState) -> SessionState {
        if self.dispatch(|p| p.on_error(err)) {
            state
        } else {
            SessionState::Cancelled
        }
    }
}
