mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{processing, snapshot, ErrorKind, Event, RecordingPresenter, Scripted, ScriptedSource};
use enrollflow::client::{
    track_with_retry, JobId, PollConfig, ProgressPoller, RetryConfig, SessionState,
};
use enrollflow::jobs::JobStatus;
use tokio_util::sync::CancellationToken;

fn setup(source: Arc<ScriptedSource>) -> ProgressPoller {
    ProgressPoller::new(
        source,
        PollConfig {
            interval: Duration::from_millis(1000),
            max_attempts: 300,
        },
    )
}

fn retry_cfg(max_retries: u32) -> RetryConfig {
    RetryConfig {
        base: Duration::from_millis(100),
        max: Duration::from_secs(1),
        jitter_pct: 0.0,
        max_retries,
    }
}

#[tokio::test(start_paused = true)]
async fn recovers_from_transport_error_with_fresh_session() {
    let done = snapshot(JobStatus::Completed, 3, 3, "done");
    let source = Arc::new(ScriptedSource::new(vec![
        Scripted::Snapshot(processing(1, 3)),
        Scripted::Unavailable,
        Scripted::Snapshot(processing(2, 3)),
        Scripted::Snapshot(done.clone()),
    ]));
    let presenter = RecordingPresenter::new();

    let state = track_with_retry(
        &setup(source.clone()),
        JobId::new("r1"),
        presenter.clone(),
        &retry_cfg(2),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(state, SessionState::Completed);
    assert_eq!(source.fetches(), 4);
    assert_eq!(presenter.terminal_events(), vec![Event::Complete(done)]);

    let currents: Vec<u32> = presenter.updates().iter().map(|p| p.current).collect();
    assert_eq!(currents, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_retries_with_one_error() {
    // empty script: every fetch is a transport error
    let source = Arc::new(ScriptedSource::new(Vec::new()));
    let presenter = RecordingPresenter::new();

    let state = track_with_retry(
        &setup(source.clone()),
        JobId::new("r2"),
        presenter.clone(),
        &retry_cfg(2),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(state, SessionState::Failed);
    assert_eq!(source.fetches(), 3);

    let events = presenter.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Event::Error(ErrorKind::Transport, _)));
}

#[tokio::test(start_paused = true)]
async fn job_failure_is_not_retried() {
    let source = Arc::new(ScriptedSource::new(vec![Scripted::Snapshot(snapshot(
        JobStatus::Failed,
        0,
        3,
        "disk full",
    ))]));
    let presenter = RecordingPresenter::new();

    let state = track_with_retry(
        &setup(source.clone()),
        JobId::new("r3"),
        presenter.clone(),
        &retry_cfg(5),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(state, SessionState::Failed);
    assert_eq!(source.fetches(), 1);
    assert_eq!(
        presenter.events(),
        vec![Event::Error(ErrorKind::JobFailed, "disk full".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_tracking() {
    let source = Arc::new(ScriptedSource::always(processing(1, 3)));
    let presenter = RecordingPresenter::new();
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        canceller.cancel();
    });

    let state = track_with_retry(
        &setup(source.clone()),
        JobId::new("r4"),
        presenter.clone(),
        &retry_cfg(5),
        &cancel,
    )
    .await;

    assert_eq!(state, SessionState::Cancelled);
    let fetched = source.fetches();
    assert_eq!(fetched, 2);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(source.fetches(), fetched);
    assert!(presenter.terminal_events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn restart_does_not_deliver_regressed_progress() {
    let done = snapshot(JobStatus::Completed, 3, 3, "done");
    let source = Arc::new(ScriptedSource::new(vec![
        Scripted::Snapshot(processing(2, 3)),
        Scripted::Unavailable,
        Scripted::Snapshot(processing(1, 3)),
        Scripted::Snapshot(done.clone()),
    ]));
    let presenter = RecordingPresenter::new();

    let state = track_with_retry(
        &setup(source.clone()),
        JobId::new("r5"),
        presenter.clone(),
        &retry_cfg(2),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(state, SessionState::Completed);
    assert_eq!(source.fetches(), 4);

    let currents: Vec<u32> = presenter.updates().iter().map(|p| p.current).collect();
    assert_eq!(currents, vec![2, 3]);
    assert_eq!(presenter.terminal_events(), vec![Event::Complete(done)]);
}

#[tokio::test(start_paused = true)]
async fn tracking_a_job_already_polled_on_the_same_poller() {
    let done = snapshot(JobStatus::Completed, 2, 2, "done");
    let source = Arc::new(ScriptedSource::always(done.clone()));
    let poller = setup(source.clone());

    let other = RecordingPresenter::new();
    let existing = poller.start(JobId::new("shared"), other.clone());

    let presenter = RecordingPresenter::new();
    let state = track_with_retry(
        &poller,
        JobId::new("shared"),
        presenter.clone(),
        &retry_cfg(2),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(state, SessionState::Completed);
    assert_eq!(presenter.terminal_events(), vec![Event::Complete(done.clone())]);

    assert_eq!(existing.wait().await, SessionState::Completed);
    assert_eq!(other.terminal_events(), vec![Event::Complete(done)]);
    assert_eq!(source.fetches(), 2);
}
