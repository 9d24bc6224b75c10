use std::env;
use std::sync::Arc;

use enrollflow::api::models::EnrollmentBatchRequest;
use enrollflow::client::{track_with_retry, JobId, JobsClient, ProgressPoller, SessionState};
use enrollflow::config::ClientConfig;
use enrollflow::jobs::{EnrollmentItem, JobProgress};
use enrollflow::{PollError, ProgressPresenter};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "enrollctl <command>\n\
     Commands:\n\
     - submit <file.json>    submit a batch, print the job id\n\
     - status <job_id>       print one progress snapshot\n\
     - watch <job_id>        poll until the job ends\n\
     - enroll <file.json>    submit, then watch\n\
     \n\
     The file holds a JSON array of {codigo, nombre, grupo} or {\"matriculas\": [...]}.\n\
     Uses ENROLLFLOW_API_URL (default http://127.0.0.1:8080).\n";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "enrollflow=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprint!("{USAGE}");
        std::process::exit(2);
    }

    let cfg = ClientConfig::from_env()?;
    let client = JobsClient::new(cfg.api_url.clone()).with_bearer_token(cfg.api_token.clone());

    let code = match args[1].as_str() {
        "submit" => {
            let items = read_items(&args[2])?;
            let job_id = client.submit_enrollments(&items).await?;
            println!("{job_id}");
            0
        }
        "status" => {
            let progress = client.fetch_progress(&JobId::new(args[2].as_str())).await?;
            println!("{}", serde_json::to_string_pretty(&progress)?);
            0
        }
        "watch" => watch(&client, &cfg, JobId::new(args[2].as_str())).await,
        "enroll" => {
            let items = read_items(&args[2])?;
            let job_id = client.submit_enrollments(&items).await?;
            println!("submitted {} item(s) as job {job_id}", items.len());
            watch(&client, &cfg, job_id).await
        }
        other => {
            eprintln!("Unknown command: {other}");
            2
        }
    };

    std::process::exit(code);
}

fn read_items(path: &str) -> anyhow::Result<Vec<EnrollmentItem>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read {path}: {e}"))?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;

    let items = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        serde_json::from_value::<EnrollmentBatchRequest>(value)?.matriculas
    };
    Ok(items)
}

async fn watch(client: &JobsClient, cfg: &ClientConfig, job_id: JobId) -> i32 {
    let poller = ProgressPoller::new(Arc::new(client.clone()), cfg.poll());
    let cancel = CancellationToken::new();

    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let state = track_with_retry(
        &poller,
        job_id,
        Arc::new(ConsolePresenter),
        &cfg.retry(),
        &cancel,
    )
    .await;

    match state {
        SessionState::Completed => 0,
        SessionState::Cancelled => {
            eprintln!("cancelled; the job keeps running on the server");
            130
        }
        _ => 1,
    }
}

struct ConsolePresenter;

impl ProgressPresenter for ConsolePresenter {
    fn on_update(&self, p: &JobProgress) {
        println!("[{:>3}%] {}/{} {}", p.percent(), p.current, p.total, p.message);
    }

    fn on_complete(&self, p: &JobProgress) {
        let s = p.summary();
        println!("done: {} enrolled, {} failed", s.succeeded, s.failed);
        for e in &p.errors {
            println!("  {} {}: {}", e.codigo, e.nombre, e.error);
        }
    }

    fn on_error(&self, error: PollError) {
        match &error {
            PollError::JobFailed { progress, .. } => {
                eprintln!(
                    "job failed after {}/{} item(s): {error}",
                    progress.current, progress.total
                );
            }
            PollError::Timeout { attempts } => {
                eprintln!("stopped watching after {attempts} attempts (job may still be running)");
            }
            PollError::Transport(e) => eprintln!("lost contact with server: {e}"),
        }
    }
}
