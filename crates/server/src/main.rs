use std::sync::Arc;
use std::time::Duration;

use enrollflow::api;
use enrollflow::config::ServerConfig;
use enrollflow::db;
use enrollflow::jobs::{
    BatchProcessor, MemoryProgressStore, PgProgressRepo, ProgressStore, RosterHandler,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = ServerConfig::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "enrollflow=info,enrollflow_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        bind_addr = %cfg.bind_addr,
        storage = if cfg.database_url.is_some() { "postgres" } else { "memory" },
        migrate_on_startup = cfg.migrate_on_startup,
        max_batch_items = cfg.max_batch_items,
        item_delay_ms = cfg.item_delay_ms,
        retention_secs = cfg.retention_secs,
        "enrollflow server starting",
    );

    let store: Arc<dyn ProgressStore> = match &cfg.database_url {
        Some(url) => {
            let pool = db::make_pool(url).await?;
            if cfg.migrate_on_startup {
                db::run_migrations(&pool).await?;
            }
            Arc::new(PgProgressRepo::new(pool))
        }
        None => Arc::new(MemoryProgressStore::new()),
    };

    let processor = BatchProcessor::new(
        store.clone(),
        Arc::new(RosterHandler::new()),
        cfg.processor(),
    );

    // ---- API task ----
    let app = api::router(api::ApiState {
        store: store.clone(),
        processor,
        max_batch_items: cfg.max_batch_items,
    });
    let bind_addr = cfg.bind_addr.clone();
    let api_handle = tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        tracing::info!("api listening on http://{bind_addr}");
        axum::serve(listener, app).await?;
        Ok::<(), anyhow::Error>(())
    });

    // ---- Maintenance task ----
    let maintenance_handle = {
        let store = store.clone();
        let retention = chrono::Duration::seconds(cfg.retention_secs.max(0));
        let every = Duration::from_secs(cfg.maintenance_interval_secs.max(1));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(every).await;

                let cutoff = chrono::Utc::now() - retention;
                match store.prune_finished_before(cutoff).await {
                    Ok(n) if n > 0 => tracing::info!(pruned = n, "pruned finished jobs"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "prune failed"),
                }
            }
            #[allow(unreachable_code)]
            Ok::<(), anyhow::Error>(())
        })
    };

    tokio::select! {
        res = api_handle => res??,
        res = maintenance_handle => res??,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    Ok(())
}
