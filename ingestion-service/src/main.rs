use anyhow::Result;
use ingestion_service::{
    api,
    config::AppConfig,
    metrics_server,
    observability,
    pipeline::{Orchestrator, ReadingStore},
    sinks::{alerts, AlertDispatcher, PgReadingStore, StoreWriter},
    sources::{trigger_router, ObjectStoreFetcher},
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let pool = PgPoolOptions::new()
        .max_connections(cfg.store.max_connections)
        .acquire_timeout(Duration::from_millis(cfg.ingest.write_timeout_ms))
        .connect(&cfg.store.uri)
        .await?;
    let store: Arc<dyn ReadingStore> = Arc::new(PgReadingStore::new(pool));

    let fetcher = ObjectStoreFetcher::new(cfg.object_backend()?);
    let publisher = alerts::publisher_from_config(&cfg.alerts, Duration::from_millis(cfg.ingest.alert_timeout_ms))?;
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(fetcher),
        StoreWriter::new(store.clone(), cfg.ingest.write_retry()),
        AlertDispatcher::new(publisher, cfg.alerts.subject.clone(), cfg.ingest.alert_retry()),
        cfg.ingest.orchestrator_settings(),
    ));

    let app = api::router(store).merge(trigger_router(orchestrator));

    let addr: SocketAddr = cfg
        .api
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid api.bind_addr: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "serving read api and batch-arrival trigger");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
