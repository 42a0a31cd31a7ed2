use anyhow::{bail, Result};
use ingestion_service::{
    config::AppConfig,
    observability,
    pipeline::{BatchArrivalEvent, BatchRef, Orchestrator, ReadingStore},
    sinks::{alerts, AlertDispatcher, PgReadingStore, StoreWriter},
    sources::ObjectStoreFetcher,
    InvocationStatus,
};
use sqlx::postgres::PgPoolOptions;
use std::{env, sync::Arc, time::Duration};

/// Runs one batch-arrival invocation for the given files and prints the report.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: ingest_batch <location> <key> [<key>...]");
    }
    let location = &args[1];
    let event = BatchArrivalEvent {
        files: args[2..].iter().map(|key| BatchRef::new(location.as_str(), key.as_str())).collect(),
    };

    // Load configuration (can point INGESTION_CONFIG to a one-off file).
    let cfg = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.store.max_connections)
        .acquire_timeout(Duration::from_millis(cfg.ingest.write_timeout_ms))
        .connect(&cfg.store.uri)
        .await?;
    let store: Arc<dyn ReadingStore> = Arc::new(PgReadingStore::new(pool));

    let publisher = alerts::publisher_from_config(&cfg.alerts, Duration::from_millis(cfg.ingest.alert_timeout_ms))?;
    let orchestrator = Orchestrator::new(
        Arc::new(ObjectStoreFetcher::new(cfg.object_backend()?)),
        StoreWriter::new(store, cfg.ingest.write_retry()),
        AlertDispatcher::new(publisher, cfg.alerts.subject.clone(), cfg.ingest.alert_retry()),
        cfg.ingest.orchestrator_settings(),
    );

    let report = orchestrator.run(event).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.status == InvocationStatus::Failed {
        bail!("batch invocation failed");
    }
    Ok(())
}
