use std::net::SocketAddr;

use anyhow::Context;
use axum::{extract::State, routing::get, Router};
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

fn describe_metrics() {
    describe_counter!("batch_arrival_events_total", "Batch-arrival notifications received over HTTP");
    describe_counter!("batch_invocations_total", "Batch-arrival invocations by terminal status");
    describe_counter!("batch_fetch_failures_total", "Batch files that could not be fetched");
    describe_counter!("batch_fetched_bytes_total", Unit::Bytes, "Bytes read from object storage");
    describe_counter!("batch_parse_errors_total", "Batch files rejected by the parser");
    describe_counter!("readings_written_total", "Readings upserted into the store");
    describe_counter!("readings_write_failed_total", "Readings whose store write failed");
    describe_counter!("anomalies_detected_total", "Anomalous readings written");
    describe_counter!("alerts_dispatched_total", "Anomaly alerts delivered");
    describe_counter!("alerts_failed_total", "Anomaly alerts that could not be delivered");
    describe_counter!("retry_attempts_total", "Retried fetch, write and publish attempts");
    describe_counter!("read_api_requests_total", "Read API requests by route");
    describe_histogram!(
        "batch_invocation_duration_seconds",
        Unit::Seconds,
        "Wall time of one batch-arrival invocation"
    );
    describe_histogram!(
        "ingest_end_to_end_latency_seconds",
        Unit::Seconds,
        "Time from parsing a reading to its successful store write"
    );
}

/// Installs the Prometheus recorder and serves `/metrics` on `bind_addr`.
pub fn init(bind_addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .with_context(|| format!("invalid metrics bind address '{bind_addr}'"))?;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus metrics recorder")?;

    describe_metrics();

    tokio::spawn(async move {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(handle);

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    tracing::error!(error = %e, "metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to bind metrics listener");
            }
        }
    });

    Ok(())
}

async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
