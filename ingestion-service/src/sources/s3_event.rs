use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use crate::pipeline::{BatchArrivalEvent, BatchRef, InvocationReport, InvocationStatus, Orchestrator};

/// S3 event notification body (`s3:ObjectCreated:*`), reduced to the fields we use.
#[derive(Debug, serde::Deserialize)]
pub struct S3EventNotification {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, serde::Deserialize)]
pub struct S3EventRecord {
    pub s3: S3Entity,
}

#[derive(Debug, serde::Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, serde::Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct S3Object {
    pub key: String,
}

/// S3 form-encodes object keys in notifications: `+` is a space and other
/// reserved bytes are percent-encoded.
pub fn decode_object_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

impl From<S3EventNotification> for BatchArrivalEvent {
    fn from(n: S3EventNotification) -> Self {
        let files = n
            .records
            .into_iter()
            .map(|r| BatchRef::new(r.s3.bucket.name, decode_object_key(&r.s3.object.key)))
            .collect();
        BatchArrivalEvent { files }
    }
}

/// Router for the batch-arrival trigger. Each request is one invocation.
pub fn trigger_router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/events/batch-arrival", post(batch_arrival))
        .with_state(orchestrator)
}

fn status_for(status: InvocationStatus) -> StatusCode {
    match status {
        InvocationStatus::Completed => StatusCode::OK,
        InvocationStatus::PartiallyFailed => StatusCode::MULTI_STATUS,
        // Non-2xx lets the transport redeliver the whole event.
        InvocationStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn batch_arrival(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(notification): Json<S3EventNotification>,
) -> Result<(StatusCode, Json<InvocationReport>), (StatusCode, String)> {
    metrics::counter!("batch_arrival_events_total").increment(1);

    if notification.records.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "event carries no Records".to_string()));
    }

    let report = orchestrator.run(notification.into()).await;
    Ok((status_for(report.status), Json(report)))
}
