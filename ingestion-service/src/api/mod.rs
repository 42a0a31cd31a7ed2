//! Read-only HTTP surface over the reading store.

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::pipeline::ReadingStore;

pub mod error;
pub mod handlers;

pub use error::ApiError;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn ReadingStore>,
}

pub fn router(store: Arc<dyn ReadingStore>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/records/:site_id", get(handlers::get_records))
        .route("/anomalies/:site_id", get(handlers::get_anomalies))
        .route("/net_negative_energy", get(handlers::net_negative_energy))
        .with_state(ApiState { store })
}
