pub mod api;
pub mod config;
pub mod generator;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use pipeline::{BatchArrivalEvent, BatchRef, InvocationReport, InvocationStatus, Orchestrator};
