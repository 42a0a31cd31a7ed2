use std::time::SystemTime;

use bytes::Bytes;
use energy_client::domain::EnrichedReading;
use time::OffsetDateTime;

pub mod orchestrator;
pub mod report;
pub mod retry;

pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use report::{FileOutcome, FileReport, InvocationReport, InvocationStatus, ReadingOutcome, ReadingReport};
pub use retry::{RetryPolicy, RetryableError};

/// A parsed item together with where and when it entered the pipeline.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    /// 1-based line number inside the batch file.
    pub line: usize,
    pub received_at: SystemTime,
}

/// Reference to one arrived batch file.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BatchRef {
    /// Bucket for S3, directory for the local backend.
    pub location: String,
    pub key: String,
}

impl BatchRef {
    pub fn new(location: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            key: key.into(),
        }
    }
}

/// One batch-arrival notification; drives exactly one orchestrator invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchArrivalEvent {
    pub files: Vec<BatchRef>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("object not found: {location}/{key}")]
    NotFound { location: String, key: String },
    #[error("transient fetch error: {0}")]
    Transient(String),
    #[error("fetch rejected: {0}")]
    Rejected(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed record on line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("incomplete record on line {line}: missing {field}")]
    Incomplete { line: usize, field: &'static str },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            Self::Malformed { line, .. } | Self::Incomplete { line, .. } => *line,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Throttling, connectivity or timeout.
    #[error("transient store error: {0}")]
    Transient(String),
    /// The store permanently rejected the item or request.
    #[error("store rejected request: {0}")]
    Fatal(String),
    #[error("unexpected store error: {0}")]
    Unexpected(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AlertError {
    #[error("transient alert error: {0}")]
    Transient(String),
    #[error("alert rejected: {0}")]
    Rejected(String),
}

/// Byte-fetch interface over object storage.
#[async_trait::async_trait]
pub trait ObjectFetcher: Send + Sync {
    async fn fetch(&self, location: &str, key: &str) -> Result<Bytes, FetchError>;
}

/// Keyed reading store. `upsert` overwrites any existing item with the same
/// `(site_id, timestamp)`; query results are empty vectors when nothing matches.
#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync {
    async fn upsert(&self, reading: &EnrichedReading) -> Result<(), StoreError>;

    async fn query_range(
        &self,
        site_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<EnrichedReading>, StoreError>;

    async fn query_anomalies(&self, site_id: &str) -> Result<Vec<EnrichedReading>, StoreError>;

    async fn scan_net_negative(&self) -> Result<Vec<EnrichedReading>, StoreError>;
}

/// Alert channel.
#[async_trait::async_trait]
pub trait AlertPublisher: Send + Sync {
    async fn publish(&self, subject: &str, message: &str) -> Result<(), AlertError>;
}
