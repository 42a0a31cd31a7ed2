use std::{sync::Arc, time::SystemTime};

use energy_client::domain::EnrichedReading;

use crate::pipeline::{ReadingStore, RetryPolicy, StoreError};

/// Idempotent upsert of one enriched reading, with per-attempt timeout and
/// bounded retry of transient failures. Fatal and unexpected errors surface
/// on the first attempt.
#[derive(Clone)]
pub struct StoreWriter {
    store: Arc<dyn ReadingStore>,
    retry: RetryPolicy,
}

impl StoreWriter {
    pub fn new(store: Arc<dyn ReadingStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub async fn write(&self, reading: &EnrichedReading, received_at: SystemTime) -> Result<(), StoreError> {
        let res = self.retry.run("store_upsert", || self.store.upsert(reading)).await;

        match &res {
            Ok(()) => {
                metrics::counter!("readings_written_total").increment(1);
                if let Ok(dur) = SystemTime::now().duration_since(received_at) {
                    metrics::histogram!("ingest_end_to_end_latency_seconds").record(dur.as_secs_f64());
                }
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    site_id = %reading.site_id,
                    timestamp = %reading.timestamp,
                    "store write failed"
                );
                metrics::counter!("readings_write_failed_total").increment(1);
            }
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::InMemoryReadingStore;
    use crate::transform::enrich;
    use energy_client::domain::Reading;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use time::{macros::datetime, OffsetDateTime};

    /// Fails the first `failures` upserts with the given error, then delegates.
    struct FlakyStore {
        inner: InMemoryReadingStore,
        failures: AtomicU32,
        error: StoreError,
    }

    #[async_trait::async_trait]
    impl ReadingStore for FlakyStore {
        async fn upsert(&self, reading: &EnrichedReading) -> Result<(), StoreError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(self.error.clone());
            }
            self.inner.upsert(reading).await
        }

        async fn query_range(
            &self,
            site_id: &str,
            start: OffsetDateTime,
            end: OffsetDateTime,
        ) -> Result<Vec<EnrichedReading>, StoreError> {
            self.inner.query_range(site_id, start, end).await
        }

        async fn query_anomalies(&self, site_id: &str) -> Result<Vec<EnrichedReading>, StoreError> {
            self.inner.query_anomalies(site_id).await
        }

        async fn scan_net_negative(&self) -> Result<Vec<EnrichedReading>, StoreError> {
            self.inner.scan_net_negative().await
        }
    }

    fn reading() -> EnrichedReading {
        enrich(Reading {
            site_id: "site_id001".to_string(),
            timestamp: datetime!(2025-01-01 00:00:00 UTC),
            energy_generated_kwh: 50.0,
            energy_consumed_kwh: 20.0,
        })
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryReadingStore::new(),
            failures: AtomicU32::new(2),
            error: StoreError::Transient("throttled".to_string()),
        });
        let writer = StoreWriter::new(store.clone(), policy());

        writer.write(&reading(), SystemTime::now()).await.unwrap();
        assert_eq!(store.inner.len().await, 1);
    }

    #[tokio::test]
    async fn fatal_failure_is_surfaced_without_retry() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryReadingStore::new(),
            failures: AtomicU32::new(1),
            error: StoreError::Fatal("item too large".to_string()),
        });
        let writer = StoreWriter::new(store.clone(), policy());

        let err = writer.write(&reading(), SystemTime::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::Fatal(_)));
        assert!(store.inner.is_empty().await);
    }
}
