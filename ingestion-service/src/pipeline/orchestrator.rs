use std::{sync::Arc, time::Instant};

use energy_client::domain::Reading;
use futures::StreamExt;
use tokio::sync::Semaphore;

use super::{
    BatchArrivalEvent, BatchRef, Envelope, FileOutcome, FileReport, InvocationReport, ObjectFetcher, ReadingOutcome,
    ReadingReport, RetryPolicy,
};
use crate::{
    sinks::{AlertDispatcher, StoreWriter},
    sources::parse_batch,
    transform::enrich,
};

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    /// Files of one event processed at the same time.
    pub max_concurrent_files: usize,
    /// Upper bound on concurrent fetch / write / dispatch calls per invocation.
    pub max_in_flight: usize,
    pub fetch_retry: RetryPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_files: 4,
            max_in_flight: 8,
            fetch_retry: RetryPolicy::default(),
        }
    }
}

/// Runs one batch-arrival event through fetch, parse, enrich, write and alert.
///
/// Failures stay inside their scope: a file that cannot be fetched or parsed
/// does not stop the other files, and a failed write does not stop the rest
/// of its file. Readings of one file are handled in line order so that
/// repeated keys inside a file resolve to the last line.
///
/// The orchestrator holds no state between invocations, so concurrent and
/// repeated invocations for the same file are safe for the store (upsert by
/// key). Alerts are not deduplicated: every invocation alerts for every
/// anomalous reading it writes.
pub struct Orchestrator {
    fetcher: Arc<dyn ObjectFetcher>,
    writer: StoreWriter,
    alerts: AlertDispatcher,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<dyn ObjectFetcher>,
        writer: StoreWriter,
        alerts: AlertDispatcher,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            fetcher,
            writer,
            alerts,
            settings,
        }
    }

    pub async fn run(&self, event: BatchArrivalEvent) -> InvocationReport {
        let started = Instant::now();
        let permits = Semaphore::new(self.settings.max_in_flight.max(1));

        let files: Vec<FileReport> = futures::stream::iter(event.files)
            .map(|file| self.process_file(file, &permits))
            .buffered(self.settings.max_concurrent_files.max(1))
            .collect()
            .await;

        let report = InvocationReport::from_files(files);

        metrics::counter!("batch_invocations_total", "status" => report.status.as_str()).increment(1);
        metrics::histogram!("batch_invocation_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            status = report.status.as_str(),
            files = report.files.len(),
            readings_written = report.readings_written,
            readings_failed = report.readings_failed,
            alerts_dispatched = report.alerts_dispatched,
            alerts_failed = report.alerts_failed,
            "batch invocation finished"
        );

        report
    }

    async fn process_file(&self, file: BatchRef, permits: &Semaphore) -> FileReport {
        let fetched = {
            let _permit = permits.acquire().await.ok();
            self.settings
                .fetch_retry
                .run("object_fetch", || self.fetcher.fetch(&file.location, &file.key))
                .await
        };

        let body = match fetched {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, location = %file.location, key = %file.key, "batch fetch failed");
                metrics::counter!("batch_fetch_failures_total").increment(1);
                return file_report(file, FileOutcome::FetchFailed { reason: e.to_string() });
            }
        };

        let readings = match parse_batch(&body) {
            Ok(readings) => readings,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    line = e.line(),
                    location = %file.location,
                    key = %file.key,
                    "batch parse failed, skipping file"
                );
                return file_report(file, FileOutcome::ParseFailed { reason: e.to_string() });
            }
        };

        tracing::debug!(key = %file.key, readings = readings.len(), "batch parsed");

        let mut reports = Vec::with_capacity(readings.len());
        for env in readings {
            reports.push(self.process_reading(env, permits).await);
        }

        file_report(file, FileOutcome::Processed { readings: reports })
    }

    async fn process_reading(&self, env: Envelope<Reading>, permits: &Semaphore) -> ReadingReport {
        let Envelope {
            payload,
            line,
            received_at,
        } = env;
        let enriched = enrich(payload);

        let _permit = permits.acquire().await.ok();
        let outcome = match self.writer.write(&enriched, received_at).await {
            Err(e) => ReadingOutcome::WriteFailed { reason: e.to_string() },
            Ok(()) if !enriched.anomaly => ReadingOutcome::Written { alerted: false },
            Ok(()) => {
                metrics::counter!("anomalies_detected_total").increment(1);
                match self.alerts.dispatch(&enriched).await {
                    Ok(()) => ReadingOutcome::Written { alerted: true },
                    Err(e) => ReadingOutcome::AlertFailed { reason: e.to_string() },
                }
            }
        };

        ReadingReport {
            line,
            site_id: enriched.site_id,
            timestamp: enriched.timestamp,
            outcome,
        }
    }
}

fn file_report(file: BatchRef, outcome: FileOutcome) -> FileReport {
    FileReport {
        location: file.location,
        key: file.key,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{AlertError, AlertPublisher, FetchError, InvocationStatus};
    use crate::sinks::InMemoryReadingStore;
    use bytes::Bytes;
    use std::{collections::HashMap, sync::Mutex, time::Duration};

    struct MapFetcher(HashMap<String, Result<&'static str, FetchError>>);

    #[async_trait::async_trait]
    impl ObjectFetcher for MapFetcher {
        async fn fetch(&self, location: &str, key: &str) -> Result<Bytes, FetchError> {
            match self.0.get(key) {
                Some(Ok(body)) => Ok(Bytes::from_static(body.as_bytes())),
                Some(Err(e)) => Err(e.clone()),
                None => Err(FetchError::NotFound {
                    location: location.to_string(),
                    key: key.to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct CountingPublisher {
        sent: Mutex<usize>,
    }

    #[async_trait::async_trait]
    impl AlertPublisher for CountingPublisher {
        async fn publish(&self, _subject: &str, _message: &str) -> Result<(), AlertError> {
            *self.sent.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(1, Duration::from_millis(1), Duration::from_secs(1))
    }

    fn orchestrator(
        files: Vec<(&str, Result<&'static str, FetchError>)>,
    ) -> (Orchestrator, Arc<InMemoryReadingStore>, Arc<CountingPublisher>) {
        let store = Arc::new(InMemoryReadingStore::new());
        let publisher = Arc::new(CountingPublisher::default());
        let fetcher = MapFetcher(files.into_iter().map(|(k, v)| (k.to_string(), v)).collect());
        let settings = OrchestratorSettings {
            fetch_retry: policy(),
            ..OrchestratorSettings::default()
        };
        let orch = Orchestrator::new(
            Arc::new(fetcher),
            StoreWriter::new(store.clone(), policy()),
            AlertDispatcher::new(publisher.clone(), "Anomaly Alert", policy()),
            settings,
        );
        (orch, store, publisher)
    }

    fn event(keys: &[&str]) -> BatchArrivalEvent {
        BatchArrivalEvent {
            files: keys.iter().map(|k| BatchRef::new("bucket", *k)).collect(),
        }
    }

    const LINE_A: &str = r#"{"site_id":"a","timestamp":"2025-01-01T00:00:00Z","energy_generated_kwh":1.0,"energy_consumed_kwh":2.0}"#;

    #[tokio::test]
    async fn failures_are_scoped_to_their_file() {
        let (orch, store, _) = orchestrator(vec![
            ("good.json", Ok(LINE_A)),
            ("bad.json", Ok("{not json")),
            ("flaky.json", Err(FetchError::Transient("reset".to_string()))),
        ]);

        let report = orch.run(event(&["good.json", "bad.json", "flaky.json", "missing.json"])).await;

        assert_eq!(report.status, InvocationStatus::PartiallyFailed);
        assert_eq!(store.len().await, 1);
        let kinds: Vec<_> = report
            .files
            .iter()
            .map(|f| match &f.outcome {
                FileOutcome::Processed { .. } => "processed",
                FileOutcome::ParseFailed { .. } => "parse_failed",
                FileOutcome::FetchFailed { .. } => "fetch_failed",
            })
            .collect();
        assert_eq!(kinds, ["processed", "parse_failed", "fetch_failed", "fetch_failed"]);
    }

    #[tokio::test]
    async fn duplicate_keys_in_one_file_resolve_to_last_line() {
        let body: &'static str = concat!(
            r#"{"site_id":"a","timestamp":"2025-01-01T00:00:00Z","energy_generated_kwh":1.0,"energy_consumed_kwh":2.0}"#,
            "\n",
            r#"{"site_id":"a","timestamp":"2025-01-01T00:00:00Z","energy_generated_kwh":9.0,"energy_consumed_kwh":2.0}"#,
        );
        let (orch, store, _) = orchestrator(vec![("dup.json", Ok(body))]);

        let report = orch.run(event(&["dup.json"])).await;

        assert_eq!(report.status, InvocationStatus::Completed);
        let items = store.snapshot().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].net_energy_kwh, 7.0);
    }

    #[tokio::test]
    async fn event_without_files_completes_with_nothing_written() {
        let (orch, store, publisher) = orchestrator(vec![]);
        let report = orch.run(BatchArrivalEvent::default()).await;

        assert_eq!(report.status, InvocationStatus::Completed);
        assert!(store.is_empty().await);
        assert_eq!(*publisher.sent.lock().unwrap(), 0);
    }
}
