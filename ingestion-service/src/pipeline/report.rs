use serde::Serialize;
use time::OffsetDateTime;

/// Terminal state of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Completed,
    PartiallyFailed,
    Failed,
}

impl InvocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::PartiallyFailed => "partially_failed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReadingOutcome {
    Written { alerted: bool },
    /// Persisted, but the alert for it could not be delivered.
    AlertFailed { reason: String },
    WriteFailed { reason: String },
}

impl ReadingOutcome {
    pub fn is_written(&self) -> bool {
        !matches!(self, Self::WriteFailed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingReport {
    pub line: usize,
    pub site_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub outcome: ReadingOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileOutcome {
    FetchFailed { reason: String },
    ParseFailed { reason: String },
    Processed { readings: Vec<ReadingReport> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub location: String,
    pub key: String,
    pub outcome: FileOutcome,
}

impl FileReport {
    fn readings(&self) -> &[ReadingReport] {
        match &self.outcome {
            FileOutcome::Processed { readings } => readings,
            _ => &[],
        }
    }

    fn failures(&self) -> usize {
        match &self.outcome {
            FileOutcome::FetchFailed { .. } | FileOutcome::ParseFailed { .. } => 1,
            FileOutcome::Processed { readings } => readings.iter().filter(|r| !r.outcome.is_written()).count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationReport {
    pub status: InvocationStatus,
    pub readings_written: usize,
    pub readings_failed: usize,
    pub alerts_dispatched: usize,
    pub alerts_failed: usize,
    pub files: Vec<FileReport>,
}

impl InvocationReport {
    /// Classifies the invocation from its per-file outcomes.
    ///
    /// Alert failures never downgrade the status. An invocation with no
    /// failures is `Completed` even when it wrote nothing (empty batches).
    pub fn from_files(files: Vec<FileReport>) -> Self {
        let all_readings = || files.iter().flat_map(|f| f.readings());

        let readings_written = all_readings().filter(|r| r.outcome.is_written()).count();
        let readings_failed = all_readings().filter(|r| !r.outcome.is_written()).count();
        let alerts_dispatched = all_readings()
            .filter(|r| matches!(r.outcome, ReadingOutcome::Written { alerted: true }))
            .count();
        let alerts_failed = all_readings()
            .filter(|r| matches!(r.outcome, ReadingOutcome::AlertFailed { .. }))
            .count();
        let failures: usize = files.iter().map(FileReport::failures).sum();

        let status = match (failures, readings_written) {
            (0, _) => InvocationStatus::Completed,
            (_, 0) => InvocationStatus::Failed,
            _ => InvocationStatus::PartiallyFailed,
        };

        Self {
            status,
            readings_written,
            readings_failed,
            alerts_dispatched,
            alerts_failed,
            files,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn reading(line: usize, outcome: ReadingOutcome) -> ReadingReport {
        ReadingReport {
            line,
            site_id: "site_id001".to_string(),
            timestamp: datetime!(2025-01-01 00:00:00 UTC),
            outcome,
        }
    }

    fn processed(readings: Vec<ReadingReport>) -> FileReport {
        FileReport {
            location: "bucket".to_string(),
            key: "a.json".to_string(),
            outcome: FileOutcome::Processed { readings },
        }
    }

    fn fetch_failed() -> FileReport {
        FileReport {
            location: "bucket".to_string(),
            key: "missing.json".to_string(),
            outcome: FileOutcome::FetchFailed {
                reason: "object not found".to_string(),
            },
        }
    }

    #[test]
    fn all_written_is_completed_even_with_alert_failures() {
        let report = InvocationReport::from_files(vec![processed(vec![
            reading(1, ReadingOutcome::Written { alerted: false }),
            reading(2, ReadingOutcome::AlertFailed { reason: "down".to_string() }),
        ])]);

        assert_eq!(report.status, InvocationStatus::Completed);
        assert_eq!(report.readings_written, 2);
        assert_eq!(report.alerts_failed, 1);
    }

    #[test]
    fn empty_batch_is_completed() {
        let report = InvocationReport::from_files(vec![processed(vec![])]);
        assert_eq!(report.status, InvocationStatus::Completed);
        assert_eq!(report.readings_written, 0);
    }

    #[test]
    fn mixed_outcomes_are_partially_failed() {
        let report = InvocationReport::from_files(vec![
            processed(vec![reading(1, ReadingOutcome::Written { alerted: true })]),
            fetch_failed(),
        ]);
        assert_eq!(report.status, InvocationStatus::PartiallyFailed);
        assert_eq!(report.alerts_dispatched, 1);
    }

    #[test]
    fn write_failure_alongside_success_is_partially_failed() {
        let report = InvocationReport::from_files(vec![processed(vec![
            reading(1, ReadingOutcome::Written { alerted: false }),
            reading(2, ReadingOutcome::WriteFailed { reason: "rejected".to_string() }),
        ])]);
        assert_eq!(report.status, InvocationStatus::PartiallyFailed);
        assert_eq!(report.readings_failed, 1);
    }

    #[test]
    fn nothing_written_with_failures_is_failed() {
        let report = InvocationReport::from_files(vec![
            fetch_failed(),
            processed(vec![reading(1, ReadingOutcome::WriteFailed { reason: "x".to_string() })]),
        ]);
        assert_eq!(report.status, InvocationStatus::Failed);
    }

    #[test]
    fn report_serializes_with_tagged_outcomes() {
        let report = InvocationReport::from_files(vec![fetch_failed()]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["files"][0]["outcome"]["kind"], "fetch_failed");
    }
}
