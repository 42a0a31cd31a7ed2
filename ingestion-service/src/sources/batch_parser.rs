use std::time::SystemTime;

use energy_client::domain::{DomainError, Reading, SiteKey};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::pipeline::{Envelope, ParseError};

/// Wire shape of one NDJSON line. Every field is optional here so that a
/// missing field is reported as incomplete rather than as a decode failure.
#[derive(serde::Deserialize)]
struct BatchLine {
    site_id: Option<String>,
    timestamp: Option<String>,
    energy_generated_kwh: Option<f64>,
    energy_consumed_kwh: Option<f64>,
}

/// Parses one batch file body (one JSON record per line) into readings in
/// line order.
///
/// Blank lines are ignored. The first malformed or incomplete line fails the
/// whole file: no readings are returned for it.
pub fn parse_batch(body: &[u8]) -> Result<Vec<Envelope<Reading>>, ParseError> {
    let text = std::str::from_utf8(body).map_err(|e| {
        metrics::counter!("batch_parse_errors_total").increment(1);
        let line = body[..e.valid_up_to()].iter().filter(|b| **b == b'\n').count() + 1;
        ParseError::Malformed {
            line,
            reason: format!("invalid utf-8: {e}"),
        }
    })?;

    let received_at = SystemTime::now();
    let mut readings = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }

        let reading = match parse_line(raw, line) {
            Ok(r) => r,
            Err(e) => {
                metrics::counter!("batch_parse_errors_total").increment(1);
                return Err(e);
            }
        };

        readings.push(Envelope {
            payload: reading,
            line,
            received_at,
        });
    }

    Ok(readings)
}

fn parse_line(raw: &str, line: usize) -> Result<Reading, ParseError> {
    let malformed = |reason: String| ParseError::Malformed { line, reason };

    // Records must be JSON objects.
    let fields = match serde_json::from_str::<serde_json::Value>(raw).map_err(|e| malformed(e.to_string()))? {
        serde_json::Value::Object(fields) => fields,
        other => return Err(malformed(format!("expected a JSON object, found {}", json_kind(&other)))),
    };
    let parsed: BatchLine =
        serde_json::from_value(serde_json::Value::Object(fields)).map_err(|e| malformed(e.to_string()))?;

    let site_id = parsed
        .site_id
        .ok_or(ParseError::Incomplete { line, field: "site_id" })?;
    let ts = parsed
        .timestamp
        .ok_or(ParseError::Incomplete { line, field: "timestamp" })?;
    let energy_generated_kwh = parsed.energy_generated_kwh.ok_or(ParseError::Incomplete {
        line,
        field: "energy_generated_kwh",
    })?;
    let energy_consumed_kwh = parsed.energy_consumed_kwh.ok_or(ParseError::Incomplete {
        line,
        field: "energy_consumed_kwh",
    })?;

    let timestamp = OffsetDateTime::parse(ts.trim(), &Rfc3339).map_err(|e| ParseError::Malformed {
        line,
        reason: format!("invalid timestamp '{ts}': {e}"),
    })?;

    let key = SiteKey::new(site_id, timestamp).map_err(|e| match e {
        DomainError::EmptySiteId => ParseError::Incomplete { line, field: "site_id" },
    })?;

    Ok(Reading {
        site_id: key.site_id,
        timestamp: key.timestamp,
        energy_generated_kwh,
        energy_consumed_kwh,
    })
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
