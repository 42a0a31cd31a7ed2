use std::{sync::Arc, time::Duration};

use energy_client::domain::EnrichedReading;
use reqwest::{Client, StatusCode};
use time::format_description::well_known::Rfc3339;

use crate::config::AlertsConfig;
use crate::pipeline::{AlertError, AlertPublisher, RetryPolicy};

pub const DEFAULT_ALERT_SUBJECT: &str = "Anomaly Alert";

/// Human-readable alert body for one anomalous reading.
pub fn format_alert_message(r: &EnrichedReading) -> String {
    let ts = r.timestamp.format(&Rfc3339).unwrap_or_else(|_| r.timestamp.to_string());
    format!(
        "!!! Energy Anomaly Detected!!!\n\
         site_id: {}\n\
         timestamp: {}\n\
         energy_generated_kwh: {:?}\n\
         energy_consumed_kwh: {:?}",
        r.site_id, ts, r.energy_generated_kwh, r.energy_consumed_kwh
    )
}

/// Best-effort alerting for anomalous readings.
///
/// Delivery is at-least-once per processed reading: a redelivered batch
/// alerts again for every anomalous line it contains.
#[derive(Clone)]
pub struct AlertDispatcher {
    publisher: Arc<dyn AlertPublisher>,
    subject: String,
    retry: RetryPolicy,
}

impl AlertDispatcher {
    pub fn new(publisher: Arc<dyn AlertPublisher>, subject: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            publisher,
            subject: subject.into(),
            retry,
        }
    }

    pub async fn dispatch(&self, reading: &EnrichedReading) -> Result<(), AlertError> {
        let message = format_alert_message(reading);
        let res = self
            .retry
            .run("alert_publish", || self.publisher.publish(&self.subject, &message))
            .await;

        match &res {
            Ok(()) => metrics::counter!("alerts_dispatched_total").increment(1),
            Err(e) => {
                tracing::warn!(error = %e, site_id = %reading.site_id, "alert dispatch failed");
                metrics::counter!("alerts_failed_total").increment(1);
            }
        }

        res
    }
}

#[derive(serde::Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    message: &'a str,
}

/// Publishes alerts as a JSON POST to an HTTP webhook.
pub struct WebhookAlertPublisher {
    client: Client,
    url: String,
    bearer_token: Option<String>,
}

impl WebhookAlertPublisher {
    pub fn new(url: impl Into<String>, bearer_token: Option<String>, timeout: Duration) -> Result<Self, AlertError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AlertError::Rejected(format!("failed to build webhook client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            bearer_token,
        })
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT
}

#[async_trait::async_trait]
impl AlertPublisher for WebhookAlertPublisher {
    async fn publish(&self, subject: &str, message: &str) -> Result<(), AlertError> {
        let mut req = self.client.post(&self.url).json(&WebhookPayload { subject, message });
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| AlertError::Transient(format!("alert webhook unreachable: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else if is_retryable_status(status) {
            Err(AlertError::Transient(format!("alert webhook responded {status}")))
        } else {
            Err(AlertError::Rejected(format!("alert webhook responded {status}")))
        }
    }
}

/// Writes alerts to the log; used when no webhook is configured.
#[derive(Default)]
pub struct TracingAlertPublisher;

#[async_trait::async_trait]
impl AlertPublisher for TracingAlertPublisher {
    async fn publish(&self, subject: &str, message: &str) -> Result<(), AlertError> {
        tracing::warn!(subject, "{message}");
        Ok(())
    }
}

/// Webhook publisher when a URL is configured, log-only publisher otherwise.
pub fn publisher_from_config(cfg: &AlertsConfig, timeout: Duration) -> Result<Arc<dyn AlertPublisher>, AlertError> {
    match &cfg.webhook_url {
        Some(url) => Ok(Arc::new(WebhookAlertPublisher::new(
            url.clone(),
            cfg.bearer_token.clone(),
            timeout,
        )?)),
        None => {
            tracing::warn!("alerts.webhook_url not set, anomaly alerts will only be logged");
            Ok(Arc::new(TracingAlertPublisher))
        }
    }
}
