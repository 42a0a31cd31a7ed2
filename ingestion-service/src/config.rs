use serde::Deserialize;
use std::{fs, path::PathBuf, time::Duration};

use crate::pipeline::{OrchestratorSettings, RetryPolicy};
use crate::sources::ObjectBackend;

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub uri: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStoreKind {
    S3,
    Local,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStoreConfig {
    pub kind: ObjectStoreKind,
    /// Root directory for `kind = "local"`; each location is a subdirectory.
    pub local_root: Option<PathBuf>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub alert_timeout_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_concurrent_files: default_max_concurrent_files(),
            max_in_flight: default_max_in_flight(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            fetch_timeout_ms: default_timeout_ms(),
            write_timeout_ms: default_timeout_ms(),
            alert_timeout_ms: default_timeout_ms(),
        }
    }
}

impl IngestConfig {
    fn retry(&self, timeout_ms: u64) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_backoff_ms),
            Duration::from_millis(timeout_ms),
        )
    }

    pub fn fetch_retry(&self) -> RetryPolicy {
        self.retry(self.fetch_timeout_ms)
    }

    pub fn write_retry(&self) -> RetryPolicy {
        self.retry(self.write_timeout_ms)
    }

    pub fn alert_retry(&self) -> RetryPolicy {
        self.retry(self.alert_timeout_ms)
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            max_concurrent_files: self.max_concurrent_files,
            max_in_flight: self.max_in_flight,
            fetch_retry: self.fetch_retry(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    /// When unset, alerts are only written to the log.
    pub webhook_url: Option<String>,
    pub bearer_token: Option<String>,
    #[serde(default = "default_alert_subject")]
    pub subject: String,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            bearer_token: None,
            subject: default_alert_subject(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub object_store: ObjectStoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    pub api: ApiConfig,
    pub metrics: Option<MetricsConfig>,
}

fn default_max_connections() -> u32 {
    8
}

fn default_max_concurrent_files() -> usize {
    4
}

fn default_max_in_flight() -> usize {
    8
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_alert_subject() -> String {
    crate::sinks::DEFAULT_ALERT_SUBJECT.to_string()
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("INGESTION_CONFIG").unwrap_or_else(|_| "ingestion-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config file '{path}': {e}"))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn object_backend(&self) -> anyhow::Result<ObjectBackend> {
        let os = &self.object_store;
        Ok(match os.kind {
            ObjectStoreKind::S3 => ObjectBackend::S3 {
                region: os.region.clone(),
                endpoint: os.endpoint.clone(),
                allow_http: os.allow_http,
            },
            ObjectStoreKind::Local => ObjectBackend::Local {
                root: os
                    .local_root
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("object_store.local_root is required when kind = \"local\""))?,
            },
        })
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.store.uri.trim().is_empty() {
            anyhow::bail!("store.uri must not be empty");
        }
        if self.ingest.max_concurrent_files == 0 || self.ingest.max_in_flight == 0 {
            anyhow::bail!("ingest.max_concurrent_files and ingest.max_in_flight must be positive");
        }
        if self.object_store.kind == ObjectStoreKind::Local && self.object_store.local_root.is_none() {
            anyhow::bail!("object_store.local_root is required when kind = \"local\"");
        }
        Ok(())
    }
}
