use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub log_level: Option<String>,
    pub pg_dump_path: Option<String>,

    // Feature configs
    pub scheduler: Option<SchedulerConfig>,
    pub event_bus: Option<EventBusConfig>,
    pub webhooks: Option<WebhooksConfig>,

    // Collaborators
    pub databases: Vec<DatabaseConfig>,
    pub destinations: Vec<DestinationConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_idle_secs: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EventBusConfig {
    pub capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct WebhooksConfig {
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub max_retry_window_secs: Option<u64>,
    pub max_concurrent_deliveries: Option<usize>,
    pub max_pending_deliveries: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
}

/// A source database reachable by the dumper.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub id: Uuid,
    pub name: String,
    pub connection_url: String,
}

/// A local directory backups can be written into.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DestinationConfig {
    pub id: Uuid,
    pub name: String,
    pub path: String,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
