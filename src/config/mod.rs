mod file_config;

pub use file_config::{
    DatabaseConfig, DestinationConfig, EventBusConfig, FileConfig, SchedulerConfig,
    WebhooksConfig,
};

use anyhow::{bail, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_path: PathBuf,
    pub log_level: Option<String>,
    pub pg_dump_path: String,

    // Feature configs (with defaults)
    pub scheduler: SchedulerSettings,
    pub event_bus: EventBusSettings,
    pub webhooks: WebhookSettings,

    pub databases: Vec<DatabaseConfig>,
    pub destinations: Vec<DestinationConfig>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let log_level = file.log_level.or_else(|| cli.log_level.clone());
        let pg_dump_path = file.pg_dump_path.unwrap_or_else(|| "pg_dump".to_string());

        let scheduler_file = file.scheduler.unwrap_or_default();
        let defaults = SchedulerSettings::default();
        let scheduler = SchedulerSettings {
            max_idle: scheduler_file
                .max_idle_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_idle),
            shutdown_grace: scheduler_file
                .shutdown_grace_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_grace),
        };

        let event_bus = EventBusSettings {
            capacity: file
                .event_bus
                .and_then(|e| e.capacity)
                .unwrap_or(EventBusSettings::default().capacity),
        };

        // Webhook settings - merge file config with defaults
        let wh_file = file.webhooks.unwrap_or_default();
        let defaults = WebhookSettings::default();
        let webhooks = WebhookSettings {
            max_attempts: wh_file.max_attempts.unwrap_or(defaults.max_attempts),
            initial_backoff: wh_file
                .initial_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_backoff),
            max_backoff: wh_file
                .max_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_backoff),
            backoff_multiplier: wh_file
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
            max_retry_window: wh_file
                .max_retry_window_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_retry_window),
            max_concurrent_deliveries: wh_file
                .max_concurrent_deliveries
                .unwrap_or(defaults.max_concurrent_deliveries),
            max_pending_deliveries: wh_file
                .max_pending_deliveries
                .unwrap_or(defaults.max_pending_deliveries),
            request_timeout: wh_file
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            shutdown_grace: wh_file
                .shutdown_grace_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_grace),
        };

        let config = Self {
            db_path,
            log_level,
            pg_dump_path,
            scheduler,
            event_bus,
            webhooks,
            databases: file.databases,
            destinations: file.destinations,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scheduler.max_idle.is_zero() {
            bail!("scheduler.max_idle_secs must be greater than 0");
        }
        if self.event_bus.capacity == 0 {
            bail!("event_bus.capacity must be greater than 0");
        }
        self.webhooks.validate()?;

        let mut seen = HashSet::new();
        for db in &self.databases {
            if !seen.insert(db.id) {
                bail!("Duplicate database id {}", db.id);
            }
        }
        let mut seen = HashSet::new();
        for dest in &self.destinations {
            if !seen.insert(dest.id) {
                bail!("Duplicate destination id {}", dest.id);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Upper bound for one scheduler sleep, so edits are picked up even if no
    /// command arrives.
    pub max_idle: Duration,
    /// How long shutdown waits for cancelled runs to record their outcome.
    pub shutdown_grace: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_idle: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBusSettings {
    pub capacity: usize,
}

impl Default for EventBusSettings {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Total wall-clock budget for one delivery including all retries.
    pub max_retry_window: Duration,
    pub max_concurrent_deliveries: usize,
    pub max_pending_deliveries: usize,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl WebhookSettings {
    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            bail!("webhooks.max_attempts must be greater than 0");
        }
        if self.backoff_multiplier < 1.0 {
            bail!("webhooks.backoff_multiplier must be at least 1.0");
        }
        if self.max_concurrent_deliveries == 0 || self.max_pending_deliveries == 0 {
            bail!("webhooks delivery limits must be greater than 0");
        }
        if self.request_timeout.is_zero() {
            bail!("webhooks.request_timeout_secs must be greater than 0");
        }
        Ok(())
    }
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(60_000),
            backoff_multiplier: 2.0,
            max_retry_window: Duration::from_secs(600),
            max_concurrent_deliveries: 16,
            max_pending_deliveries: 1024,
            request_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}
