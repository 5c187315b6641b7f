//! A started engine over a temporary database with fast timings.

use super::fakes::{FakeDumper, MemoryDestination};
use backup_engine::config::{EventBusSettings, SchedulerSettings, WebhookSettings};
use backup_engine::store::{BackupJob, BackupJobParams, Execution, ExecutionStore};
use backup_engine::webhooks::ReqwestWebhookClient;
use backup_engine::{BackupEngine, EngineComponents, EngineRuntime, EngineSettings, SqliteStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        scheduler: SchedulerSettings {
            max_idle: Duration::from_millis(50),
            shutdown_grace: Duration::from_secs(5),
        },
        event_bus: EventBusSettings { capacity: 64 },
        webhooks: WebhookSettings {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            max_retry_window: Duration::from_secs(10),
            max_concurrent_deliveries: 4,
            max_pending_deliveries: 64,
            request_timeout: Duration::from_secs(2),
            shutdown_grace: Duration::from_secs(2),
        },
    }
}

pub struct TestEngine {
    pub store: Arc<SqliteStore>,
    pub destination: MemoryDestination,
    pub database_id: Uuid,
    pub destination_id: Uuid,
    runtime: Option<EngineRuntime>,
    _temp_dir: Option<TempDir>,
}

impl TestEngine {
    /// Starts an engine over a fresh database.
    pub async fn start(dumper: FakeDumper) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("engine.db");
        let mut env = Self::start_at(&db_path, dumper).await;
        env._temp_dir = Some(temp_dir);
        env
    }

    /// Starts an engine over an existing database file.
    pub async fn start_at(db_path: &Path, dumper: FakeDumper) -> Self {
        let store = Arc::new(SqliteStore::new(db_path).expect("Failed to open store"));
        let destination = MemoryDestination::default();
        let components = EngineComponents {
            store: store.clone(),
            dumper: Arc::new(dumper),
            destination: Arc::new(destination.clone()),
            webhook_client: Arc::new(
                ReqwestWebhookClient::new(Duration::from_secs(2))
                    .expect("Failed to create HTTP client"),
            ),
        };
        let runtime =
            EngineRuntime::start(components, fast_settings()).expect("Failed to start engine");

        Self {
            store,
            destination,
            database_id: Uuid::new_v4(),
            destination_id: Uuid::new_v4(),
            runtime: Some(runtime),
            _temp_dir: None,
        }
    }

    pub fn engine(&self) -> &BackupEngine {
        self.runtime
            .as_ref()
            .expect("Engine already shut down")
            .engine()
    }

    pub fn job_params(&self, name: &str) -> BackupJobParams {
        BackupJobParams {
            name: name.to_string(),
            database_id: self.database_id,
            destination_id: self.destination_id,
            cron_expression: "0 3 * * *".to_string(),
            retention_days: 7,
            is_active: true,
        }
    }

    pub async fn create_job(&self, name: &str) -> BackupJob {
        self.engine()
            .create_backup_job(self.job_params(name))
            .await
            .expect("Failed to create backup job")
    }

    /// Polls the store until the execution is terminal.
    pub async fn wait_for_terminal(&self, execution_id: Uuid) -> Execution {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        loop {
            let execution = self
                .store
                .get_execution(execution_id)
                .unwrap()
                .expect("Execution not found");
            if execution.status.is_terminal() {
                return execution;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "Execution {} did not finish in time",
                execution_id
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown().await;
        }
    }

    pub fn db_path(&self) -> Option<PathBuf> {
        self._temp_dir
            .as_ref()
            .map(|dir| dir.path().join("engine.db"))
    }
}
