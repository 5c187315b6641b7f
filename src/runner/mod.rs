//! Executes one backup end to end and tracks it as an `Execution`.
//!
//! A run is split in two halves. `begin` performs the conflict check and the
//! `queued -> running` transition and returns a [`StartedRun`]; `finish`
//! streams the dump into the destination and records the terminal status.
//! Callers that must not wait for the dump (the scheduler) spawn `finish`.

mod guard;

use crate::database::DatabaseDumper;
use crate::destination::{Destination, DestinationReceipt};
use crate::error::{EngineError, EngineResult};
use crate::events::{Event, EventBus, EventType};
use crate::metrics;
use crate::store::{BackupJob, EngineStore, Execution, NewExecution, TerminalOutcome};
use guard::{RunKey, RunRegistry, RunningGuard};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Error recorded on executions aborted through cancellation.
pub const CANCELLED_ERROR: &str = "execution cancelled";

#[derive(Clone)]
pub struct BackupRunner {
    store: Arc<dyn EngineStore>,
    dumper: Arc<dyn DatabaseDumper>,
    destination: Arc<dyn Destination>,
    events: EventBus,
    running: RunRegistry,
}

/// A run that has reached `running` and owns its job's running slot until
/// `finish` completes.
pub struct StartedRun {
    runner: BackupRunner,
    execution: Execution,
    job: Option<BackupJob>,
    cancel_token: CancellationToken,
    guard: RunningGuard,
    started: Instant,
}

impl BackupRunner {
    pub fn new(
        store: Arc<dyn EngineStore>,
        dumper: Arc<dyn DatabaseDumper>,
        destination: Arc<dyn Destination>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            dumper,
            destination,
            events,
            running: RunRegistry::default(),
        }
    }

    /// Runs the backup job `backup_id` to completion.
    pub async fn run(&self, backup_id: Uuid) -> EngineResult<Execution> {
        let job = self
            .store
            .get_backup(backup_id)?
            .ok_or_else(|| EngineError::not_found("Backup", backup_id))?;
        self.begin(&job).await?.finish().await
    }

    /// Runs a one-off backup that is not tied to any job.
    pub async fn run_ad_hoc(
        &self,
        database_id: Uuid,
        destination_id: Uuid,
    ) -> EngineResult<Execution> {
        self.begin_ad_hoc(database_id, destination_id)
            .await?
            .finish()
            .await
    }

    /// Claims the running slot for `job` and moves a fresh execution to
    /// `running`. Fails with `Conflict` while another run of the job is live.
    pub async fn begin(&self, job: &BackupJob) -> EngineResult<StartedRun> {
        let cancel_token = CancellationToken::new();
        let guard = self
            .running
            .claim(RunKey::Backup(job.id), cancel_token.clone())
            .ok_or(EngineError::Conflict { backup_id: job.id })?;

        let new = NewExecution {
            backup_id: Some(job.id),
            database_id: job.database_id,
            destination_id: job.destination_id,
        };
        self.start(new, Some(job.clone()), cancel_token, guard).await
    }

    pub async fn begin_ad_hoc(
        &self,
        database_id: Uuid,
        destination_id: Uuid,
    ) -> EngineResult<StartedRun> {
        let cancel_token = CancellationToken::new();
        let guard = self
            .running
            .claim(RunKey::AdHoc(Uuid::new_v4()), cancel_token.clone())
            .ok_or_else(|| EngineError::TransientIo("ad-hoc run key collision".into()))?;

        let new = NewExecution {
            backup_id: None,
            database_id,
            destination_id,
        };
        self.start(new, None, cancel_token, guard).await
    }

    async fn start(
        &self,
        new: NewExecution,
        job: Option<BackupJob>,
        cancel_token: CancellationToken,
        guard: RunningGuard,
    ) -> EngineResult<StartedRun> {
        let queued = self.store.create_execution(&new)?;

        let execution = match self.store.set_running(queued.id) {
            Ok(execution) => execution,
            Err(e) => {
                let outcome = TerminalOutcome::Failed {
                    error: format!("failed to start: {}", e),
                };
                if let Err(e) = self.store.set_terminal(queued.id, &outcome) {
                    error!("Failed to fail execution {}: {}", queued.id, e);
                }
                return Err(e.into());
            }
        };

        metrics::record_execution_started();
        info!(
            "Execution {} started (backup: {:?}, database: {}, destination: {})",
            execution.id, execution.backup_id, execution.database_id, execution.destination_id
        );

        self.events
            .publish(execution_event(
                EventType::ExecutionStarted,
                &execution,
                job.as_ref(),
            ))
            .await;

        Ok(StartedRun {
            runner: self.clone(),
            execution,
            job,
            cancel_token,
            guard,
            started: Instant::now(),
        })
    }

    pub fn is_running(&self, backup_id: Uuid) -> bool {
        self.running.contains(RunKey::Backup(backup_id))
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Cancels every live run. Each one still records a terminal status.
    pub fn cancel_all(&self) -> usize {
        self.running.cancel_all()
    }

    async fn stream(
        &self,
        execution: &Execution,
        cancel_token: &CancellationToken,
    ) -> EngineResult<DestinationReceipt> {
        if cancel_token.is_cancelled() {
            return Err(EngineError::Cancelled(CANCELLED_ERROR.to_string()));
        }

        let file_name = format!(
            "{}-{}.sql",
            execution.started_at.format("%Y%m%dT%H%M%SZ"),
            execution.id
        );
        let mut writer = self
            .destination
            .open(execution.destination_id, &file_name)
            .await?;

        let dumped = tokio::select! {
            result = self.dumper.dump(execution.database_id, &mut writer) => result,
            _ = cancel_token.cancelled() => {
                Err(EngineError::Cancelled(CANCELLED_ERROR.to_string()))
            }
        };

        match dumped {
            Ok(()) => writer.close().await,
            Err(e) => {
                writer.abort().await;
                Err(e)
            }
        }
    }
}

impl StartedRun {
    pub fn execution(&self) -> &Execution {
        &self.execution
    }

    /// Streams the dump and records the terminal status. Every path, including
    /// cancellation, leaves the execution `success` or `failed`.
    pub async fn finish(self) -> EngineResult<Execution> {
        let StartedRun {
            runner,
            execution,
            job,
            cancel_token,
            guard,
            started,
        } = self;

        let outcome = match runner.stream(&execution, &cancel_token).await {
            Ok(receipt) => TerminalOutcome::Success {
                file_size: receipt.bytes_written,
                path: receipt.path,
            },
            Err(e) => {
                warn!("Execution {} failed: {}", execution.id, e);
                TerminalOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        let elapsed = started.elapsed();
        let status = outcome.status();
        let finished = runner.store.set_terminal(execution.id, &outcome);
        metrics::record_execution_finished(status.as_str(), elapsed);
        drop(guard);

        let finished = finished.map_err(|e| {
            error!("Failed to record outcome of execution {}: {}", execution.id, e);
            EngineError::from(e)
        })?;

        match &outcome {
            TerminalOutcome::Success { file_size, path } => info!(
                "Execution {} succeeded in {:?}: {} bytes written to {}",
                finished.id, elapsed, file_size, path
            ),
            TerminalOutcome::Failed { error } => info!(
                "Execution {} failed after {:?}: {}",
                finished.id, elapsed, error
            ),
        }

        let event_type = match outcome {
            TerminalOutcome::Success { .. } => EventType::ExecutionSuccess,
            TerminalOutcome::Failed { .. } => EventType::ExecutionFailed,
        };
        runner
            .events
            .publish(execution_event(event_type, &finished, job.as_ref()))
            .await;

        Ok(finished)
    }
}

/// The subject is the run's job, even if the job was deleted mid-run and the
/// stored execution no longer points at it.
fn execution_event(event_type: EventType, execution: &Execution, job: Option<&BackupJob>) -> Event {
    Event::new(
        event_type,
        job.map(|j| j.id),
        json!({
            "execution": execution,
            "backup": job,
        }),
    )
    .with_execution(execution.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::LocalDestination;
    use crate::store::{BackupJobParams, BackupStore, ExecutionStatus, ExecutionStore, SqliteStore};
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncWrite, AsyncWriteExt};
    use tokio::sync::Notify;

    /// Writes `size` bytes, optionally waiting on `gate` first.
    struct FakeDumper {
        size: usize,
        gate: Option<Arc<Notify>>,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl DatabaseDumper for FakeDumper {
        async fn dump(
            &self,
            _database_id: Uuid,
            writer: &mut (dyn AsyncWrite + Send + Unpin),
        ) -> EngineResult<()> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(msg) = &self.fail_with {
                return Err(EngineError::TransientIo(msg.clone()));
            }
            let chunk = vec![b'x'; 64 * 1024];
            let mut remaining = self.size;
            while remaining > 0 {
                let n = remaining.min(chunk.len());
                writer.write_all(&chunk[..n]).await?;
                remaining -= n;
            }
            Ok(())
        }
    }

    struct Fixture {
        runner: BackupRunner,
        store: Arc<SqliteStore>,
        events: EventBus,
        job: BackupJob,
        _dir: TempDir,
    }

    fn fixture(dumper: FakeDumper) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::new(dir.path().join("engine.db")).unwrap());
        let destination_id = Uuid::new_v4();
        let destination =
            LocalDestination::new(&[]).with_root(destination_id, dir.path().join("backups"));
        let events = EventBus::new(16);
        let job = store
            .create_backup(&BackupJobParams {
                name: "nightly".to_string(),
                database_id: Uuid::new_v4(),
                destination_id,
                cron_expression: "0 3 * * *".to_string(),
                retention_days: 7,
                is_active: true,
            })
            .unwrap();
        let runner = BackupRunner::new(
            store.clone(),
            Arc::new(dumper),
            Arc::new(destination),
            events.clone(),
        );
        Fixture {
            runner,
            store,
            events,
            job,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_successful_run_records_size_and_emits_events() {
        let fx = fixture(FakeDumper {
            size: 1_048_576,
            gate: None,
            fail_with: None,
        });
        let mut sub = fx.events.subscribe();

        let execution = fx.runner.run(fx.job.id).await.unwrap();

        assert_eq!(execution.status, ExecutionStatus::Success);
        assert_eq!(execution.file_size, Some(1_048_576));
        assert_eq!(execution.backup_id, Some(fx.job.id));
        assert!(execution.finished_at.unwrap() >= execution.started_at);
        assert!(!fx.runner.is_running(fx.job.id));

        let started = sub.recv().await.unwrap();
        let finished = sub.recv().await.unwrap();
        assert_eq!(started.event_type, EventType::ExecutionStarted);
        assert_eq!(finished.event_type, EventType::ExecutionSuccess);
        assert_eq!(finished.execution_id, Some(execution.id));
        assert_eq!(finished.payload["execution"]["file_size"], 1_048_576);
        assert_eq!(finished.payload["backup"]["id"], fx.job.id.to_string());
    }

    #[tokio::test]
    async fn test_dump_failure_marks_failed() {
        let fx = fixture(FakeDumper {
            size: 0,
            gate: None,
            fail_with: Some("connection refused".to_string()),
        });
        let mut sub = fx.events.subscribe();

        let execution = fx.runner.run(fx.job.id).await.unwrap();

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.error.unwrap().contains("connection refused"));
        assert!(execution.file_size.is_none());
        assert!(execution.finished_at.is_some());

        assert_eq!(sub.recv().await.unwrap().event_type, EventType::ExecutionStarted);
        assert_eq!(sub.recv().await.unwrap().event_type, EventType::ExecutionFailed);
    }

    #[tokio::test]
    async fn test_second_begin_conflicts_while_running() {
        let gate = Arc::new(Notify::new());
        let fx = fixture(FakeDumper {
            size: 10,
            gate: Some(gate.clone()),
            fail_with: None,
        });

        let first = fx.runner.begin(&fx.job).await.unwrap();
        assert!(fx.runner.is_running(fx.job.id));

        let second = fx.runner.begin(&fx.job).await;
        assert!(matches!(second, Err(EngineError::Conflict { .. })));

        let handle = tokio::spawn(first.finish());
        gate.notify_one();
        let execution = handle.await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Success);

        // Slot released once the run is terminal.
        gate.notify_one();
        let again = fx.runner.run(fx.job.id).await.unwrap();
        assert_eq!(again.status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn test_terminal_event_keeps_subject_of_deleted_job() {
        let gate = Arc::new(Notify::new());
        let fx = fixture(FakeDumper {
            size: 10,
            gate: Some(gate.clone()),
            fail_with: None,
        });
        let mut sub = fx.events.subscribe();

        let started = fx.runner.begin(&fx.job).await.unwrap();
        assert!(fx.store.delete_backup(fx.job.id).unwrap());
        gate.notify_one();
        let execution = started.finish().await.unwrap();
        assert_eq!(execution.backup_id, None);

        let started_event = sub.recv().await.unwrap();
        let finished_event = sub.recv().await.unwrap();
        assert_eq!(started_event.backup_id, Some(fx.job.id));
        assert_eq!(finished_event.event_type, EventType::ExecutionSuccess);
        assert_eq!(finished_event.backup_id, Some(fx.job.id));
    }

    #[tokio::test]
    async fn test_cancel_all_drives_run_to_failed() {
        let gate = Arc::new(Notify::new());
        let fx = fixture(FakeDumper {
            size: 10,
            gate: Some(gate),
            fail_with: None,
        });

        let started = fx.runner.begin(&fx.job).await.unwrap();
        let id = started.execution().id;
        let handle = tokio::spawn(started.finish());
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(fx.runner.cancel_all(), 1);
        let execution = handle.await.unwrap().unwrap();

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.error.unwrap().contains(CANCELLED_ERROR));
        let stored = fx.store.get_execution(id).unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Failed);
        assert_eq!(fx.runner.running_count(), 0);
    }

    #[tokio::test]
    async fn test_ad_hoc_run_has_no_backup() {
        let fx = fixture(FakeDumper {
            size: 100,
            gate: None,
            fail_with: None,
        });

        let execution = fx
            .runner
            .run_ad_hoc(fx.job.database_id, fx.job.destination_id)
            .await
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Success);
        assert!(execution.backup_id.is_none());
    }

    #[tokio::test]
    async fn test_unknown_destination_fails_execution() {
        let fx = fixture(FakeDumper {
            size: 100,
            gate: None,
            fail_with: None,
        });

        let execution = fx
            .runner
            .run_ad_hoc(fx.job.database_id, Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_run_unknown_job_is_not_found() {
        let fx = fixture(FakeDumper {
            size: 0,
            gate: None,
            fail_with: None,
        });
        let result = fx.runner.run(Uuid::new_v4()).await;
        assert!(matches!(result, Err(EngineError::NotFound { .. })));
    }
}
