//! Cron-driven scheduling of backup jobs.
//!
//! One [`BackupScheduler`] owns the schedule table. Other tasks talk to it
//! through a [`SchedulerHandle`]; every run, scheduled or manual, goes through
//! the same [`BackupRunner`] entry point and its per-job conflict check.

mod cron_expr;
mod handle;
mod table;

pub use cron_expr::{next_fire_after, parse_cron};
pub use handle::{SchedulerCommand, SchedulerHandle};
pub use table::ScheduleTable;

use crate::config::SchedulerSettings;
use crate::error::{EngineError, EngineResult};
use crate::runner::BackupRunner;
use crate::store::{BackupJob, BackupScheduleState, EngineStore, Execution};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Error recorded on executions a previous process left unfinished.
pub const INTERRUPTED_ERROR: &str = "interrupted: process restarted";

/// Error recorded on executions still unfinished when shutdown gave up.
pub const SHUTDOWN_ERROR: &str = "cancelled: process shutdown";

pub struct BackupScheduler {
    table: ScheduleTable,
    runner: BackupRunner,
    store: Arc<dyn EngineStore>,
    settings: SchedulerSettings,

    /// Receiver for commands from SchedulerHandle
    command_receiver: mpsc::Receiver<SchedulerCommand>,

    /// Token to signal scheduler shutdown.
    shutdown_token: CancellationToken,

    /// Runs spawned by this scheduler that have not finished yet.
    in_flight: JoinSet<()>,

    /// Manual runs that got past the conflict check, with their start time.
    manual_started_tx: mpsc::UnboundedSender<(Uuid, DateTime<Utc>)>,
    manual_started_rx: mpsc::UnboundedReceiver<(Uuid, DateTime<Utc>)>,
}

/// Create a scheduler and its handle.
pub fn create_scheduler(
    runner: BackupRunner,
    store: Arc<dyn EngineStore>,
    settings: SchedulerSettings,
    shutdown_token: CancellationToken,
) -> (BackupScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let (manual_started_tx, manual_started_rx) = mpsc::unbounded_channel();
    let scheduler = BackupScheduler {
        table: ScheduleTable::new(),
        runner,
        store,
        settings,
        command_receiver: command_rx,
        shutdown_token,
        in_flight: JoinSet::new(),
        manual_started_tx,
        manual_started_rx,
    };
    (scheduler, SchedulerHandle::new(command_tx))
}

impl BackupScheduler {
    /// Recovers state left by a previous process and loads active jobs.
    pub fn init(&mut self) -> EngineResult<()> {
        match self.store.fail_unfinished_executions(INTERRUPTED_ERROR) {
            Ok(count) if count > 0 => {
                warn!("Marked {} unfinished executions from previous run as failed", count);
            }
            Ok(_) => {}
            Err(e) => error!("Failed to recover unfinished executions: {}", e),
        }

        let now = Utc::now();
        for job in self.store.list_backups()? {
            if !job.is_active {
                continue;
            }
            let persisted = self.store.get_schedule_state(job.id)?;
            let persisted_next = persisted.as_ref().map(|s| s.next_run_at);
            let job_id = job.id;
            match self.table.upsert_with_next(job, now, persisted_next) {
                Ok(next) => {
                    if persisted.is_none() {
                        self.persist_schedule(job_id, next, None);
                    }
                }
                Err(e) => warn!("Not scheduling backup {}: {}", job_id, e),
            }
        }

        info!("Scheduler loaded {} active backup jobs", self.table.len());
        Ok(())
    }

    /// Main scheduler loop. Returns after shutdown has drained in-flight runs.
    pub async fn run(&mut self) {
        info!("Starting backup scheduler with {} jobs", self.table.len());

        loop {
            while let Some(result) = self.in_flight.try_join_next() {
                if let Err(e) = result {
                    error!("Backup run task failed: {}", e);
                }
            }

            let sleep_duration = self
                .table
                .time_until_next(Utc::now(), self.settings.max_idle);
            debug!("Scheduler sleeping for {:?}", sleep_duration);

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.fire_due_jobs(Utc::now());
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd);
                }
                Some((job_id, started_at)) = self.manual_started_rx.recv() => {
                    self.reschedule_after_manual_run(job_id, started_at);
                }
                Some(result) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(e) = result {
                        error!("Backup run task failed: {}", e);
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Backup scheduler stopped");
    }

    fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::Upsert { job, response } => {
                let _ = response.send(self.upsert(job));
            }
            SchedulerCommand::Remove { job_id, response } => {
                let removed = self.table.remove(job_id);
                if removed {
                    info!("Backup {} removed from schedule", job_id);
                }
                let _ = response.send(removed);
            }
            SchedulerCommand::TriggerNow { job_id, response } => {
                self.trigger_now(job_id, response);
            }
            SchedulerCommand::RunAdHoc {
                database_id,
                destination_id,
                response,
            } => {
                self.run_ad_hoc(database_id, destination_id, response);
            }
            SchedulerCommand::NextRunAt { job_id, response } => {
                let _ = response.send(self.table.next_fire(job_id));
            }
        }
    }

    fn upsert(&mut self, job: BackupJob) -> EngineResult<Option<DateTime<Utc>>> {
        let job_id = job.id;
        let next = self.table.upsert(job, Utc::now())?;
        match next {
            Some(next) => {
                info!("Backup {} scheduled, next run at {}", job_id, next);
                let last = self
                    .store
                    .get_schedule_state(job_id)
                    .ok()
                    .flatten()
                    .and_then(|s| s.last_run_at);
                self.persist_schedule(job_id, Some(next), last);
            }
            None => debug!("Backup {} is inactive, not scheduled", job_id),
        }
        Ok(next)
    }

    fn fire_due_jobs(&mut self, now: DateTime<Utc>) {
        for (job, next) in self.table.take_due(now) {
            info!("Backup {} ({}) is due, next run at {:?}", job.id, job.name, next);
            self.persist_schedule(job.id, next, Some(now));

            let runner = self.runner.clone();
            self.in_flight.spawn(async move {
                match runner.begin(&job).await {
                    Ok(started) => {
                        if let Err(e) = started.finish().await {
                            error!("Scheduled run of backup {} failed: {}", job.id, e);
                        }
                    }
                    Err(EngineError::Conflict { backup_id }) => {
                        warn!("Skipping scheduled run of {}: previous run still active", backup_id);
                    }
                    Err(e) => error!("Failed to start scheduled run of {}: {}", job.id, e),
                }
            });
        }
    }

    fn trigger_now(&mut self, job_id: Uuid, response: oneshot::Sender<EngineResult<Execution>>) {
        let job = match self.store.get_backup(job_id) {
            Ok(Some(job)) => job,
            Ok(None) => {
                let _ = response.send(Err(EngineError::not_found("Backup", job_id)));
                return;
            }
            Err(e) => {
                let _ = response.send(Err(e.into()));
                return;
            }
        };

        info!("Manual run requested for backup {}", job_id);
        let runner = self.runner.clone();
        let manual_started = self.manual_started_tx.clone();
        self.in_flight.spawn(async move {
            match runner.begin(&job).await {
                Ok(started) => {
                    let _ = manual_started.send((job.id, started.execution().started_at));
                    let _ = response.send(Ok(started.execution().clone()));
                    if let Err(e) = started.finish().await {
                        error!("Manual run of backup {} failed: {}", job.id, e);
                    }
                }
                Err(e) => {
                    let _ = response.send(Err(e));
                }
            }
        });
    }

    /// Moves the job's next fire time past a manual run that actually started.
    fn reschedule_after_manual_run(&mut self, job_id: Uuid, started_at: DateTime<Utc>) {
        if let Some(next) = self.table.reschedule(job_id, started_at) {
            debug!("Backup {} rescheduled after manual run, next at {}", job_id, next);
            self.persist_schedule(job_id, Some(next), Some(started_at));
        }
    }

    fn run_ad_hoc(
        &mut self,
        database_id: Uuid,
        destination_id: Uuid,
        response: oneshot::Sender<EngineResult<Execution>>,
    ) {
        info!(
            "Ad-hoc run requested for database {} to destination {}",
            database_id, destination_id
        );
        let runner = self.runner.clone();
        self.in_flight.spawn(async move {
            match runner.begin_ad_hoc(database_id, destination_id).await {
                Ok(started) => {
                    let _ = response.send(Ok(started.execution().clone()));
                    if let Err(e) = started.finish().await {
                        error!("Ad-hoc run of database {} failed: {}", database_id, e);
                    }
                }
                Err(e) => {
                    let _ = response.send(Err(e));
                }
            }
        });
    }

    fn persist_schedule(
        &self,
        backup_id: Uuid,
        next: Option<DateTime<Utc>>,
        last: Option<DateTime<Utc>>,
    ) {
        let Some(next_run_at) = next else {
            return;
        };
        let state = BackupScheduleState {
            backup_id,
            next_run_at,
            last_run_at: last,
        };
        if let Err(e) = self.store.update_schedule_state(&state) {
            warn!("Failed to persist schedule state for {}: {}", backup_id, e);
        }
    }

    /// Cancels live runs and waits for them to record their outcome.
    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");
        let cancelled = self.runner.cancel_all();
        if cancelled > 0 {
            info!("Cancelled {} running executions", cancelled);
        }

        let grace = self.settings.shutdown_grace;
        let in_flight = &mut self.in_flight;
        let drained = tokio::time::timeout(grace, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                "{} runs did not finish within {:?}, aborting",
                self.in_flight.len(),
                grace
            );
            self.in_flight.abort_all();
            while self.in_flight.join_next().await.is_some() {}
            match self.store.fail_unfinished_executions(SHUTDOWN_ERROR) {
                Ok(count) => warn!("Marked {} executions as failed at shutdown", count),
                Err(e) => error!("Failed to mark executions at shutdown: {}", e),
            }
        }
        info!("Scheduler shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseDumper;
    use crate::destination::LocalDestination;
    use crate::events::EventBus;
    use crate::store::{
        BackupJobParams, BackupStore, ExecutionStatus, ExecutionStore, NewExecution, SqliteStore,
    };
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncWrite, AsyncWriteExt};

    struct SlowDumper {
        delay: Duration,
    }

    #[async_trait]
    impl DatabaseDumper for SlowDumper {
        async fn dump(
            &self,
            _database_id: Uuid,
            writer: &mut (dyn AsyncWrite + Send + Unpin),
        ) -> EngineResult<()> {
            tokio::time::sleep(self.delay).await;
            writer.write_all(b"-- dump").await?;
            Ok(())
        }
    }

    struct Fixture {
        scheduler: BackupScheduler,
        handle: SchedulerHandle,
        store: Arc<SqliteStore>,
        destination_id: Uuid,
        shutdown: CancellationToken,
        _dir: TempDir,
    }

    fn fixture(delay: Duration) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::new(dir.path().join("engine.db")).unwrap());
        let destination_id = Uuid::new_v4();
        let destination =
            LocalDestination::new(&[]).with_root(destination_id, dir.path().join("out"));
        let runner = BackupRunner::new(
            store.clone(),
            Arc::new(SlowDumper { delay }),
            Arc::new(destination),
            EventBus::new(16),
        );
        let shutdown = CancellationToken::new();
        let settings = SchedulerSettings {
            max_idle: Duration::from_millis(50),
            shutdown_grace: Duration::from_secs(5),
        };
        let (scheduler, handle) =
            create_scheduler(runner, store.clone(), settings, shutdown.clone());
        Fixture {
            scheduler,
            handle,
            store,
            destination_id,
            shutdown,
            _dir: dir,
        }
    }

    fn params(destination_id: Uuid, cron: &str, active: bool) -> BackupJobParams {
        BackupJobParams {
            name: "job".to_string(),
            database_id: Uuid::new_v4(),
            destination_id,
            cron_expression: cron.to_string(),
            retention_days: 1,
            is_active: active,
        }
    }

    #[tokio::test]
    async fn test_init_fails_interrupted_executions() {
        let mut fx = fixture(Duration::ZERO);
        let stale = fx
            .store
            .create_execution(&NewExecution {
                backup_id: None,
                database_id: Uuid::new_v4(),
                destination_id: fx.destination_id,
            })
            .unwrap();
        fx.store.set_running(stale.id).unwrap();

        fx.scheduler.init().unwrap();

        let recovered = fx.store.get_execution(stale.id).unwrap().unwrap();
        assert_eq!(recovered.status, ExecutionStatus::Failed);
        assert_eq!(recovered.error.as_deref(), Some(INTERRUPTED_ERROR));
    }

    #[tokio::test]
    async fn test_init_loads_only_active_jobs_and_fires_missed_run() {
        let mut fx = fixture(Duration::ZERO);
        let active = fx
            .store
            .create_backup(&params(fx.destination_id, "0 3 * * *", true))
            .unwrap();
        let inactive = fx
            .store
            .create_backup(&params(fx.destination_id, "0 3 * * *", false))
            .unwrap();
        // Fire time passed while the process was down.
        fx.store
            .update_schedule_state(&BackupScheduleState {
                backup_id: active.id,
                next_run_at: Utc::now() - chrono::Duration::hours(30),
                last_run_at: None,
            })
            .unwrap();

        fx.scheduler.init().unwrap();
        assert!(fx.scheduler.table.contains(active.id));
        assert!(!fx.scheduler.table.contains(inactive.id));

        let mut scheduler = fx.scheduler;
        let task = tokio::spawn(async move { scheduler.run().await });
        tokio::time::sleep(Duration::from_millis(300)).await;

        let (info, rows) = fx
            .store
            .paginate_executions(
                &crate::store::ExecutionFilter {
                    backup_id: Some(active.id),
                    ..Default::default()
                },
                crate::store::PageRequest::new(1, 20),
            )
            .unwrap();
        assert_eq!(info.total_items, 1);
        assert_eq!(rows[0].status, ExecutionStatus::Success);

        let next = fx.handle.next_run_at(active.id).await.unwrap().unwrap();
        assert!(next > Utc::now());

        fx.shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_trigger_now_returns_running_and_rejects_overlap() {
        let mut fx = fixture(Duration::from_millis(300));
        let job = fx
            .store
            .create_backup(&params(fx.destination_id, "0 3 * * *", true))
            .unwrap();
        fx.scheduler.init().unwrap();
        let mut scheduler = fx.scheduler;
        let task = tokio::spawn(async move { scheduler.run().await });

        let execution = fx.handle.trigger_now(job.id).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Running);

        let overlap = fx.handle.trigger_now(job.id).await;
        assert!(matches!(overlap, Err(EngineError::Conflict { .. })));

        tokio::time::sleep(Duration::from_millis(600)).await;
        let done = fx.store.get_execution(execution.id).unwrap().unwrap();
        assert_eq!(done.status, ExecutionStatus::Success);

        let missing = fx.handle.trigger_now(Uuid::new_v4()).await;
        assert!(matches!(missing, Err(EngineError::NotFound { .. })));

        fx.shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_trigger_leaves_schedule_untouched() {
        let mut fx = fixture(Duration::from_millis(300));
        let job = fx
            .store
            .create_backup(&params(fx.destination_id, "0 3 * * *", true))
            .unwrap();
        let far_future = Utc::now() + chrono::Duration::days(10);
        fx.store
            .update_schedule_state(&BackupScheduleState {
                backup_id: job.id,
                next_run_at: far_future,
                last_run_at: None,
            })
            .unwrap();
        fx.scheduler.init().unwrap();
        let mut scheduler = fx.scheduler;
        let task = tokio::spawn(async move { scheduler.run().await });

        let execution = fx.handle.trigger_now(job.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let after_run = fx.store.get_schedule_state(job.id).unwrap().unwrap();
        assert_eq!(after_run.last_run_at, Some(execution.started_at));
        assert!(after_run.next_run_at < far_future);
        assert_eq!(
            fx.handle.next_run_at(job.id).await.unwrap(),
            Some(after_run.next_run_at)
        );

        let overlap = fx.handle.trigger_now(job.id).await;
        assert!(matches!(overlap, Err(EngineError::Conflict { .. })));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let after_conflict = fx.store.get_schedule_state(job.id).unwrap().unwrap();
        assert_eq!(after_conflict, after_run);

        fx.shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_remove_and_next_run() {
        let fx = fixture(Duration::ZERO);
        let mut scheduler = fx.scheduler;
        let task = tokio::spawn(async move { scheduler.run().await });

        let job = fx
            .store
            .create_backup(&params(fx.destination_id, "0 3 * * *", true))
            .unwrap();
        let next = fx.handle.upsert(job.clone()).await.unwrap();
        assert!(next.is_some());
        assert_eq!(fx.handle.next_run_at(job.id).await.unwrap(), next);
        assert_eq!(
            fx.store.get_schedule_state(job.id).unwrap().unwrap().next_run_at.timestamp(),
            next.unwrap().timestamp()
        );

        assert!(fx.handle.remove(job.id).await.unwrap());
        assert_eq!(fx.handle.next_run_at(job.id).await.unwrap(), None);

        let mut bad = job.clone();
        bad.cron_expression = "whenever".to_string();
        assert!(matches!(
            fx.handle.upsert(bad).await,
            Err(EngineError::Validation(_))
        ));

        fx.shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_execution() {
        let mut fx = fixture(Duration::from_secs(30));
        let job = fx
            .store
            .create_backup(&params(fx.destination_id, "0 3 * * *", true))
            .unwrap();
        fx.scheduler.init().unwrap();
        let mut scheduler = fx.scheduler;
        let task = tokio::spawn(async move { scheduler.run().await });

        let execution = fx.handle.trigger_now(job.id).await.unwrap();
        fx.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        let stored = fx.store.get_execution(execution.id).unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Failed);
        assert!(stored.error.unwrap().contains("cancelled"));

        // Handle reports the stopped scheduler.
        assert!(matches!(
            fx.handle.next_run_at(job.id).await,
            Err(EngineError::Cancelled(_))
        ));
    }
}
