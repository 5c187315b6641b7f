use crate::error::{EngineError, EngineResult};
use crate::store::{BackupJob, Execution};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Command sent to the scheduler.
pub enum SchedulerCommand {
    Upsert {
        job: BackupJob,
        response: oneshot::Sender<EngineResult<Option<DateTime<Utc>>>>,
    },
    Remove {
        job_id: Uuid,
        response: oneshot::Sender<bool>,
    },
    TriggerNow {
        job_id: Uuid,
        response: oneshot::Sender<EngineResult<Execution>>,
    },
    RunAdHoc {
        database_id: Uuid,
        destination_id: Uuid,
        response: oneshot::Sender<EngineResult<Execution>>,
    },
    NextRunAt {
        job_id: Uuid,
        response: oneshot::Sender<Option<DateTime<Utc>>>,
    },
}

/// Handle to interact with the scheduler loop from other tasks.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub(super) fn new(command_tx: mpsc::Sender<SchedulerCommand>) -> Self {
        Self { command_tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SchedulerCommand,
    ) -> EngineResult<T> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(build(tx))
            .await
            .map_err(|_| scheduler_stopped())?;
        rx.await.map_err(|_| scheduler_stopped())
    }

    /// Adds or replaces a job. Takes effect on the next tick. Returns the
    /// next fire time, or None if the job is inactive.
    pub async fn upsert(&self, job: BackupJob) -> EngineResult<Option<DateTime<Utc>>> {
        self.request(|response| SchedulerCommand::Upsert { job, response })
            .await?
    }

    /// Stops scheduling a job. In-flight runs are left to finish.
    pub async fn remove(&self, job_id: Uuid) -> EngineResult<bool> {
        self.request(|response| SchedulerCommand::Remove { job_id, response })
            .await
    }

    /// Starts a run immediately and returns the execution once it is
    /// `running`. The dump continues in the background.
    pub async fn trigger_now(&self, job_id: Uuid) -> EngineResult<Execution> {
        self.request(|response| SchedulerCommand::TriggerNow { job_id, response })
            .await?
    }

    /// Starts a one-off run not tied to any job, returning once it is
    /// `running`.
    pub async fn run_ad_hoc(
        &self,
        database_id: Uuid,
        destination_id: Uuid,
    ) -> EngineResult<Execution> {
        self.request(|response| SchedulerCommand::RunAdHoc {
            database_id,
            destination_id,
            response,
        })
        .await?
    }

    pub async fn next_run_at(&self, job_id: Uuid) -> EngineResult<Option<DateTime<Utc>>> {
        self.request(|response| SchedulerCommand::NextRunAt { job_id, response })
            .await
    }
}

fn scheduler_stopped() -> EngineError {
    EngineError::Cancelled("scheduler is not running".to_string())
}
