//! Persistence for backup jobs, executions and webhooks.

mod models;
mod pagination;
mod schema;
mod sqlite_store;

pub use models::{
    BackupJob, BackupJobParams, BackupScheduleState, DeliveryStatus, Execution, ExecutionFilter,
    ExecutionStatus, HttpMethod, NewExecution, TerminalOutcome, Webhook, WebhookExecution,
    WebhookParams,
};
pub use pagination::{PageInfo, PageRequest};
pub use sqlite_store::SqliteStore;

use crate::events::EventType;
use anyhow::Result;
use uuid::Uuid;

/// Default page size for paginated listings.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Storage for backup job definitions and their scheduling state.
pub trait BackupStore: Send + Sync {
    fn create_backup(&self, params: &BackupJobParams) -> Result<BackupJob>;

    fn get_backup(&self, id: Uuid) -> Result<Option<BackupJob>>;

    /// All jobs, newest first.
    fn list_backups(&self) -> Result<Vec<BackupJob>>;

    /// Returns None if the job does not exist.
    fn update_backup(&self, id: Uuid, params: &BackupJobParams) -> Result<Option<BackupJob>>;

    /// Deletes the job and its schedule state. Execution history is kept
    /// with `backup_id` cleared. Returns false if the job did not exist.
    fn delete_backup(&self, id: Uuid) -> Result<bool>;

    fn get_schedule_state(&self, backup_id: Uuid) -> Result<Option<BackupScheduleState>>;

    fn update_schedule_state(&self, state: &BackupScheduleState) -> Result<()>;
}

/// Storage for execution records.
///
/// Implementations enforce the status machine: `queued -> running` once, and
/// exactly one transition into a terminal status.
pub trait ExecutionStore: Send + Sync {
    fn create_execution(&self, new: &NewExecution) -> Result<Execution>;

    fn set_running(&self, id: Uuid) -> Result<Execution>;

    fn set_terminal(&self, id: Uuid, outcome: &TerminalOutcome) -> Result<Execution>;

    fn get_execution(&self, id: Uuid) -> Result<Option<Execution>>;

    /// Newest first.
    fn paginate_executions(
        &self,
        filter: &ExecutionFilter,
        page: PageRequest,
    ) -> Result<(PageInfo, Vec<Execution>)>;

    /// Marks every queued or running execution as failed with `error`.
    /// Returns the number of rows changed.
    fn fail_unfinished_executions(&self, error: &str) -> Result<usize>;
}

/// Storage for webhook subscriptions and their delivery log.
pub trait WebhookStore: Send + Sync {
    fn create_webhook(&self, params: &WebhookParams) -> Result<Webhook>;

    fn get_webhook(&self, id: Uuid) -> Result<Option<Webhook>>;

    fn update_webhook(&self, id: Uuid, params: &WebhookParams) -> Result<Option<Webhook>>;

    fn delete_webhook(&self, id: Uuid) -> Result<bool>;

    fn paginate_webhooks(&self, page: PageRequest) -> Result<(PageInfo, Vec<Webhook>)>;

    /// Active webhooks subscribed to `event_type`, oldest first.
    fn list_active_webhooks_for(&self, event_type: EventType) -> Result<Vec<Webhook>>;

    fn record_webhook_execution(&self, record: &WebhookExecution) -> Result<()>;

    /// Newest first.
    fn paginate_webhook_executions(
        &self,
        webhook_id: Uuid,
        page: PageRequest,
    ) -> Result<(PageInfo, Vec<WebhookExecution>)>;
}

/// Convenience bound for a single store backing every engine component.
pub trait EngineStore: BackupStore + ExecutionStore + WebhookStore {}

impl<T: BackupStore + ExecutionStore + WebhookStore> EngineStore for T {}
