use crate::events::EventType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Backup jobs
// =============================================================================

/// A configured, schedulable backup of one database into one destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupJob {
    pub id: Uuid,
    pub name: String,
    pub database_id: Uuid,
    pub destination_id: Uuid,
    pub cron_expression: String,
    /// Stored for the external retention collaborator; not enforced here.
    pub retention_days: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable fields of a backup job, used for both create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupJobParams {
    pub name: String,
    pub database_id: Uuid,
    pub destination_id: Uuid,
    pub cron_expression: String,
    pub retention_days: u32,
    pub is_active: bool,
}

impl From<&BackupJob> for BackupJobParams {
    fn from(job: &BackupJob) -> Self {
        Self {
            name: job.name.clone(),
            database_id: job.database_id,
            destination_id: job.destination_id,
            cron_expression: job.cron_expression.clone(),
            retention_days: job.retention_days,
            is_active: job.is_active,
        }
    }
}

/// Persisted scheduling state, used to detect fire times missed while the
/// process was down.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupScheduleState {
    pub backup_id: Uuid,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Executions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Queued => "queued",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(ExecutionStatus::Queued),
            "running" => Some(ExecutionStatus::Running),
            "success" => Some(ExecutionStatus::Success),
            "failed" => Some(ExecutionStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::Failed)
    }
}

/// One attempt at running a backup.
///
/// `finished_at` is set exactly when `status` is terminal; `file_size` and
/// `path` only on success, `error` only on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    /// None for ad-hoc runs and for runs whose backup was later deleted.
    pub backup_id: Option<Uuid>,
    pub database_id: Uuid,
    pub destination_id: Uuid,
    pub status: ExecutionStatus,
    pub path: Option<String>,
    pub file_size: Option<u64>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Execution {
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|finished| finished - self.started_at)
    }
}

/// Fields captured when an execution row is created. Database and destination
/// are copied so history survives later edits of the backup.
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub backup_id: Option<Uuid>,
    pub database_id: Uuid,
    pub destination_id: Uuid,
}

/// The single terminal transition of an execution.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalOutcome {
    Success { file_size: u64, path: String },
    Failed { error: String },
}

impl TerminalOutcome {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            TerminalOutcome::Success { .. } => ExecutionStatus::Success,
            TerminalOutcome::Failed { .. } => ExecutionStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionFilter {
    pub database_id: Option<Uuid>,
    pub destination_id: Option<Uuid>,
    pub backup_id: Option<Uuid>,
}

// =============================================================================
// Webhooks
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            _ => None,
        }
    }
}

/// An outbound HTTP subscription to one event type over a set of backups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: Uuid,
    pub name: String,
    pub event_type: EventType,
    pub target_ids: Vec<Uuid>,
    pub is_active: bool,
    pub method: HttpMethod,
    pub url: String,
    /// JSON object of header name to (templated) string value.
    pub headers: Option<serde_json::Value>,
    /// JSON body template.
    pub body: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    pub fn targets(&self, subject_id: Uuid) -> bool {
        self.target_ids.contains(&subject_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookParams {
    pub name: String,
    pub event_type: EventType,
    pub target_ids: Vec<Uuid>,
    pub is_active: bool,
    pub method: HttpMethod,
    pub url: String,
    pub headers: Option<serde_json::Value>,
    pub body: Option<serde_json::Value>,
}

impl From<&Webhook> for WebhookParams {
    fn from(webhook: &Webhook) -> Self {
        Self {
            name: webhook.name.clone(),
            event_type: webhook.event_type,
            target_ids: webhook.target_ids.clone(),
            is_active: webhook.is_active,
            method: webhook.method,
            url: webhook.url.clone(),
            headers: webhook.headers.clone(),
            body: webhook.body.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Success,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Success => "success",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(DeliveryStatus::Success),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

/// Final outcome of delivering one event to one webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookExecution {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event_id: Uuid,
    pub event_type: EventType,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub request_method: HttpMethod,
    pub request_url: String,
    pub request_body: Option<String>,
    pub response_status: Option<u16>,
    pub error: Option<String>,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}
