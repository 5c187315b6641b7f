use super::models::{
    BackupJob, BackupJobParams, BackupScheduleState, DeliveryStatus, Execution, ExecutionFilter,
    ExecutionStatus, HttpMethod, NewExecution, TerminalOutcome, Webhook, WebhookExecution,
    WebhookParams,
};
use super::pagination::{PageInfo, PageRequest};
use super::schema::ENGINE_VERSIONED_SCHEMAS;
use super::{BackupStore, ExecutionStore, WebhookStore};
use crate::events::EventType;
use crate::sqlite_persistence::open_versioned;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const BACKUP_COLUMNS: &str = "id, name, database_id, destination_id, cron_expression, \
     retention_days, is_active, created_at, updated_at";

const EXECUTION_COLUMNS: &str = "id, backup_id, database_id, destination_id, status, path, \
     file_size, error, started_at, finished_at";

const WEBHOOK_COLUMNS: &str = "id, name, event_type, target_ids, is_active, method, url, \
     headers, body, created_at, updated_at";

const WEBHOOK_EXECUTION_COLUMNS: &str = "id, webhook_id, event_id, event_type, status, \
     attempts, request_method, request_url, request_body, response_status, error, \
     duration_ms, created_at";

/// SQLite-backed implementation of every engine store trait.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path.as_ref(), ENGINE_VERSIONED_SCHEMAS)
            .context("Failed to open engine database")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        ENGINE_VERSIONED_SCHEMAS
            .last()
            .context("No schema versions declared")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("engine database mutex poisoned"))
    }

    // Fixed-width timestamps keep lexicographic ORDER BY chronological.
    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn conversion_error(
        column: &str,
        err: impl std::fmt::Display,
    ) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            Type::Text,
            format!("column {}: {}", column, err).into(),
        )
    }

    fn get_uuid(row: &rusqlite::Row, column: &str) -> rusqlite::Result<Uuid> {
        let raw: String = row.get(column)?;
        Uuid::parse_str(&raw).map_err(|e| Self::conversion_error(column, e))
    }

    fn get_optional_uuid(row: &rusqlite::Row, column: &str) -> rusqlite::Result<Option<Uuid>> {
        let raw: Option<String> = row.get(column)?;
        raw.map(|s| Uuid::parse_str(&s).map_err(|e| Self::conversion_error(column, e)))
            .transpose()
    }

    fn get_datetime(row: &rusqlite::Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
        let raw: String = row.get(column)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Self::conversion_error(column, e))
    }

    fn get_optional_datetime(
        row: &rusqlite::Row,
        column: &str,
    ) -> rusqlite::Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = row.get(column)?;
        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| Self::conversion_error(column, e))
        })
        .transpose()
    }

    fn get_optional_json(
        row: &rusqlite::Row,
        column: &str,
    ) -> rusqlite::Result<Option<serde_json::Value>> {
        let raw: Option<String> = row.get(column)?;
        raw.map(|s| serde_json::from_str(&s).map_err(|e| Self::conversion_error(column, e)))
            .transpose()
    }

    fn row_to_backup(row: &rusqlite::Row) -> rusqlite::Result<BackupJob> {
        Ok(BackupJob {
            id: Self::get_uuid(row, "id")?,
            name: row.get("name")?,
            database_id: Self::get_uuid(row, "database_id")?,
            destination_id: Self::get_uuid(row, "destination_id")?,
            cron_expression: row.get("cron_expression")?,
            retention_days: row.get::<_, i64>("retention_days")? as u32,
            is_active: row.get::<_, i64>("is_active")? != 0,
            created_at: Self::get_datetime(row, "created_at")?,
            updated_at: Self::get_datetime(row, "updated_at")?,
        })
    }

    fn row_to_schedule_state(row: &rusqlite::Row) -> rusqlite::Result<BackupScheduleState> {
        Ok(BackupScheduleState {
            backup_id: Self::get_uuid(row, "backup_id")?,
            next_run_at: Self::get_datetime(row, "next_run_at")?,
            last_run_at: Self::get_optional_datetime(row, "last_run_at")?,
        })
    }

    fn row_to_execution(row: &rusqlite::Row) -> rusqlite::Result<Execution> {
        let status_str: String = row.get("status")?;
        let status = ExecutionStatus::parse(&status_str).ok_or_else(|| {
            Self::conversion_error("status", format!("unknown execution status {}", status_str))
        })?;

        Ok(Execution {
            id: Self::get_uuid(row, "id")?,
            backup_id: Self::get_optional_uuid(row, "backup_id")?,
            database_id: Self::get_uuid(row, "database_id")?,
            destination_id: Self::get_uuid(row, "destination_id")?,
            status,
            path: row.get("path")?,
            file_size: row.get::<_, Option<i64>>("file_size")?.map(|s| s as u64),
            error: row.get("error")?,
            started_at: Self::get_datetime(row, "started_at")?,
            finished_at: Self::get_optional_datetime(row, "finished_at")?,
        })
    }

    fn row_to_webhook(row: &rusqlite::Row) -> rusqlite::Result<Webhook> {
        let event_type_str: String = row.get("event_type")?;
        let event_type = EventType::parse(&event_type_str).ok_or_else(|| {
            Self::conversion_error(
                "event_type",
                format!("unknown event type {}", event_type_str),
            )
        })?;
        let method_str: String = row.get("method")?;
        let method = HttpMethod::parse(&method_str).ok_or_else(|| {
            Self::conversion_error("method", format!("unknown http method {}", method_str))
        })?;
        let target_ids_str: String = row.get("target_ids")?;
        let target_ids: Vec<Uuid> = serde_json::from_str(&target_ids_str)
            .map_err(|e| Self::conversion_error("target_ids", e))?;

        Ok(Webhook {
            id: Self::get_uuid(row, "id")?,
            name: row.get("name")?,
            event_type,
            target_ids,
            is_active: row.get::<_, i64>("is_active")? != 0,
            method,
            url: row.get("url")?,
            headers: Self::get_optional_json(row, "headers")?,
            body: Self::get_optional_json(row, "body")?,
            created_at: Self::get_datetime(row, "created_at")?,
            updated_at: Self::get_datetime(row, "updated_at")?,
        })
    }

    fn row_to_webhook_execution(row: &rusqlite::Row) -> rusqlite::Result<WebhookExecution> {
        let event_type_str: String = row.get("event_type")?;
        let event_type = EventType::parse(&event_type_str).ok_or_else(|| {
            Self::conversion_error(
                "event_type",
                format!("unknown event type {}", event_type_str),
            )
        })?;
        let status_str: String = row.get("status")?;
        let status = DeliveryStatus::parse(&status_str).ok_or_else(|| {
            Self::conversion_error("status", format!("unknown delivery status {}", status_str))
        })?;
        let method_str: String = row.get("request_method")?;
        let request_method = HttpMethod::parse(&method_str).ok_or_else(|| {
            Self::conversion_error(
                "request_method",
                format!("unknown http method {}", method_str),
            )
        })?;

        Ok(WebhookExecution {
            id: Self::get_uuid(row, "id")?,
            webhook_id: Self::get_uuid(row, "webhook_id")?,
            event_id: Self::get_uuid(row, "event_id")?,
            event_type,
            status,
            attempts: row.get::<_, i64>("attempts")? as u32,
            request_method,
            request_url: row.get("request_url")?,
            request_body: row.get("request_body")?,
            response_status: row
                .get::<_, Option<i64>>("response_status")?
                .map(|s| s as u16),
            error: row.get("error")?,
            duration_ms: row.get("duration_ms")?,
            created_at: Self::get_datetime(row, "created_at")?,
        })
    }

    fn json_or_null(value: &Option<serde_json::Value>) -> Result<Option<String>> {
        value
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(Into::into)
    }

    fn get_execution_locked(conn: &Connection, id: Uuid) -> Result<Option<Execution>> {
        let execution = conn
            .query_row(
                &format!("SELECT {} FROM executions WHERE id = ?1", EXECUTION_COLUMNS),
                params![id.to_string()],
                Self::row_to_execution,
            )
            .optional()?;
        Ok(execution)
    }

    fn get_webhook_locked(conn: &Connection, id: Uuid) -> Result<Option<Webhook>> {
        let webhook = conn
            .query_row(
                &format!("SELECT {} FROM webhooks WHERE id = ?1", WEBHOOK_COLUMNS),
                params![id.to_string()],
                Self::row_to_webhook,
            )
            .optional()?;
        Ok(webhook)
    }
}

impl BackupStore for SqliteStore {
    fn create_backup(&self, params: &BackupJobParams) -> Result<BackupJob> {
        let conn = self.lock()?;
        let now = Utc::now();
        let job = BackupJob {
            id: Uuid::new_v4(),
            name: params.name.clone(),
            database_id: params.database_id,
            destination_id: params.destination_id,
            cron_expression: params.cron_expression.clone(),
            retention_days: params.retention_days,
            is_active: params.is_active,
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            &format!(
                "INSERT INTO backups ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                BACKUP_COLUMNS
            ),
            params![
                job.id.to_string(),
                job.name,
                job.database_id.to_string(),
                job.destination_id.to_string(),
                job.cron_expression,
                job.retention_days as i64,
                job.is_active as i64,
                Self::format_datetime(&job.created_at),
                Self::format_datetime(&job.updated_at),
            ],
        )?;

        Ok(job)
    }

    fn get_backup(&self, id: Uuid) -> Result<Option<BackupJob>> {
        let conn = self.lock()?;
        let job = conn
            .query_row(
                &format!("SELECT {} FROM backups WHERE id = ?1", BACKUP_COLUMNS),
                params![id.to_string()],
                Self::row_to_backup,
            )
            .optional()?;
        Ok(job)
    }

    fn list_backups(&self) -> Result<Vec<BackupJob>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM backups ORDER BY created_at DESC",
            BACKUP_COLUMNS
        ))?;
        let jobs = stmt
            .query_map([], Self::row_to_backup)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn update_backup(&self, id: Uuid, params: &BackupJobParams) -> Result<Option<BackupJob>> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE backups SET name = ?1, database_id = ?2, destination_id = ?3,
                 cron_expression = ?4, retention_days = ?5, is_active = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                params.name,
                params.database_id.to_string(),
                params.destination_id.to_string(),
                params.cron_expression,
                params.retention_days as i64,
                params.is_active as i64,
                Self::format_datetime(&Utc::now()),
                id.to_string(),
            ],
        )?;
        if updated == 0 {
            return Ok(None);
        }

        let job = conn
            .query_row(
                &format!("SELECT {} FROM backups WHERE id = ?1", BACKUP_COLUMNS),
                params![id.to_string()],
                Self::row_to_backup,
            )
            .optional()?;
        Ok(job)
    }

    fn delete_backup(&self, id: Uuid) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM backups WHERE id = ?1", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    fn get_schedule_state(&self, backup_id: Uuid) -> Result<Option<BackupScheduleState>> {
        let conn = self.lock()?;
        let state = conn
            .query_row(
                "SELECT backup_id, next_run_at, last_run_at FROM backup_schedules
                 WHERE backup_id = ?1",
                params![backup_id.to_string()],
                Self::row_to_schedule_state,
            )
            .optional()?;
        Ok(state)
    }

    fn update_schedule_state(&self, state: &BackupScheduleState) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO backup_schedules (backup_id, next_run_at, last_run_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(backup_id) DO UPDATE SET
                 next_run_at = excluded.next_run_at,
                 last_run_at = excluded.last_run_at",
            params![
                state.backup_id.to_string(),
                Self::format_datetime(&state.next_run_at),
                state.last_run_at.as_ref().map(Self::format_datetime),
            ],
        )?;
        Ok(())
    }
}

impl ExecutionStore for SqliteStore {
    fn create_execution(&self, new: &NewExecution) -> Result<Execution> {
        let conn = self.lock()?;
        let execution = Execution {
            id: Uuid::new_v4(),
            backup_id: new.backup_id,
            database_id: new.database_id,
            destination_id: new.destination_id,
            status: ExecutionStatus::Queued,
            path: None,
            file_size: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        };

        conn.execute(
            "INSERT INTO executions (id, backup_id, database_id, destination_id, status, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                execution.id.to_string(),
                execution.backup_id.map(|id| id.to_string()),
                execution.database_id.to_string(),
                execution.destination_id.to_string(),
                execution.status.as_str(),
                Self::format_datetime(&execution.started_at),
            ],
        )?;

        Ok(execution)
    }

    fn set_running(&self, id: Uuid) -> Result<Execution> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE executions SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![
                ExecutionStatus::Running.as_str(),
                id.to_string(),
                ExecutionStatus::Queued.as_str(),
            ],
        )?;
        if updated == 0 {
            bail!("Execution {} is not queued", id);
        }
        Self::get_execution_locked(&conn, id)?
            .with_context(|| format!("Execution {} vanished", id))
    }

    fn set_terminal(&self, id: Uuid, outcome: &TerminalOutcome) -> Result<Execution> {
        let conn = self.lock()?;
        let current = Self::get_execution_locked(&conn, id)?
            .with_context(|| format!("Execution {} not found", id))?;
        if current.status.is_terminal() {
            bail!(
                "Execution {} already finished with status {}",
                id,
                current.status.as_str()
            );
        }

        let finished_at = Utc::now().max(current.started_at);
        let (path, file_size, error) = match outcome {
            TerminalOutcome::Success { file_size, path } => {
                (Some(path.clone()), Some(*file_size as i64), None)
            }
            TerminalOutcome::Failed { error } => (None, None, Some(error.clone())),
        };

        conn.execute(
            "UPDATE executions SET status = ?1, path = ?2, file_size = ?3, error = ?4,
                 finished_at = ?5
             WHERE id = ?6 AND status IN (?7, ?8)",
            params![
                outcome.status().as_str(),
                path,
                file_size,
                error,
                Self::format_datetime(&finished_at),
                id.to_string(),
                ExecutionStatus::Queued.as_str(),
                ExecutionStatus::Running.as_str(),
            ],
        )?;

        Self::get_execution_locked(&conn, id)?
            .with_context(|| format!("Execution {} vanished", id))
    }

    fn get_execution(&self, id: Uuid) -> Result<Option<Execution>> {
        let conn = self.lock()?;
        Self::get_execution_locked(&conn, id)
    }

    fn paginate_executions(
        &self,
        filter: &ExecutionFilter,
        page: PageRequest,
    ) -> Result<(PageInfo, Vec<Execution>)> {
        if !page.is_valid() {
            bail!("Invalid page request {:?}", page);
        }

        let mut clauses = Vec::new();
        let mut args: Vec<String> = Vec::new();
        for (column, value) in [
            ("database_id", filter.database_id),
            ("destination_id", filter.destination_id),
            ("backup_id", filter.backup_id),
        ] {
            if let Some(value) = value {
                args.push(value.to_string());
                clauses.push(format!("{} = ?{}", column, args.len()));
            }
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let conn = self.lock()?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM executions {}", where_sql),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM executions {} ORDER BY started_at DESC, id DESC LIMIT {} OFFSET {}",
            EXECUTION_COLUMNS,
            where_sql,
            page.limit,
            page.offset()
        ))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), Self::row_to_execution)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((PageInfo::new(page, total as u64), rows))
    }

    fn fail_unfinished_executions(&self, error: &str) -> Result<usize> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE executions SET status = ?1, error = ?2, finished_at = ?3
             WHERE status IN (?4, ?5)",
            params![
                ExecutionStatus::Failed.as_str(),
                error,
                Self::format_datetime(&Utc::now()),
                ExecutionStatus::Queued.as_str(),
                ExecutionStatus::Running.as_str(),
            ],
        )?;
        Ok(updated)
    }
}

impl WebhookStore for SqliteStore {
    fn create_webhook(&self, params: &WebhookParams) -> Result<Webhook> {
        let conn = self.lock()?;
        let now = Utc::now();
        let webhook = Webhook {
            id: Uuid::new_v4(),
            name: params.name.clone(),
            event_type: params.event_type,
            target_ids: params.target_ids.clone(),
            is_active: params.is_active,
            method: params.method,
            url: params.url.clone(),
            headers: params.headers.clone(),
            body: params.body.clone(),
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            &format!(
                "INSERT INTO webhooks ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                WEBHOOK_COLUMNS
            ),
            params![
                webhook.id.to_string(),
                webhook.name,
                webhook.event_type.as_str(),
                serde_json::to_string(&webhook.target_ids)?,
                webhook.is_active as i64,
                webhook.method.as_str(),
                webhook.url,
                Self::json_or_null(&webhook.headers)?,
                Self::json_or_null(&webhook.body)?,
                Self::format_datetime(&webhook.created_at),
                Self::format_datetime(&webhook.updated_at),
            ],
        )?;

        Ok(webhook)
    }

    fn get_webhook(&self, id: Uuid) -> Result<Option<Webhook>> {
        let conn = self.lock()?;
        Self::get_webhook_locked(&conn, id)
    }

    fn update_webhook(&self, id: Uuid, params: &WebhookParams) -> Result<Option<Webhook>> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE webhooks SET name = ?1, event_type = ?2, target_ids = ?3, is_active = ?4,
                 method = ?5, url = ?6, headers = ?7, body = ?8, updated_at = ?9
             WHERE id = ?10",
            params![
                params.name,
                params.event_type.as_str(),
                serde_json::to_string(&params.target_ids)?,
                params.is_active as i64,
                params.method.as_str(),
                params.url,
                Self::json_or_null(&params.headers)?,
                Self::json_or_null(&params.body)?,
                Self::format_datetime(&Utc::now()),
                id.to_string(),
            ],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        Self::get_webhook_locked(&conn, id)
    }

    fn delete_webhook(&self, id: Uuid) -> Result<bool> {
        let conn = self.lock()?;
        let deleted =
            conn.execute("DELETE FROM webhooks WHERE id = ?1", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    fn paginate_webhooks(&self, page: PageRequest) -> Result<(PageInfo, Vec<Webhook>)> {
        if !page.is_valid() {
            bail!("Invalid page request {:?}", page);
        }
        let conn = self.lock()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM webhooks", [], |row| row.get(0))?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM webhooks ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
            WEBHOOK_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                params![page.limit as i64, page.offset() as i64],
                Self::row_to_webhook,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((PageInfo::new(page, total as u64), rows))
    }

    fn list_active_webhooks_for(&self, event_type: EventType) -> Result<Vec<Webhook>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM webhooks WHERE event_type = ?1 AND is_active = 1
             ORDER BY created_at ASC",
            WEBHOOK_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![event_type.as_str()], Self::row_to_webhook)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn record_webhook_execution(&self, record: &WebhookExecution) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO webhook_executions ({})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                WEBHOOK_EXECUTION_COLUMNS
            ),
            params![
                record.id.to_string(),
                record.webhook_id.to_string(),
                record.event_id.to_string(),
                record.event_type.as_str(),
                record.status.as_str(),
                record.attempts as i64,
                record.request_method.as_str(),
                record.request_url,
                record.request_body,
                record.response_status.map(|s| s as i64),
                record.error,
                record.duration_ms,
                Self::format_datetime(&record.created_at),
            ],
        )?;
        Ok(())
    }

    fn paginate_webhook_executions(
        &self,
        webhook_id: Uuid,
        page: PageRequest,
    ) -> Result<(PageInfo, Vec<WebhookExecution>)> {
        if !page.is_valid() {
            bail!("Invalid page request {:?}", page);
        }
        let conn = self.lock()?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM webhook_executions WHERE webhook_id = ?1",
            params![webhook_id.to_string()],
            |row| row.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM webhook_executions WHERE webhook_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
            WEBHOOK_EXECUTION_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                params![
                    webhook_id.to_string(),
                    page.limit as i64,
                    page.offset() as i64
                ],
                Self::row_to_webhook_execution,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((PageInfo::new(page, total as u64), rows))
    }
}
