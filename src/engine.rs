//! Entry points for the dashboard layer.
//!
//! [`EngineRuntime::start`] wires the runner, scheduler and webhook
//! dispatcher around one store and event bus. [`BackupEngine`] is the cheap,
//! cloneable facade callers use for every command and query.

use crate::config::{AppConfig, EventBusSettings, SchedulerSettings, WebhookSettings};
use crate::database::DatabaseDumper;
use crate::destination::Destination;
use crate::error::{EngineError, EngineResult};
use crate::events::{Event, EventBus, EventType};
use crate::runner::BackupRunner;
use crate::scheduler::{create_scheduler, parse_cron, SchedulerHandle};
use crate::store::{
    BackupJob, BackupJobParams, EngineStore, Execution, ExecutionFilter, PageInfo, PageRequest,
    Webhook, WebhookExecution, WebhookParams,
};
use crate::webhooks::{create_dispatcher, DispatcherHandle, WebhookClient};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

/// External collaborators the engine drives.
pub struct EngineComponents {
    pub store: Arc<dyn EngineStore>,
    pub dumper: Arc<dyn DatabaseDumper>,
    pub destination: Arc<dyn Destination>,
    pub webhook_client: Arc<dyn WebhookClient>,
}

#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub scheduler: SchedulerSettings,
    pub event_bus: EventBusSettings,
    pub webhooks: WebhookSettings,
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            scheduler: config.scheduler.clone(),
            event_bus: config.event_bus.clone(),
            webhooks: config.webhooks.clone(),
        }
    }
}

/// Background tasks of a started engine.
pub struct EngineRuntime {
    engine: BackupEngine,
    scheduler_shutdown: CancellationToken,
    dispatcher_shutdown: CancellationToken,
    scheduler_task: JoinHandle<()>,
    dispatcher_task: JoinHandle<()>,
}

impl EngineRuntime {
    /// Recovers unfinished executions, loads active jobs and spawns the
    /// scheduler and dispatcher loops. Must be called within a tokio runtime.
    pub fn start(components: EngineComponents, settings: EngineSettings) -> EngineResult<Self> {
        let EngineComponents {
            store,
            dumper,
            destination,
            webhook_client,
        } = components;

        let events = EventBus::new(settings.event_bus.capacity);
        let runner = BackupRunner::new(store.clone(), dumper, destination, events.clone());

        let dispatcher_shutdown = CancellationToken::new();
        let (mut dispatcher, dispatcher_handle) = create_dispatcher(
            store.clone(),
            webhook_client,
            settings.webhooks,
            &events,
            dispatcher_shutdown.clone(),
        );

        let scheduler_shutdown = CancellationToken::new();
        let (mut scheduler, scheduler_handle) = create_scheduler(
            runner,
            store.clone(),
            settings.scheduler,
            scheduler_shutdown.clone(),
        );
        scheduler.init()?;

        let scheduler_task = tokio::spawn(async move { scheduler.run().await });
        let dispatcher_task = tokio::spawn(async move { dispatcher.run().await });

        Ok(Self {
            engine: BackupEngine {
                store,
                events,
                scheduler: scheduler_handle,
                dispatcher: dispatcher_handle,
            },
            scheduler_shutdown,
            dispatcher_shutdown,
            scheduler_task,
            dispatcher_task,
        })
    }

    pub fn engine(&self) -> &BackupEngine {
        &self.engine
    }

    /// Stops the scheduler first, so the terminal events of cancelled runs
    /// reach the dispatcher, then stops the dispatcher.
    pub async fn shutdown(self) {
        info!("Shutting down backup engine...");
        self.scheduler_shutdown.cancel();
        if let Err(e) = self.scheduler_task.await {
            error!("Scheduler task failed: {}", e);
        }
        self.dispatcher_shutdown.cancel();
        if let Err(e) = self.dispatcher_task.await {
            error!("Dispatcher task failed: {}", e);
        }
        info!("Backup engine stopped");
    }
}

#[derive(Clone)]
pub struct BackupEngine {
    store: Arc<dyn EngineStore>,
    events: EventBus,
    scheduler: SchedulerHandle,
    dispatcher: DispatcherHandle,
}

impl BackupEngine {
    // =========================================================================
    // Backup jobs
    // =========================================================================

    pub async fn create_backup_job(&self, params: BackupJobParams) -> EngineResult<BackupJob> {
        validate_backup(&params)?;
        let job = self.store.create_backup(&params)?;
        self.scheduler.upsert(job.clone()).await?;
        info!("Created backup job {} ({})", job.id, job.name);
        self.publish(EventType::BackupCreated, job.id, json!({ "backup": job }))
            .await;
        Ok(job)
    }

    pub async fn update_backup_job(
        &self,
        id: Uuid,
        params: BackupJobParams,
    ) -> EngineResult<BackupJob> {
        validate_backup(&params)?;
        let job = self
            .store
            .update_backup(id, &params)?
            .ok_or_else(|| EngineError::not_found("Backup", id))?;
        self.scheduler.upsert(job.clone()).await?;
        info!("Updated backup job {}", job.id);
        self.publish(EventType::BackupUpdated, job.id, json!({ "backup": job }))
            .await;
        Ok(job)
    }

    /// Removes the job from the schedule and the store. A run already in
    /// progress finishes; its execution keeps its history with no job.
    pub async fn delete_backup_job(&self, id: Uuid) -> EngineResult<()> {
        let job = self.get_backup_job(id)?;
        self.scheduler.remove(id).await?;
        if !self.store.delete_backup(id)? {
            return Err(EngineError::not_found("Backup", id));
        }
        info!("Deleted backup job {}", id);
        self.publish(EventType::BackupDeleted, id, json!({ "backup": job }))
            .await;
        Ok(())
    }

    /// Copies the job under a new id and schedules the copy independently.
    pub async fn duplicate_backup_job(&self, id: Uuid) -> EngineResult<BackupJob> {
        let source = self.get_backup_job(id)?;
        let mut params = BackupJobParams::from(&source);
        params.name = format!("{} (copy)", source.name);

        let copy = self.store.create_backup(&params)?;
        self.scheduler.upsert(copy.clone()).await?;
        info!("Duplicated backup job {} as {}", id, copy.id);
        self.publish(
            EventType::BackupDuplicated,
            id,
            json!({ "backup": copy, "source_backup_id": id }),
        )
        .await;
        Ok(copy)
    }

    pub fn get_backup_job(&self, id: Uuid) -> EngineResult<BackupJob> {
        self.store
            .get_backup(id)?
            .ok_or_else(|| EngineError::not_found("Backup", id))
    }

    pub fn list_backup_jobs(&self) -> EngineResult<Vec<BackupJob>> {
        Ok(self.store.list_backups()?)
    }

    // =========================================================================
    // Runs
    // =========================================================================

    /// Starts a run of `id` now and returns its `running` execution.
    /// Fails with `Conflict` while the job already has a running execution.
    pub async fn trigger_now(&self, id: Uuid) -> EngineResult<Execution> {
        self.scheduler.trigger_now(id).await
    }

    pub async fn run_ad_hoc(
        &self,
        database_id: Uuid,
        destination_id: Uuid,
    ) -> EngineResult<Execution> {
        self.scheduler.run_ad_hoc(database_id, destination_id).await
    }

    pub async fn next_run_at(&self, id: Uuid) -> EngineResult<Option<DateTime<Utc>>> {
        self.scheduler.next_run_at(id).await
    }

    // =========================================================================
    // Executions
    // =========================================================================

    pub fn list_executions(
        &self,
        filter: &ExecutionFilter,
        page: PageRequest,
    ) -> EngineResult<(PageInfo, Vec<Execution>)> {
        validate_page(page)?;
        Ok(self.store.paginate_executions(filter, page)?)
    }

    pub fn get_execution(&self, id: Uuid) -> EngineResult<Execution> {
        self.store
            .get_execution(id)?
            .ok_or_else(|| EngineError::not_found("Execution", id))
    }

    // =========================================================================
    // Webhooks
    // =========================================================================

    pub fn create_webhook(&self, params: WebhookParams) -> EngineResult<Webhook> {
        validate_webhook(&params)?;
        let webhook = self.store.create_webhook(&params)?;
        info!(
            "Created webhook {} for {} on {} target(s)",
            webhook.id,
            webhook.event_type,
            webhook.target_ids.len()
        );
        Ok(webhook)
    }

    pub fn update_webhook(&self, id: Uuid, params: WebhookParams) -> EngineResult<Webhook> {
        validate_webhook(&params)?;
        self.store
            .update_webhook(id, &params)?
            .ok_or_else(|| EngineError::not_found("Webhook", id))
    }

    /// Deletes the webhook together with its delivery log.
    pub fn delete_webhook(&self, id: Uuid) -> EngineResult<()> {
        if !self.store.delete_webhook(id)? {
            return Err(EngineError::not_found("Webhook", id));
        }
        info!("Deleted webhook {}", id);
        Ok(())
    }

    pub fn duplicate_webhook(&self, id: Uuid) -> EngineResult<Webhook> {
        let source = self.get_webhook(id)?;
        let mut params = WebhookParams::from(&source);
        params.name = format!("{} (copy)", source.name);
        Ok(self.store.create_webhook(&params)?)
    }

    pub fn get_webhook(&self, id: Uuid) -> EngineResult<Webhook> {
        self.store
            .get_webhook(id)?
            .ok_or_else(|| EngineError::not_found("Webhook", id))
    }

    pub fn list_webhooks(&self, page: PageRequest) -> EngineResult<(PageInfo, Vec<Webhook>)> {
        validate_page(page)?;
        Ok(self.store.paginate_webhooks(page)?)
    }

    /// Sends a test event of the webhook's own type, whether or not the
    /// webhook is active, and waits for the recorded outcome.
    pub async fn trigger_webhook_manually(&self, id: Uuid) -> EngineResult<WebhookExecution> {
        let webhook = self.get_webhook(id)?;
        let event = Event::new(
            webhook.event_type,
            webhook.target_ids.first().copied(),
            json!({ "test": true, "webhook_id": webhook.id }),
        );
        self.dispatcher.deliver(webhook, event).await
    }

    pub fn list_webhook_deliveries(
        &self,
        webhook_id: Uuid,
        page: PageRequest,
    ) -> EngineResult<(PageInfo, Vec<WebhookExecution>)> {
        validate_page(page)?;
        self.get_webhook(webhook_id)?;
        Ok(self.store.paginate_webhook_executions(webhook_id, page)?)
    }

    async fn publish(&self, event_type: EventType, backup_id: Uuid, payload: Value) {
        self.events
            .publish(Event::new(event_type, Some(backup_id), payload))
            .await;
    }
}

fn validate_page(page: PageRequest) -> EngineResult<()> {
    if !page.is_valid() {
        return Err(EngineError::validation(format!(
            "page and limit must be at least 1 (got page {}, limit {})",
            page.page, page.limit
        )));
    }
    Ok(())
}

fn validate_backup(params: &BackupJobParams) -> EngineResult<()> {
    if params.name.trim().is_empty() {
        return Err(EngineError::validation("backup name must not be empty"));
    }
    parse_cron(&params.cron_expression)?;
    Ok(())
}

fn validate_webhook(params: &WebhookParams) -> EngineResult<()> {
    if params.name.trim().is_empty() {
        return Err(EngineError::validation("webhook name must not be empty"));
    }
    if params.target_ids.is_empty() {
        return Err(EngineError::validation(
            "webhook must target at least one backup",
        ));
    }

    let url = reqwest::Url::parse(&params.url)
        .map_err(|e| EngineError::validation(format!("invalid url {:?}: {}", params.url, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(EngineError::validation(format!(
            "url scheme must be http or https, got {}",
            url.scheme()
        )));
    }

    match &params.headers {
        None => {}
        Some(Value::Object(map)) => {
            for (name, value) in map {
                reqwest::header::HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                    EngineError::validation(format!("invalid header name {:?}", name))
                })?;
                if value.is_object() || value.is_array() {
                    return Err(EngineError::validation(format!(
                        "header {:?} must have a scalar value",
                        name
                    )));
                }
            }
        }
        Some(_) => {
            return Err(EngineError::validation("headers must be a JSON object"));
        }
    }
    Ok(())
}
