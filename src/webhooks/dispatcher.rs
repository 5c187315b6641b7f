//! Matches bus events to webhooks and delivers them.
//!
//! Deliveries move through three queues owned by the dispatcher loop: `ready`
//! (waiting for a free slot), `retries` (waiting out a backoff) and
//! `in_flight` (an HTTP attempt running). The sum of the three is bounded by
//! `max_pending_deliveries`; when it is reached the loop stops reading the bus
//! and publishers block.

use super::client::{WebhookClient, WebhookRequest};
use super::retry_policy::{classify_status, RetryPolicy};
use super::template::build_request;
use crate::config::WebhookSettings;
use crate::error::{EngineError, EngineResult};
use crate::events::{Event, EventBus, EventSubscription};
use crate::metrics;
use crate::store::{DeliveryStatus, EngineStore, Webhook, WebhookExecution};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One event on its way to one webhook, across all of its attempts.
struct Delivery {
    id: Uuid,
    webhook_id: Uuid,
    event: Event,
    request: WebhookRequest,
    attempts: u32,
    created_at: DateTime<Utc>,
    first_attempt: Option<Instant>,
    response_status: Option<u16>,
    /// Set for manual triggers, which wait for the outcome.
    reply: Option<oneshot::Sender<WebhookExecution>>,
}

impl Delivery {
    fn new(webhook: &Webhook, event: Event) -> Self {
        let request = build_request(webhook, &event);
        Self {
            id: Uuid::new_v4(),
            webhook_id: webhook.id,
            event,
            request,
            attempts: 0,
            created_at: Utc::now(),
            first_attempt: None,
            response_status: None,
            reply: None,
        }
    }

    fn into_record(
        self,
        status: DeliveryStatus,
        error: Option<String>,
    ) -> (WebhookExecution, Option<oneshot::Sender<WebhookExecution>>) {
        let duration_ms = (Utc::now() - self.created_at).num_milliseconds().max(0);
        let record = WebhookExecution {
            id: self.id,
            webhook_id: self.webhook_id,
            event_id: self.event.id,
            event_type: self.event.event_type,
            status,
            attempts: self.attempts,
            request_method: self.request.method,
            request_url: self.request.url,
            request_body: self.request.body,
            response_status: self.response_status,
            error,
            duration_ms,
            created_at: self.created_at,
        };
        (record, self.reply)
    }
}

enum DispatcherCommand {
    Deliver {
        webhook: Webhook,
        event: Event,
        response: oneshot::Sender<WebhookExecution>,
    },
}

/// Handle for submitting deliveries that bypass event matching.
#[derive(Clone)]
pub struct DispatcherHandle {
    command_tx: mpsc::Sender<DispatcherCommand>,
}

impl DispatcherHandle {
    /// Delivers `event` to `webhook` with the normal retry policy and waits
    /// for the recorded outcome.
    pub async fn deliver(&self, webhook: Webhook, event: Event) -> EngineResult<WebhookExecution> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(DispatcherCommand::Deliver {
                webhook,
                event,
                response: tx,
            })
            .await
            .map_err(|_| dispatcher_stopped())?;
        rx.await.map_err(|_| dispatcher_stopped())
    }
}

fn dispatcher_stopped() -> EngineError {
    EngineError::Cancelled("webhook dispatcher is not running".to_string())
}

pub struct WebhookDispatcher {
    store: Arc<dyn EngineStore>,
    client: Arc<dyn WebhookClient>,
    policy: RetryPolicy,
    settings: WebhookSettings,
    subscription: EventSubscription,
    command_receiver: mpsc::Receiver<DispatcherCommand>,
    shutdown_token: CancellationToken,

    ready: VecDeque<Delivery>,
    retries: DelayQueue<Delivery>,
    in_flight: JoinSet<(Delivery, EngineResult<u16>)>,
}

/// Create a dispatcher subscribed to `events`, and its handle.
pub fn create_dispatcher(
    store: Arc<dyn EngineStore>,
    client: Arc<dyn WebhookClient>,
    settings: WebhookSettings,
    events: &EventBus,
    shutdown_token: CancellationToken,
) -> (WebhookDispatcher, DispatcherHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let dispatcher = WebhookDispatcher {
        store,
        client,
        policy: RetryPolicy::new(&settings),
        settings,
        subscription: events.subscribe(),
        command_receiver: command_rx,
        shutdown_token,
        ready: VecDeque::new(),
        retries: DelayQueue::new(),
        in_flight: JoinSet::new(),
    };
    (dispatcher, DispatcherHandle { command_tx })
}

impl WebhookDispatcher {
    fn pending(&self) -> usize {
        self.ready.len() + self.retries.len() + self.in_flight.len()
    }

    pub async fn run(&mut self) {
        info!(
            "Starting webhook dispatcher (max {} concurrent deliveries)",
            self.settings.max_concurrent_deliveries
        );
        let mut events_open = true;
        let mut commands_open = true;

        loop {
            self.start_ready_deliveries();
            let has_room = self.pending() < self.settings.max_pending_deliveries;

            tokio::select! {
                event = self.subscription.recv(), if events_open && has_room => {
                    match event {
                        Some(event) => self.enqueue_matches(event),
                        None => events_open = false,
                    }
                }
                cmd = self.command_receiver.recv(), if commands_open => {
                    match cmd {
                        Some(DispatcherCommand::Deliver { webhook, event, response }) => {
                            info!("Manual delivery of event {} to webhook {}", event.id, webhook.id);
                            let mut delivery = Delivery::new(&webhook, event);
                            delivery.reply = Some(response);
                            self.ready.push_back(delivery);
                        }
                        None => commands_open = false,
                    }
                }
                Some(expired) = self.retries.next(), if !self.retries.is_empty() => {
                    self.ready.push_back(expired.into_inner());
                }
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    match joined {
                        Ok((delivery, result)) => self.handle_attempt(delivery, result),
                        Err(e) => error!("Webhook delivery task failed: {}", e),
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Webhook dispatcher received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Webhook dispatcher stopped");
    }

    fn enqueue_matches(&mut self, event: Event) {
        let Some(subject) = event.backup_id else {
            debug!("Event {} ({}) has no subject, nothing to deliver", event.id, event.event_type);
            return;
        };

        let webhooks = match self.store.list_active_webhooks_for(event.event_type) {
            Ok(webhooks) => webhooks,
            Err(e) => {
                error!("Failed to load webhooks for event {}: {}", event.id, e);
                return;
            }
        };

        for webhook in webhooks.iter().filter(|w| w.targets(subject)) {
            debug!("Event {} matched webhook {}", event.id, webhook.id);
            self.ready.push_back(Delivery::new(webhook, event.clone()));
        }
    }

    fn start_ready_deliveries(&mut self) {
        while self.in_flight.len() < self.settings.max_concurrent_deliveries {
            let Some(mut delivery) = self.ready.pop_front() else {
                break;
            };
            delivery.first_attempt.get_or_insert_with(Instant::now);
            let client = Arc::clone(&self.client);
            self.in_flight.spawn(async move {
                let result = client.send(&delivery.request).await;
                (delivery, result)
            });
        }
    }

    fn handle_attempt(&mut self, mut delivery: Delivery, result: EngineResult<u16>) {
        delivery.attempts += 1;
        metrics::record_webhook_attempt();

        // Only the latest attempt's status is kept.
        delivery.response_status = result.as_ref().ok().copied();
        let outcome = result.and_then(classify_status);

        match outcome {
            Ok(()) => {
                info!(
                    "Webhook {} delivered event {} after {} attempt(s)",
                    delivery.webhook_id, delivery.event.id, delivery.attempts
                );
                self.finish(delivery, DeliveryStatus::Success, None);
            }
            Err(e) => {
                let elapsed = delivery
                    .first_attempt
                    .map(|t| t.elapsed())
                    .unwrap_or_default();
                if self.policy.should_retry(&e, delivery.attempts, elapsed) {
                    let backoff = self.policy.backoff(delivery.attempts);
                    warn!(
                        "Webhook {} attempt {} failed: {}. Retrying in {:?}",
                        delivery.webhook_id, delivery.attempts, e, backoff
                    );
                    self.retries.insert(delivery, backoff);
                } else {
                    warn!(
                        "Webhook {} gave up on event {} after {} attempt(s): {}",
                        delivery.webhook_id, delivery.event.id, delivery.attempts, e
                    );
                    self.finish(delivery, DeliveryStatus::Failed, Some(e.to_string()));
                }
            }
        }
    }

    fn finish(&self, delivery: Delivery, status: DeliveryStatus, error: Option<String>) {
        let (record, reply) = delivery.into_record(status, error);
        metrics::record_webhook_delivery(status.as_str());
        if let Err(e) = self.store.record_webhook_execution(&record) {
            error!("Failed to record delivery {}: {}", record.id, e);
        }
        if let Some(reply) = reply {
            let _ = reply.send(record);
        }
    }

    /// Lets running attempts finish within the grace period. Queued and
    /// backing-off deliveries are abandoned.
    async fn shutdown(&mut self) {
        let abandoned = self.ready.len() + self.retries.len();
        if abandoned > 0 {
            warn!("Abandoning {} queued webhook deliveries", abandoned);
        }
        self.ready.clear();
        self.retries.clear();

        let grace = self.settings.shutdown_grace;
        let deadline = tokio::time::Instant::now() + grace;
        while !self.in_flight.is_empty() {
            match tokio::time::timeout_at(deadline, self.in_flight.join_next()).await {
                Ok(Some(Ok((delivery, result)))) => {
                    self.handle_attempt(delivery, result);
                    // No further attempts once shutting down.
                    self.ready.clear();
                    self.retries.clear();
                }
                Ok(Some(Err(e))) => error!("Webhook delivery task failed: {}", e),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "{} webhook deliveries still running after {:?}, aborting",
                        self.in_flight.len(),
                        grace
                    );
                    self.in_flight.abort_all();
                    break;
                }
            }
        }
    }
}
