use super::Event;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// In-process fan-out of lifecycle events.
///
/// Every subscriber owns a bounded queue. `publish` waits for room in each
/// queue instead of dropping, so a slow subscriber slows producers down.
/// Events published by one task reach each subscriber in publish order.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<Event>>>>,
    capacity: usize,
}

/// Receiving side of one subscription.
pub struct EventSubscription {
    receiver: mpsc::Receiver<Event>,
}

impl EventSubscription {
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self) -> EventSubscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        EventSubscription { receiver: rx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Delivers `event` to every live subscriber, waiting while a queue is full.
    pub async fn publish(&self, event: Event) {
        let senders: Vec<mpsc::Sender<Event>> = match self.subscribers.lock() {
            Ok(subscribers) => subscribers.clone(),
            Err(_) => {
                warn!("Event bus subscriber list poisoned, dropping {}", event.id);
                return;
            }
        };

        debug!(
            "Publishing event {} ({}) to {} subscribers",
            event.id,
            event.event_type,
            senders.len()
        );

        let mut closed = false;
        for sender in &senders {
            if sender.send(event.clone()).await.is_err() {
                closed = true;
            }
        }

        if closed {
            if let Ok(mut subscribers) = self.subscribers.lock() {
                subscribers.retain(|s| !s.is_closed());
            }
        }
    }
}
