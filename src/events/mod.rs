//! Lifecycle events and the in-process bus that fans them out.

mod bus;

pub use bus::{EventBus, EventSubscription};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use crate::error::EngineError;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Closed set of event types a webhook may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "backup.created")]
    BackupCreated,
    #[serde(rename = "backup.updated")]
    BackupUpdated,
    #[serde(rename = "backup.duplicated")]
    BackupDuplicated,
    #[serde(rename = "backup.deleted")]
    BackupDeleted,
    #[serde(rename = "backup.execution.started")]
    ExecutionStarted,
    #[serde(rename = "backup.execution.success")]
    ExecutionSuccess,
    #[serde(rename = "backup.execution.failed")]
    ExecutionFailed,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::BackupCreated,
        EventType::BackupUpdated,
        EventType::BackupDuplicated,
        EventType::BackupDeleted,
        EventType::ExecutionStarted,
        EventType::ExecutionSuccess,
        EventType::ExecutionFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::BackupCreated => "backup.created",
            EventType::BackupUpdated => "backup.updated",
            EventType::BackupDuplicated => "backup.duplicated",
            EventType::BackupDeleted => "backup.deleted",
            EventType::ExecutionStarted => "backup.execution.started",
            EventType::ExecutionSuccess => "backup.execution.success",
            EventType::ExecutionFailed => "backup.execution.failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| EngineError::validation(format!("unknown event type {:?}", s)))
    }
}

/// An immutable notification of a state transition.
///
/// `payload` is a snapshot taken when the event is built; consumers never
/// re-read the store to render it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: EventType,
    /// The backup job the event concerns. None for ad-hoc executions.
    pub backup_id: Option<Uuid>,
    pub execution_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
    pub payload: Value,
}

impl Event {
    pub fn new(event_type: EventType, backup_id: Option<Uuid>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            backup_id,
            execution_id: None,
            occurred_at: Utc::now(),
            payload,
        }
    }

    pub fn with_execution(mut self, execution_id: Uuid) -> Self {
        self.execution_id = Some(execution_id);
        self
    }

    /// Flat JSON document used for webhook templating and default bodies.
    pub fn to_json(&self) -> Value {
        json!({
            "event_id": self.id,
            "event_type": self.event_type.as_str(),
            "occurred_at": self.occurred_at.to_rfc3339(),
            "backup_id": self.backup_id,
            "execution_id": self.execution_id,
            "payload": self.payload,
        })
    }
}
