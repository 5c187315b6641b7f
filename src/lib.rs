//! Backup execution and notification engine.
//!
//! Runs database backup jobs on cron schedules or on demand, tracks each run
//! as a durable execution record, and notifies webhook subscribers of the
//! lifecycle events.

pub mod config;
pub mod database;
pub mod destination;
pub mod engine;
pub mod error;
pub mod events;
pub mod metrics;
pub mod runner;
pub mod scheduler;
pub mod sqlite_persistence;
pub mod store;
pub mod webhooks;

// Re-export commonly used types for convenience
pub use engine::{BackupEngine, EngineComponents, EngineRuntime, EngineSettings};
pub use error::{EngineError, EngineResult};
pub use events::{Event, EventBus, EventType};
pub use store::SqliteStore;
