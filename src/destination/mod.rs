//! Storage targets backup artifacts are streamed into.

mod local;

pub use local::LocalDestination;

use crate::error::EngineResult;
use async_trait::async_trait;
use tokio::io::AsyncWrite;
use uuid::Uuid;

/// What a closed writer reports about the artifact it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationReceipt {
    /// Backend specific location of the artifact.
    pub path: String,
    pub bytes_written: u64,
}

/// A streaming sink for one artifact.
///
/// Callers must end every writer with either `close` or `abort`.
#[async_trait]
pub trait DestinationWriter: AsyncWrite + Send + Unpin {
    /// Flushes and commits the artifact.
    async fn close(self: Box<Self>) -> EngineResult<DestinationReceipt>;

    /// Discards whatever was written so far.
    async fn abort(self: Box<Self>);
}

/// Uniform write interface over a storage backend.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Opens a writer for `file_name` in the destination identified by
    /// `destination_id`. Fails with `NotFound` for unknown destinations.
    async fn open(
        &self,
        destination_id: Uuid,
        file_name: &str,
    ) -> EngineResult<Box<dyn DestinationWriter>>;
}
