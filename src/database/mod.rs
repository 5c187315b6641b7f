//! Streaming database dumps.

mod pg_dump;

pub use pg_dump::PgDumpDumper;

use crate::error::EngineResult;
use async_trait::async_trait;
use tokio::io::AsyncWrite;
use uuid::Uuid;

/// Produces a dump of one database as a byte stream.
#[async_trait]
pub trait DatabaseDumper: Send + Sync {
    /// Streams the dump of `database_id` into `writer` without buffering it
    /// whole. Fails with `NotFound` for unknown databases and `TransientIo`
    /// for connection or process failures.
    async fn dump(
        &self,
        database_id: Uuid,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> EngineResult<()>;
}
