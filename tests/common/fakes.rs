//! In-process stand-ins for the database and storage collaborators.

use async_trait::async_trait;
use backup_engine::database::DatabaseDumper;
use backup_engine::destination::{Destination, DestinationReceipt, DestinationWriter};
use backup_engine::{EngineError, EngineResult};
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

/// Writes `size` bytes of filler after an optional delay.
#[derive(Clone)]
pub struct FakeDumper {
    pub size: usize,
    pub delay: Duration,
    pub fail_with: Option<String>,
}

impl FakeDumper {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            delay: Duration::ZERO,
            fail_with: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(message: &str) -> Self {
        Self {
            size: 0,
            delay: Duration::ZERO,
            fail_with: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl DatabaseDumper for FakeDumper {
    async fn dump(
        &self,
        _database_id: Uuid,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> EngineResult<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.fail_with {
            return Err(EngineError::TransientIo(message.clone()));
        }
        let chunk = vec![b'-'; 64 * 1024];
        let mut remaining = self.size;
        while remaining > 0 {
            let n = remaining.min(chunk.len());
            writer.write_all(&chunk[..n]).await?;
            remaining -= n;
        }
        Ok(())
    }
}

/// Keeps committed artifacts in memory, keyed by `<destination>/<file>`.
/// Any destination id is accepted.
#[derive(Clone, Default)]
pub struct MemoryDestination {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryDestination {
    pub fn files(&self) -> HashMap<String, Vec<u8>> {
        self.files.lock().unwrap().clone()
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    async fn open(
        &self,
        destination_id: Uuid,
        file_name: &str,
    ) -> EngineResult<Box<dyn DestinationWriter>> {
        Ok(Box::new(MemoryWriter {
            path: format!("{}/{}", destination_id, file_name),
            buffer: Vec::new(),
            files: Arc::clone(&self.files),
        }))
    }
}

struct MemoryWriter {
    path: String,
    buffer: Vec<u8>,
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.buffer.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl DestinationWriter for MemoryWriter {
    async fn close(self: Box<Self>) -> EngineResult<DestinationReceipt> {
        let MemoryWriter {
            path,
            buffer,
            files,
        } = *self;
        let bytes_written = buffer.len() as u64;
        files.lock().unwrap().insert(path.clone(), buffer);
        Ok(DestinationReceipt {
            path,
            bytes_written,
        })
    }

    async fn abort(self: Box<Self>) {}
}
