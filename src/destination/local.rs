use super::{Destination, DestinationReceipt, DestinationWriter};
use crate::config::DestinationConfig;
use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

/// Destination backed by directories on the local filesystem.
pub struct LocalDestination {
    roots: HashMap<Uuid, PathBuf>,
}

impl LocalDestination {
    pub fn new(destinations: &[DestinationConfig]) -> Self {
        Self {
            roots: destinations
                .iter()
                .map(|d| (d.id, PathBuf::from(&d.path)))
                .collect(),
        }
    }

    pub fn with_root(mut self, destination_id: Uuid, root: impl Into<PathBuf>) -> Self {
        self.roots.insert(destination_id, root.into());
        self
    }
}

#[async_trait]
impl Destination for LocalDestination {
    async fn open(
        &self,
        destination_id: Uuid,
        file_name: &str,
    ) -> EngineResult<Box<dyn DestinationWriter>> {
        let root = self
            .roots
            .get(&destination_id)
            .ok_or_else(|| EngineError::not_found("Destination", destination_id))?;

        if file_name.is_empty() || file_name.contains('/') || file_name.contains("..") {
            return Err(EngineError::validation(format!(
                "invalid artifact name {:?}",
                file_name
            )));
        }

        tokio::fs::create_dir_all(root).await?;
        let path = root.join(file_name);
        let file = File::create(&path).await?;
        debug!("Opened local artifact {:?}", path);

        Ok(Box::new(LocalFileWriter {
            file,
            path,
            bytes_written: 0,
        }))
    }
}

struct LocalFileWriter {
    file: File,
    path: PathBuf,
    bytes_written: u64,
}

impl AsyncWrite for LocalFileWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.file).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = poll {
            self.bytes_written += n as u64;
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_shutdown(cx)
    }
}

#[async_trait]
impl DestinationWriter for LocalFileWriter {
    async fn close(mut self: Box<Self>) -> EngineResult<DestinationReceipt> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(DestinationReceipt {
            path: self.path.to_string_lossy().to_string(),
            bytes_written: self.bytes_written,
        })
    }

    async fn abort(self: Box<Self>) {
        let LocalFileWriter { file, path, .. } = *self;
        drop(file);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("Failed to remove partial artifact {:?}: {}", path, e);
        }
    }
}
