use super::DatabaseDumper;
use crate::config::DatabaseConfig;
use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

const MAX_STDERR_BYTES: u64 = 8 * 1024;

/// Dumps PostgreSQL databases by spawning `pg_dump` and piping its stdout.
pub struct PgDumpDumper {
    pg_dump_path: String,
    databases: HashMap<Uuid, DatabaseConfig>,
}

impl PgDumpDumper {
    pub fn new(pg_dump_path: impl Into<String>, databases: &[DatabaseConfig]) -> Self {
        Self {
            pg_dump_path: pg_dump_path.into(),
            databases: databases.iter().map(|d| (d.id, d.clone())).collect(),
        }
    }
}

#[async_trait]
impl DatabaseDumper for PgDumpDumper {
    async fn dump(
        &self,
        database_id: Uuid,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> EngineResult<()> {
        let database = self
            .databases
            .get(&database_id)
            .ok_or_else(|| EngineError::not_found("Database", database_id))?;

        info!("Running {} for database {}", self.pg_dump_path, database.name);

        // The child is killed if this future is dropped mid-dump.
        let mut child = Command::new(&self.pg_dump_path)
            .arg("--no-password")
            .arg("--dbname")
            .arg(&database.connection_url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::TransientIo(format!("failed to spawn {}: {}", self.pg_dump_path, e))
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::TransientIo("pg_dump stdout not captured".into()))?;
        let stderr = child.stderr.take();

        let stderr_task = tokio::spawn(async move {
            let mut captured = String::new();
            if let Some(stderr) = stderr {
                let _ = stderr
                    .take(MAX_STDERR_BYTES)
                    .read_to_string(&mut captured)
                    .await;
            }
            captured
        });

        let copied = tokio::io::copy(&mut stdout, &mut *writer).await?;
        writer.flush().await?;
        let status = child.wait().await?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        debug!(
            "pg_dump for {} produced {} bytes ({})",
            database.name, copied, status
        );

        if !status.success() {
            return Err(EngineError::TransientIo(format!(
                "pg_dump exited with {}: {}",
                status,
                stderr_output.trim()
            )));
        }
        Ok(())
    }
}
