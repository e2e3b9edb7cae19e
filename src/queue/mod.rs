//! Queue gateway: accepts serialized chunks of notification ids for
//! asynchronous redelivery.
//!
//! The wire contract is one JSON array of `QueueEnvelope` per message. The
//! filesystem implementation writes each chunk as a file under the configured
//! queue directory and deletes it on ack; redelivery timing is whatever the
//! worker's poll loop does, the dispatch core itself never schedules.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::QueueEnvelope;

/// One pulled queue message with its ack receipt
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Opaque receipt used to ack (the chunk file path for the file gateway)
    pub receipt: String,
    pub envelopes: Vec<QueueEnvelope>,
}

/// Transport abstraction for queued redelivery
#[async_trait]
pub trait QueueGateway: Send + Sync {
    /// Publishes one chunk of envelopes as a single message
    async fn publish(&self, envelopes: &[QueueEnvelope]) -> AppResult<()>;

    /// Pulls up to `max` pending messages, oldest first
    async fn pull(&self, max: usize) -> AppResult<Vec<QueueMessage>>;

    /// Acknowledges a processed message; unacked messages are redelivered
    async fn ack(&self, message: &QueueMessage) -> AppResult<()>;

    /// Transport probe for the readiness endpoint. Implementations with a
    /// backing store to check override this.
    async fn healthy(&self) -> bool {
        true
    }
}

/// Filesystem-backed queue gateway (one JSON chunk file per message)
pub struct FileQueueGateway {
    dir: PathBuf,
}

impl FileQueueGateway {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn chunk_path(&self) -> PathBuf {
        // Millisecond prefix keeps directory listing in publish order
        let name = format!(
            "{}-{}.json",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().as_simple()
        );
        self.dir.join(name)
    }
}

#[async_trait]
impl QueueGateway for FileQueueGateway {
    async fn publish(&self, envelopes: &[QueueEnvelope]) -> AppResult<()> {
        if envelopes.is_empty() {
            return Ok(());
        }

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create queue directory: {}", e)))?;

        let payload = serde_json::to_vec(envelopes)
            .map_err(|e| AppError::Internal(format!("Failed to serialize queue chunk: {}", e)))?;

        let path = self.chunk_path();
        fs::write(&path, payload)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write queue chunk: {}", e)))?;

        log::debug!(
            "Published queue chunk of {} envelope(s) to {}",
            envelopes.len(),
            path.display()
        );

        Ok(())
    }

    async fn pull(&self, max: usize) -> AppResult<Vec<QueueMessage>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            // Nothing published yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(AppError::Internal(format!(
                    "Failed to read queue directory: {}",
                    e
                )))
            }
        };

        let mut paths: Vec<PathBuf> = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut messages = Vec::new();
        for path in paths.into_iter().take(max) {
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("Failed to read queue chunk {}: {}", path.display(), e);
                    continue;
                }
            };

            match serde_json::from_slice::<Vec<QueueEnvelope>>(&bytes) {
                Ok(envelopes) => messages.push(QueueMessage {
                    receipt: path.to_string_lossy().to_string(),
                    envelopes,
                }),
                Err(e) => {
                    // Quarantine malformed chunks so the loop does not spin on them
                    log::error!("Malformed queue chunk {}: {}", path.display(), e);
                    let _ = fs::rename(&path, path.with_extension("bad")).await;
                }
            }
        }

        Ok(messages)
    }

    async fn ack(&self, message: &QueueMessage) -> AppResult<()> {
        // Ignore error if the file is already gone (processed twice)
        let _ = fs::remove_file(Path::new(&message.receipt)).await;
        Ok(())
    }

    async fn healthy(&self) -> bool {
        // The directory must exist (or be creatable) for publish to work
        fs::create_dir_all(&self.dir).await.is_ok()
    }
}
