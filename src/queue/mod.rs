use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::db::{DatabaseError, TaskStore};
use crate::relay::EnrichedTask;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("task payload could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A claimed queue row with its payload decoded.
#[derive(Debug)]
pub struct QueuedJob {
    pub id: i64,
    pub attempts: i32,
    pub task: EnrichedTask,
}

/// Durable FIFO work queue backed by the queued_tasks table. Producers
/// notify after a committed insert; consumers block on the notification
/// with a polling interval as a fallback, so a task enqueued by another
/// process is still picked up.
pub struct TaskQueue {
    store: Arc<dyn TaskStore>,
    notify: Notify,
    poll_interval: Duration,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn TaskStore>, config: &QueueConfig) -> Self {
        Self {
            store,
            notify: Notify::new(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    pub async fn enqueue(&self, task: &EnrichedTask) -> Result<i64, QueueError> {
        let payload = serde_json::to_string(task)?;
        let id = self.store.enqueue(&payload).await?;
        debug!(
            "enqueued task id={} account={} event_type={}",
            id, task.account_email, task.event_type
        );
        self.notify.notify_one();
        Ok(id)
    }

    /// Blocks until a task can be claimed. A row whose payload no longer
    /// decodes is dropped from the queue rather than poisoning the worker.
    pub async fn dequeue(&self) -> Result<QueuedJob, QueueError> {
        loop {
            while let Some(row) = self.store.claim_next().await? {
                match serde_json::from_str(&row.payload) {
                    Ok(task) => {
                        return Ok(QueuedJob {
                            id: row.id,
                            attempts: row.attempts,
                            task,
                        });
                    }
                    Err(e) => {
                        warn!("discarding malformed queue row id={}: {}", row.id, e);
                        self.store.complete(row.id).await?;
                    }
                }
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    pub async fn complete(&self, id: i64) -> Result<(), QueueError> {
        self.store.complete(id).await?;
        Ok(())
    }

    /// Return rows orphaned in the running state by a previous process to
    /// pending. Called once on startup, before workers spawn.
    pub async fn recover(&self) -> Result<usize, QueueError> {
        let released = self.store.release_stale().await?;
        if released > 0 {
            warn!("released {} stale running tasks back to pending", released);
        }
        Ok(released)
    }

    pub async fn depth(&self) -> Result<i64, QueueError> {
        Ok(self.store.pending_count().await?)
    }
}
