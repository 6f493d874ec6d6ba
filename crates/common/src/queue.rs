//! Named task queues backed by Redis.
//!
//! Each queue is a Redis list consumed with `BRPOP`. Delayed retries live in
//! a sorted set scored by ready-time; a promoter loop moves due entries back
//! onto each task's home queue. Workers never lock or poll queue internals —
//! they enqueue and are handed one message at a time.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use thiserror::Error;

use crate::types::QueuedTask;

/// Names of the queues the pipeline consumes from.
pub struct QueueNames;

impl QueueNames {
    /// Raw provider callbacks awaiting normalization and a status write.
    pub const INBOUND: &'static str = "inbound-callbacks";
    /// Tasks rescheduled after a retryable failure.
    pub const RETRY: &'static str = "retry-tasks";
    /// Encrypted outbound callbacks awaiting delivery.
    pub const SERVICE_CALLBACKS: &'static str = "service-callbacks";
}

/// Sorted set holding retry tasks until their delay elapses.
const RETRY_DELAYED_KEY: &str = "retry-tasks:delayed";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("failed to encode task: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The enqueue surface handed to task handlers.
///
/// A trait so handlers can be exercised against a recording fake; the Redis
/// implementation is [`TaskQueue`].
#[async_trait]
pub trait TaskScheduler: Send {
    /// Push a task onto the named queue for immediate consumption.
    async fn enqueue(&mut self, queue: &str, task: &QueuedTask) -> Result<(), QueueError>;

    /// Park a task on the retry queue until `delay` elapses.
    async fn enqueue_retry(&mut self, task: &QueuedTask, delay: Duration) -> Result<(), QueueError>;
}

/// Redis-backed task queue.
#[derive(Clone)]
pub struct TaskQueue {
    redis: ConnectionManager,
}

impl TaskQueue {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Block up to `timeout` waiting for the next task on `queue`.
    pub async fn pop(
        &mut self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<QueuedTask>, QueueError> {
        let popped: Option<(String, String)> = self
            .redis
            .brpop(queue, timeout.as_secs_f64())
            .await?;

        match popped {
            Some((_, raw)) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Move every due retry task back onto its home queue.
    ///
    /// Returns the number of promoted tasks.
    pub async fn promote_due_retries(&mut self) -> Result<u32, QueueError> {
        let now = chrono::Utc::now().timestamp_millis();
        let due: Vec<String> = self
            .redis
            .zrangebyscore_limit(RETRY_DELAYED_KEY, "-inf", now, 0, 100)
            .await?;

        let mut promoted = 0u32;
        for raw in due {
            let task: QueuedTask = serde_json::from_str(&raw)?;
            let removed: u32 = self.redis.zrem(RETRY_DELAYED_KEY, &raw).await?;
            // Another promoter may have claimed this entry first.
            if removed == 0 {
                continue;
            }
            self.redis
                .lpush::<_, _, ()>(task.home_queue(), &raw)
                .await?;
            promoted += 1;
        }

        if promoted > 0 {
            tracing::debug!(promoted, "Promoted due retry tasks");
        }
        Ok(promoted)
    }
}

#[async_trait]
impl TaskScheduler for TaskQueue {
    async fn enqueue(&mut self, queue: &str, task: &QueuedTask) -> Result<(), QueueError> {
        let raw = serde_json::to_string(task)?;
        self.redis.lpush::<_, _, ()>(queue, raw).await?;
        Ok(())
    }

    async fn enqueue_retry(&mut self, task: &QueuedTask, delay: Duration) -> Result<(), QueueError> {
        let raw = serde_json::to_string(task)?;
        let ready_at = chrono::Utc::now().timestamp_millis() + delay.as_millis() as i64;
        self.redis
            .zadd::<_, _, _, ()>(RETRY_DELAYED_KEY, raw, ready_at)
            .await?;
        Ok(())
    }
}
