//! Redis-backed job queue for production deployments.
//!
//! Two lists, one per priority, drained high first. Delayed jobs sit in a
//! sorted set scored by their due time and are promoted onto their list at
//! dequeue. Delivery is at-least-once; consumers de-duplicate on the event
//! id their payload carries.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::Value;

use crate::domain::foundation::Timestamp;
use crate::ports::{EnqueueOptions, Job, JobPriority, Queue, QueueError};

const HIGH_LIST: &str = "pitchflow:queue:high";
const LOW_LIST: &str = "pitchflow:queue:low";
const DELAYED_SET: &str = "pitchflow:queue:delayed";

/// Redis-backed [`Queue`].
#[derive(Clone)]
pub struct RedisQueue {
    conn: MultiplexedConnection,
}

impl RedisQueue {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    fn list_for(priority: JobPriority) -> &'static str {
        match priority {
            JobPriority::High => HIGH_LIST,
            JobPriority::Low => LOW_LIST,
        }
    }

    /// Moves due delayed jobs onto their priority lists.
    async fn promote_due(&self, conn: &mut MultiplexedConnection) -> Result<(), QueueError> {
        let now = Timestamp::now().as_unix_secs();

        let due: Vec<String> = conn
            .zrangebyscore(DELAYED_SET, 0, now as isize)
            .await
            .map_err(|e: redis::RedisError| QueueError::Unavailable(e.to_string()))?;

        for entry in due {
            let removed: i64 = conn
                .zrem(DELAYED_SET, &entry)
                .await
                .map_err(|e: redis::RedisError| QueueError::Unavailable(e.to_string()))?;
            // Another worker may have promoted it first.
            if removed == 0 {
                continue;
            }

            let envelope: DelayedEnvelope = match serde_json::from_str(&entry) {
                Ok(envelope) => envelope,
                Err(err) => {
                    tracing::error!(error = %err, "malformed delayed job dropped");
                    continue;
                }
            };
            let serialized = serde_json::to_string(&envelope.job)
                .map_err(|e| QueueError::Unavailable(e.to_string()))?;
            conn.lpush::<_, _, ()>(Self::list_for(envelope.priority), serialized)
                .await
                .map_err(|e: redis::RedisError| QueueError::Unavailable(e.to_string()))?;
        }

        Ok(())
    }
}

/// Wire form for a job parked in the delayed set.
#[derive(serde::Serialize, serde::Deserialize)]
struct DelayedEnvelope {
    job: Job,
    priority: JobPriority,
    due_at: u64,
}

#[async_trait]
impl Queue for RedisQueue {
    async fn enqueue(
        &self,
        job_type: &str,
        payload: Value,
        options: EnqueueOptions,
    ) -> Result<(), QueueError> {
        let job = Job {
            job_type: job_type.to_string(),
            payload,
        };

        let mut conn = self.conn.clone();

        if options.delay_secs > 0 {
            let due_at = Timestamp::now().as_unix_secs() + options.delay_secs;
            let envelope = DelayedEnvelope {
                job,
                priority: options.priority,
                due_at,
            };
            let serialized = serde_json::to_string(&envelope)
                .map_err(|e| QueueError::Unavailable(e.to_string()))?;
            conn.zadd::<_, _, _, ()>(DELAYED_SET, serialized, due_at as f64)
                .await
                .map_err(|e: redis::RedisError| QueueError::Unavailable(e.to_string()))?;
            return Ok(());
        }

        let serialized =
            serde_json::to_string(&job).map_err(|e| QueueError::Unavailable(e.to_string()))?;
        conn.lpush::<_, _, ()>(Self::list_for(options.priority), serialized)
            .await
            .map_err(|e: redis::RedisError| QueueError::Unavailable(e.to_string()))?;

        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Job>, QueueError> {
        let mut conn = self.conn.clone();
        self.promote_due(&mut conn).await?;

        for list in [HIGH_LIST, LOW_LIST] {
            let raw: Option<String> = conn
                .rpop(list, None)
                .await
                .map_err(|e: redis::RedisError| QueueError::Unavailable(e.to_string()))?;

            if let Some(raw) = raw {
                let job = serde_json::from_str(&raw)
                    .map_err(|e| QueueError::Unavailable(format!("malformed job: {}", e)))?;
                return Ok(Some(job));
            }
        }

        Ok(None)
    }
}

impl std::fmt::Debug for RedisQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueue").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_map_to_distinct_lists() {
        assert_ne!(
            RedisQueue::list_for(JobPriority::High),
            RedisQueue::list_for(JobPriority::Low)
        );
    }

    // Redis integration tests require a running Redis instance and are run
    // separately from unit tests.
}
