//! Queue capability: at-least-once job delivery.
//!
//! Consumers must be idempotent keyed on the event identifier the payload
//! carries; the queue itself may redeliver.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Job type for deferred durable writes.
pub const JOB_PERSIST_RETRY: &str = "persist_retry";
/// Job type for fire-and-forget analytics.
pub const JOB_ANALYTICS: &str = "analytics";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    High,
    Low,
}

/// Enqueue options.
#[derive(Debug, Clone, Copy)]
pub struct EnqueueOptions {
    pub priority: JobPriority,
    pub delay_secs: u64,
}

impl EnqueueOptions {
    pub fn high() -> Self {
        Self {
            priority: JobPriority::High,
            delay_secs: 0,
        }
    }

    pub fn low() -> Self {
        Self {
            priority: JobPriority::Low,
            delay_secs: 0,
        }
    }

    pub fn with_delay(mut self, delay_secs: u64) -> Self {
        self.delay_secs = delay_secs;
        self
    }
}

/// A dequeued job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_type: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

/// Port over the job queue service.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Enqueues a job. At-least-once delivery is assumed.
    async fn enqueue(
        &self,
        job_type: &str,
        payload: Value,
        options: EnqueueOptions,
    ) -> Result<(), QueueError>;

    /// Pops the next due job, high priority first. `None` when nothing is
    /// due.
    async fn dequeue(&self) -> Result<Option<Job>, QueueError>;
}
