//! In-memory job queue with priorities and delayed delivery.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::ports::{EnqueueOptions, Job, JobPriority, Queue, QueueError};

struct QueuedJob {
    job: Job,
    available_at: Instant,
}

#[derive(Default)]
struct Lanes {
    high: VecDeque<QueuedJob>,
    low: VecDeque<QueuedJob>,
    priority_log: Vec<JobPriority>,
}

#[derive(Default)]
pub struct InMemoryQueue {
    lanes: Mutex<Lanes>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Priorities of every enqueue seen, in order. Test observability only.
    pub async fn enqueued_priorities(&self) -> Vec<JobPriority> {
        self.lanes.lock().await.priority_log.clone()
    }
}

fn pop_due(lane: &mut VecDeque<QueuedJob>, now: Instant) -> Option<Job> {
    let position = lane.iter().position(|q| q.available_at <= now)?;
    lane.remove(position).map(|q| q.job)
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn enqueue(
        &self,
        job_type: &str,
        payload: Value,
        options: EnqueueOptions,
    ) -> Result<(), QueueError> {
        let queued = QueuedJob {
            job: Job {
                job_type: job_type.to_string(),
                payload,
            },
            available_at: Instant::now() + Duration::from_secs(options.delay_secs),
        };

        let mut lanes = self.lanes.lock().await;
        lanes.priority_log.push(options.priority);
        match options.priority {
            JobPriority::High => lanes.high.push_back(queued),
            JobPriority::Low => lanes.low.push_back(queued),
        }
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Job>, QueueError> {
        let now = Instant::now();
        let mut lanes = self.lanes.lock().await;
        Ok(pop_due(&mut lanes.high, now).or_else(|| pop_due(&mut lanes.low, now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn high_priority_dequeues_first() {
        let queue = InMemoryQueue::new();
        queue
            .enqueue("analytics", json!(1), EnqueueOptions::low())
            .await
            .unwrap();
        queue
            .enqueue("persist_retry", json!(2), EnqueueOptions::high())
            .await
            .unwrap();

        let first = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(first.job_type, "persist_retry");
        let second = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(second.job_type, "analytics");
    }

    #[tokio::test]
    async fn delayed_jobs_are_not_due_immediately() {
        let queue = InMemoryQueue::new();
        queue
            .enqueue("persist_retry", json!(1), EnqueueOptions::high().with_delay(60))
            .await
            .unwrap();

        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fifo_within_a_lane() {
        let queue = InMemoryQueue::new();
        queue
            .enqueue("persist_retry", json!("a"), EnqueueOptions::high())
            .await
            .unwrap();
        queue
            .enqueue("persist_retry", json!("b"), EnqueueOptions::high())
            .await
            .unwrap();

        assert_eq!(queue.dequeue().await.unwrap().unwrap().payload, json!("a"));
        assert_eq!(queue.dequeue().await.unwrap().unwrap().payload, json!("b"));
    }
}
