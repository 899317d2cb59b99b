//! Background replay of deferred writes.
//!
//! Drains the retry queue and re-applies parked payloads against the durable
//! store. Replay is idempotent on the event id: a payload whose event already
//! sits in the record's applied window is dropped without a write. Version
//! conflicts re-read and retry immediately; store unavailability re-enqueues
//! with backoff until the attempt budget runs out.

use std::sync::Arc;
use std::time::Duration;

use crate::ports::{
    EnqueueOptions, Queue, QueueError, SessionPatch, SessionRecord, SessionStore, StoreError,
    JOB_ANALYTICS, JOB_PERSIST_RETRY,
};

use super::persist_turn::ReplayPayload;

/// A payload is dropped after this many failed replay attempts.
pub const MAX_REPLAY_ATTEMPTS: u32 = 5;

/// Base for the exponential re-enqueue delay, in seconds.
const REQUEUE_DELAY_BASE_SECS: u64 = 2;

/// What one worker tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayTick {
    /// Nothing was due.
    Idle,
    /// The parked write landed.
    Applied { version: u64 },
    /// The store already held the event.
    AlreadyApplied,
    /// Store unavailable; the payload went back on the queue.
    Requeued { retry_count: u32 },
    /// Attempt budget exhausted; the payload was dropped.
    Dropped,
    /// A job this worker does not own was drained.
    Drained { job_type: String },
}

/// Replays deferred session writes from the retry queue.
pub struct WriteReplayer {
    store: Arc<dyn SessionStore>,
    queue: Arc<dyn Queue>,
}

impl WriteReplayer {
    pub fn new(store: Arc<dyn SessionStore>, queue: Arc<dyn Queue>) -> Self {
        Self { store, queue }
    }

    /// Runs the worker until the task is dropped, polling at `interval`
    /// when the queue is empty.
    pub async fn run(&self, interval: Duration) {
        loop {
            match self.run_once().await {
                Ok(ReplayTick::Idle) => tokio::time::sleep(interval).await,
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(error = %err, "replay queue unavailable");
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    /// Processes at most one job from the queue.
    pub async fn run_once(&self) -> Result<ReplayTick, QueueError> {
        let Some(job) = self.queue.dequeue().await? else {
            return Ok(ReplayTick::Idle);
        };

        if job.job_type != JOB_PERSIST_RETRY {
            if job.job_type == JOB_ANALYTICS {
                tracing::debug!("analytics event drained");
            } else {
                tracing::warn!(job_type = %job.job_type, "unexpected job type drained");
            }
            return Ok(ReplayTick::Drained {
                job_type: job.job_type,
            });
        }

        let payload: ReplayPayload = match serde_json::from_value(job.payload) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, "malformed replay payload dropped");
                return Ok(ReplayTick::Dropped);
            }
        };

        Ok(self.replay(payload).await)
    }

    async fn replay(&self, payload: ReplayPayload) -> ReplayTick {
        let event_id = payload.event.event_id;
        let session_id = payload.event.session_id;

        loop {
            let record = match self.store.get(&session_id).await {
                Ok(record) => record.unwrap_or_else(|| SessionRecord::fresh(session_id)),
                Err(err) => return self.requeue(payload, err).await,
            };

            if record.has_applied(&event_id) {
                tracing::debug!(%event_id, %session_id, "replay already applied, dropping");
                return ReplayTick::AlreadyApplied;
            }

            let patch = SessionPatch {
                stage: payload.event.stage,
                flow_state: payload.flow_state.clone(),
                event: payload.event.clone(),
                evidence: payload.evidence.clone(),
            };

            match self
                .store
                .write_if_version(&session_id, record.version, patch)
                .await
            {
                Ok(version) => {
                    tracing::info!(%event_id, %session_id, version, "deferred write replayed");
                    return ReplayTick::Applied { version };
                }
                Err(StoreError::VersionConflict { expected, current }) => {
                    // Someone else advanced the record; re-read and retry
                    // against the new version.
                    tracing::debug!(%event_id, expected, current, "replay conflict, re-reading");
                }
                Err(err) => return self.requeue(payload, err).await,
            }
        }
    }

    async fn requeue(&self, mut payload: ReplayPayload, cause: StoreError) -> ReplayTick {
        payload.retry_count += 1;
        let event_id = payload.event.event_id;

        if payload.retry_count >= MAX_REPLAY_ATTEMPTS {
            tracing::error!(
                %event_id,
                attempts = payload.retry_count,
                error = %cause,
                "replay attempts exhausted, dropping payload"
            );
            return ReplayTick::Dropped;
        }

        let delay = REQUEUE_DELAY_BASE_SECS.saturating_pow(payload.retry_count);
        let retry_count = payload.retry_count;
        tracing::warn!(
            %event_id,
            retry_count,
            delay_secs = delay,
            error = %cause,
            "store unavailable during replay, re-enqueueing"
        );

        match serde_json::to_value(&payload) {
            Ok(value) => {
                if let Err(err) = self
                    .queue
                    .enqueue(
                        JOB_PERSIST_RETRY,
                        value,
                        EnqueueOptions::high().with_delay(delay),
                    )
                    .await
                {
                    tracing::error!(%event_id, error = %err, "re-enqueue failed, payload lost to cache TTL");
                    return ReplayTick::Dropped;
                }
                ReplayTick::Requeued { retry_count }
            }
            Err(err) => {
                tracing::error!(%event_id, error = %err, "replay payload unserializable");
                ReplayTick::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryQueue, InMemorySessionStore};
    use crate::domain::foundation::SessionId;
    use crate::domain::funnel::{
        ConversationFlowState, MetadataRecord, Stage, TurnEvent, TurnMetadata,
    };
    use crate::ports::Version;
    use async_trait::async_trait;

    fn payload(session_id: SessionId) -> ReplayPayload {
        let event = TurnEvent::new(
            session_id,
            "closing",
            Stage::Closing,
            false,
            MetadataRecord::Inline(TurnMetadata::Closing {
                booking_link_sent: true,
            }),
        );
        ReplayPayload {
            event,
            flow_state: ConversationFlowState::new(),
            evidence: None,
            retry_count: 0,
        }
    }

    async fn enqueue(queue: &InMemoryQueue, payload: &ReplayPayload) {
        queue
            .enqueue(
                JOB_PERSIST_RETRY,
                serde_json::to_value(payload).unwrap(),
                EnqueueOptions::high(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_queue_is_idle() {
        let replayer = WriteReplayer::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryQueue::new()),
        );
        assert_eq!(replayer.run_once().await.unwrap(), ReplayTick::Idle);
    }

    #[tokio::test]
    async fn parked_write_is_applied() {
        let store = Arc::new(InMemorySessionStore::new());
        let queue = Arc::new(InMemoryQueue::new());
        let session = SessionId::new();
        let p = payload(session);
        enqueue(&queue, &p).await;

        let replayer = WriteReplayer::new(store.clone(), queue);
        let tick = replayer.run_once().await.unwrap();

        assert_eq!(tick, ReplayTick::Applied { version: 1 });
        let record = store.get(&session).await.unwrap().unwrap();
        assert_eq!(record.stage, Stage::Closing);
        assert!(record.has_applied(&p.event.event_id));
    }

    #[tokio::test]
    async fn replayed_evidence_reaches_the_history() {
        let store = Arc::new(InMemorySessionStore::new());
        let queue = Arc::new(InMemoryQueue::new());
        let session = SessionId::new();
        let mut p = payload(session);
        p.evidence = Some(crate::domain::evidence::EvidenceItem {
            payload_ref: "deferred-frame".to_string(),
            modality: crate::domain::evidence::Modality::Upload,
            quality: 0.8,
            confidence: 0.5,
            captured_at: crate::domain::foundation::Timestamp::now(),
        });
        enqueue(&queue, &p).await;

        let replayer = WriteReplayer::new(store.clone(), queue);
        assert_eq!(
            replayer.run_once().await.unwrap(),
            ReplayTick::Applied { version: 1 }
        );

        let record = store.get(&session).await.unwrap().unwrap();
        assert_eq!(record.evidence.len(), 1);
        assert_eq!(record.evidence[0].payload_ref, "deferred-frame");
    }

    #[tokio::test]
    async fn duplicate_replay_is_a_no_op() {
        let store = Arc::new(InMemorySessionStore::new());
        let queue = Arc::new(InMemoryQueue::new());
        let session = SessionId::new();
        let p = payload(session);
        enqueue(&queue, &p).await;
        enqueue(&queue, &p).await;

        let replayer = WriteReplayer::new(store.clone(), queue);
        assert_eq!(
            replayer.run_once().await.unwrap(),
            ReplayTick::Applied { version: 1 }
        );
        assert_eq!(
            replayer.run_once().await.unwrap(),
            ReplayTick::AlreadyApplied
        );

        assert_eq!(store.get(&session).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn unavailable_store_requeues_with_backoff() {
        struct DownStore;

        #[async_trait]
        impl SessionStore for DownStore {
            async fn get(
                &self,
                _session_id: &SessionId,
            ) -> Result<Option<SessionRecord>, StoreError> {
                Err(StoreError::Unavailable("down".to_string()))
            }

            async fn write_if_version(
                &self,
                _session_id: &SessionId,
                _expected: Version,
                _patch: SessionPatch,
            ) -> Result<Version, StoreError> {
                Err(StoreError::Unavailable("down".to_string()))
            }

            async fn delete(&self, _session_id: &SessionId) -> Result<(), StoreError> {
                Err(StoreError::Unavailable("down".to_string()))
            }
        }

        let queue = Arc::new(InMemoryQueue::new());
        let p = payload(SessionId::new());
        enqueue(&queue, &p).await;

        let replayer = WriteReplayer::new(Arc::new(DownStore), queue.clone());
        let tick = replayer.run_once().await.unwrap();

        assert_eq!(tick, ReplayTick::Requeued { retry_count: 1 });
        // The re-enqueued job is delayed, so it is not due yet.
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exhausted_payload_is_dropped() {
        struct DownStore;

        #[async_trait]
        impl SessionStore for DownStore {
            async fn get(
                &self,
                _session_id: &SessionId,
            ) -> Result<Option<SessionRecord>, StoreError> {
                Err(StoreError::Unavailable("down".to_string()))
            }

            async fn write_if_version(
                &self,
                _session_id: &SessionId,
                _expected: Version,
                _patch: SessionPatch,
            ) -> Result<Version, StoreError> {
                Err(StoreError::Unavailable("down".to_string()))
            }

            async fn delete(&self, _session_id: &SessionId) -> Result<(), StoreError> {
                Err(StoreError::Unavailable("down".to_string()))
            }
        }

        let queue = Arc::new(InMemoryQueue::new());
        let mut p = payload(SessionId::new());
        p.retry_count = MAX_REPLAY_ATTEMPTS - 1;
        enqueue(&queue, &p).await;

        let replayer = WriteReplayer::new(Arc::new(DownStore), queue.clone());
        assert_eq!(replayer.run_once().await.unwrap(), ReplayTick::Dropped);
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn version_conflict_re_reads_and_lands() {
        // A concurrent writer advanced the record between dequeue and
        // write; the replayer must converge instead of giving up.
        struct RacingStore {
            inner: InMemorySessionStore,
            raced: std::sync::atomic::AtomicBool,
        }

        #[async_trait]
        impl SessionStore for RacingStore {
            async fn get(
                &self,
                session_id: &SessionId,
            ) -> Result<Option<SessionRecord>, StoreError> {
                self.inner.get(session_id).await
            }

            async fn write_if_version(
                &self,
                session_id: &SessionId,
                expected: Version,
                patch: SessionPatch,
            ) -> Result<Version, StoreError> {
                use std::sync::atomic::Ordering;
                if !self.raced.swap(true, Ordering::SeqCst) {
                    // First attempt loses the race.
                    return Err(StoreError::VersionConflict {
                        expected,
                        current: expected + 1,
                    });
                }
                self.inner.write_if_version(session_id, expected, patch).await
            }

            async fn delete(&self, session_id: &SessionId) -> Result<(), StoreError> {
                self.inner.delete(session_id).await
            }
        }

        let store = Arc::new(RacingStore {
            inner: InMemorySessionStore::new(),
            raced: std::sync::atomic::AtomicBool::new(false),
        });
        let queue = Arc::new(InMemoryQueue::new());
        let session = SessionId::new();
        let p = payload(session);
        enqueue(&queue, &p).await;

        let replayer = WriteReplayer::new(store.clone(), queue);
        let tick = replayer.run_once().await.unwrap();

        assert!(matches!(tick, ReplayTick::Applied { .. }));
        assert!(store
            .get(&session)
            .await
            .unwrap()
            .unwrap()
            .has_applied(&p.event.event_id));
    }

    #[tokio::test]
    async fn analytics_jobs_are_drained_untouched() {
        let queue = Arc::new(InMemoryQueue::new());
        queue
            .enqueue(
                JOB_ANALYTICS,
                serde_json::json!({"event_id": "x"}),
                EnqueueOptions::low(),
            )
            .await
            .unwrap();

        let replayer = WriteReplayer::new(Arc::new(InMemorySessionStore::new()), queue);
        assert_eq!(
            replayer.run_once().await.unwrap(),
            ReplayTick::Drained {
                job_type: JOB_ANALYTICS.to_string()
            }
        );
    }
}
