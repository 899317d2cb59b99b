//! Turn persistence service.
//!
//! Commits a router decision to the durable store with optimistic locking
//! and absorbs every failure into a degraded fallback path — this service
//! never returns an error to the turn pipeline. The versioned write is the
//! single source of truth; the cache + retry-queue fallback is at-least-once
//! and eventually consistent, kept safe by the event id carried through to
//! replay.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::domain::evidence::EvidenceItem;
use crate::domain::foundation::{EventId, SessionId};
use crate::domain::funnel::{
    cap_metadata, ConversationFlowState, Stage, StubScalars, TurnEvent, TurnMetadata,
};
use crate::ports::{
    Cache, EnqueueOptions, Queue, SessionPatch, SessionStore, StoreError, Version, JOB_ANALYTICS,
    JOB_PERSIST_RETRY,
};

/// Cache namespace for parked full payloads awaiting replay.
pub const FALLBACK_NAMESPACE: &str = "fallback";
/// Cache namespace for out-of-line oversized metadata blobs. Blobs share
/// the fallback TTL: once it elapses the stub's scalars are all that
/// survives of an oversized payload.
pub const METADATA_NAMESPACE: &str = "metadata";
/// Default retention for parked payloads: one day.
pub const FALLBACK_TTL_SECS: u64 = 24 * 60 * 60;

/// Retry and timeout budget for the synchronous write path.
#[derive(Debug, Clone, Copy)]
pub struct PersistenceBudget {
    /// Version-conflict retries after the initial attempt.
    pub max_retries: u32,
    /// Linear backoff between attempts.
    pub backoff: Duration,
    /// Overall deadline; chosen to stay under a 100ms p95 for the turn.
    pub overall_timeout: Duration,
    /// Retention for parked fallback payloads and out-of-line blobs.
    pub fallback_ttl: Duration,
}

impl Default for PersistenceBudget {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(50),
            overall_timeout: Duration::from_millis(80),
            fallback_ttl: Duration::from_secs(FALLBACK_TTL_SECS),
        }
    }
}

/// Everything the pipeline hands over for one turn, before the event
/// identifier exists.
#[derive(Debug, Clone)]
pub struct TurnDraft {
    pub session_id: SessionId,
    pub responder: String,
    pub stage: Stage,
    /// Evidence the turn consumed; lands in the session's multimodal
    /// history on commit.
    pub evidence: Option<EvidenceItem>,
    pub metadata: TurnMetadata,
    /// Present only when a caller resubmits a turn it already holds an
    /// identifier for; fresh turns leave this empty.
    pub event_id: Option<EventId>,
}

/// Why a write landed on the fallback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    VersionConflictExhausted,
    Timeout,
    StoreUnavailable,
}

/// What happened to one persist call. Never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The versioned write landed.
    Committed { version: Version },
    /// The event id was already seen by this process instance.
    DuplicateSuppressed,
    /// The store already holds this event; nothing to do.
    AlreadyApplied { version: Version },
    /// Parked on the fallback path for asynchronous replay.
    Deferred { reason: DeferReason },
}

/// Payload carried by fallback cache entries and retry jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayPayload {
    pub event: TurnEvent,
    pub flow_state: ConversationFlowState,
    #[serde(default)]
    pub evidence: Option<EvidenceItem>,
    pub retry_count: u32,
}

/// Commits turn events with optimistic concurrency and a degraded fallback.
pub struct TurnPersister {
    store: Arc<dyn SessionStore>,
    cache: Arc<dyn Cache>,
    queue: Arc<dyn Queue>,
    budget: PersistenceBudget,
    /// Process-local best-effort de-dup; the version check is the real
    /// guard.
    seen: Mutex<HashSet<EventId>>,
}

impl TurnPersister {
    pub fn new(
        store: Arc<dyn SessionStore>,
        cache: Arc<dyn Cache>,
        queue: Arc<dyn Queue>,
        budget: PersistenceBudget,
    ) -> Self {
        Self {
            store,
            cache,
            queue,
            budget,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Persists one turn. Absorbs all failures; the caller only learns
    /// which path the write took.
    pub async fn persist(
        &self,
        draft: TurnDraft,
        flow_state: ConversationFlowState,
    ) -> PersistOutcome {
        let event_id = draft.event_id.unwrap_or_default();

        if !self.mark_seen(event_id) {
            tracing::debug!(%event_id, "suppressing duplicate turn event");
            return PersistOutcome::DuplicateSuppressed;
        }

        let flow_state = sanitize_flow_state(flow_state);
        let event = self.build_event(&draft, event_id, &flow_state).await;
        let evidence = draft.evidence;

        let attempt = tokio::time::timeout(
            self.budget.overall_timeout,
            self.try_versioned_write(&event, &flow_state, &evidence),
        )
        .await;

        match attempt {
            Ok(Ok(WriteSuccess {
                version,
                already_applied: false,
            })) => {
                self.spawn_analytics(&event);
                PersistOutcome::Committed { version }
            }
            Ok(Ok(WriteSuccess {
                version,
                already_applied: true,
            })) => PersistOutcome::AlreadyApplied { version },
            Ok(Err(err)) => {
                let reason = match err {
                    StoreError::VersionConflict { .. } => DeferReason::VersionConflictExhausted,
                    _ => DeferReason::StoreUnavailable,
                };
                self.fall_back(&event, &flow_state, &evidence, reason).await
            }
            Err(_elapsed) => {
                tracing::warn!(
                    event_id = %event.event_id,
                    timeout_ms = self.budget.overall_timeout.as_millis() as u64,
                    "persistence write timed out"
                );
                self.fall_back(&event, &flow_state, &evidence, DeferReason::Timeout)
                    .await
            }
        }
    }

    fn mark_seen(&self, event_id: EventId) -> bool {
        match self.seen.lock() {
            Ok(mut seen) => seen.insert(event_id),
            // A poisoned set only weakens an optimization; proceed.
            Err(poisoned) => poisoned.into_inner().insert(event_id),
        }
    }

    /// Builds the durable event, applying the metadata size cap. An
    /// oversized blob is parked out-of-line; failure to park it is logged
    /// and tolerated because the stub keeps the always-needed scalars.
    async fn build_event(
        &self,
        draft: &TurnDraft,
        event_id: EventId,
        flow_state: &ConversationFlowState,
    ) -> TurnEvent {
        let blob_ref = format!("{}:{}", draft.session_id, event_id);
        let scalars = StubScalars {
            stage: draft.stage,
            lead_score: flow_state.lead_score,
            fit_score: flow_state.fit_score,
            multimodal_used: draft.evidence.is_some(),
        };
        let (record, overflow) = cap_metadata(draft.metadata.clone(), scalars, &blob_ref);

        if let Some(full_blob) = overflow {
            tracing::warn!(
                %event_id,
                session_id = %draft.session_id,
                "metadata exceeded size cap, storing out-of-line"
            );
            match serde_json::to_value(&full_blob) {
                Ok(value) => {
                    if let Err(err) = self
                        .cache
                        .set(
                            METADATA_NAMESPACE,
                            &blob_ref,
                            value,
                            self.budget.fallback_ttl.as_secs(),
                        )
                        .await
                    {
                        tracing::warn!(%event_id, error = %err, "failed to park oversized metadata");
                    }
                }
                Err(err) => {
                    tracing::warn!(%event_id, error = %err, "oversized metadata is unserializable");
                }
            }
        }

        TurnEvent {
            event_id,
            session_id: draft.session_id,
            responder: draft.responder.clone(),
            stage: draft.stage,
            multimodal_used: draft.evidence.is_some(),
            metadata: record,
            created_at: crate::domain::foundation::Timestamp::now(),
        }
    }

    async fn try_versioned_write(
        &self,
        event: &TurnEvent,
        flow_state: &ConversationFlowState,
        evidence: &Option<EvidenceItem>,
    ) -> Result<WriteSuccess, StoreError> {
        let mut attempt = 0;
        loop {
            let record = self
                .store
                .get(&event.session_id)
                .await?
                .unwrap_or_else(|| crate::ports::SessionRecord::fresh(event.session_id));

            if record.has_applied(&event.event_id) {
                return Ok(WriteSuccess {
                    version: record.version,
                    already_applied: true,
                });
            }

            let patch = SessionPatch {
                stage: event.stage,
                flow_state: flow_state.clone(),
                event: event.clone(),
                evidence: evidence.clone(),
            };

            match self
                .store
                .write_if_version(&event.session_id, record.version, patch)
                .await
            {
                Ok(version) => {
                    return Ok(WriteSuccess {
                        version,
                        already_applied: false,
                    })
                }
                Err(StoreError::VersionConflict { expected, current })
                    if attempt < self.budget.max_retries =>
                {
                    attempt += 1;
                    tracing::debug!(
                        event_id = %event.event_id,
                        expected,
                        current,
                        attempt,
                        "version conflict, retrying against new version"
                    );
                    tokio::time::sleep(self.budget.backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Degraded path: park the full payload in the cache and enqueue a
    /// high-priority retry job. Even this path must not error out.
    async fn fall_back(
        &self,
        event: &TurnEvent,
        flow_state: &ConversationFlowState,
        evidence: &Option<EvidenceItem>,
        reason: DeferReason,
    ) -> PersistOutcome {
        tracing::error!(
            event_id = %event.event_id,
            session_id = %event.session_id,
            ?reason,
            "primary write failed, deferring to fallback path"
        );

        let payload = ReplayPayload {
            event: event.clone(),
            flow_state: flow_state.clone(),
            evidence: evidence.clone(),
            retry_count: 0,
        };
        let key = format!("{}:{}", event.session_id, event.event_id);

        match serde_json::to_value(&payload) {
            Ok(value) => {
                if let Err(err) = self
                    .cache
                    .set(
                        FALLBACK_NAMESPACE,
                        &key,
                        value.clone(),
                        self.budget.fallback_ttl.as_secs(),
                    )
                    .await
                {
                    tracing::error!(event_id = %event.event_id, error = %err, "fallback cache write failed");
                }
                if let Err(err) = self
                    .queue
                    .enqueue(JOB_PERSIST_RETRY, value, EnqueueOptions::high())
                    .await
                {
                    tracing::error!(event_id = %event.event_id, error = %err, "retry enqueue failed");
                }
            }
            Err(err) => {
                tracing::error!(event_id = %event.event_id, error = %err, "fallback payload unserializable");
            }
        }

        PersistOutcome::Deferred { reason }
    }

    /// Fire-and-forget analytics: a detached task with its own error
    /// channel, never joined with the write path.
    fn spawn_analytics(&self, event: &TurnEvent) {
        let queue = Arc::clone(&self.queue);
        let payload = json!({
            "event_id": event.event_id,
            "session_id": event.session_id,
            "responder": event.responder,
            "stage": event.stage,
        });
        let event_id = event.event_id;
        tokio::spawn(async move {
            if let Err(err) = queue
                .enqueue(JOB_ANALYTICS, payload, EnqueueOptions::low())
                .await
            {
                tracing::warn!(%event_id, error = %err, "analytics enqueue failed");
            }
        });
    }
}

struct WriteSuccess {
    version: Version,
    already_applied: bool,
}

/// Replaces a raw contact email with a one-way hash. The literal address
/// never reaches the hot-path record.
fn sanitize_flow_state(mut flow_state: ConversationFlowState) -> ConversationFlowState {
    if let Some(email) = flow_state.intelligence.contact_email.take() {
        flow_state.intelligence.contact_email = Some(hash_email(&email));
    }
    flow_state
}

/// One-way hash for an email address; already-hashed values pass through.
fn hash_email(value: &str) -> String {
    if value.starts_with("sha256:") {
        return value.to_string();
    }
    let digest = Sha256::digest(value.trim().to_lowercase().as_bytes());
    format!("sha256:{:x}", digest)
}
