//! Durable store capability: versioned session records.
//!
//! The conditional write is the single source of truth for "did this turn's
//! state change land". Every other path — the process-local de-dup set, the
//! cache fallback, the retry queue — is an optimization or a degraded route
//! around this port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::evidence::EvidenceItem;
use crate::domain::foundation::{EventId, SessionId, Timestamp};
use crate::domain::funnel::{ConversationFlowState, Stage, TurnEvent};

/// Monotonic record version. 0 means the record has never been written.
pub type Version = u64;

/// How many recently applied event ids a record retains for idempotent
/// replay detection. Outside this window the version check still prevents
/// stale overwrites.
pub const APPLIED_EVENTS_WINDOW: usize = 64;

/// The durable unit for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub version: Version,
    pub stage: Stage,
    pub flow_state: ConversationFlowState,
    /// Recently applied event ids, oldest first, bounded by
    /// [`APPLIED_EVENTS_WINDOW`].
    pub applied_events: Vec<EventId>,
    /// Multimodal history, append-only in capture order.
    pub evidence: Vec<EvidenceItem>,
    pub updated_at: Timestamp,
}

impl SessionRecord {
    /// A record for a session that has never been written.
    pub fn fresh(session_id: SessionId) -> Self {
        Self {
            session_id,
            version: 0,
            stage: Stage::default(),
            flow_state: ConversationFlowState::new(),
            applied_events: Vec::new(),
            evidence: Vec::new(),
            updated_at: Timestamp::now(),
        }
    }

    /// Whether an event id sits inside the idempotency window.
    pub fn has_applied(&self, event_id: &EventId) -> bool {
        self.applied_events.contains(event_id)
    }

    /// Applies a patch in place: bumps the version, records the event id,
    /// trims the idempotency window. Store adapters share this so their
    /// write semantics stay identical.
    pub fn apply(&mut self, patch: &SessionPatch) {
        self.version += 1;
        self.stage = patch.stage;
        self.flow_state = patch.flow_state.clone();
        self.applied_events.push(patch.event.event_id);
        if self.applied_events.len() > APPLIED_EVENTS_WINDOW {
            let excess = self.applied_events.len() - APPLIED_EVENTS_WINDOW;
            self.applied_events.drain(..excess);
        }
        if let Some(item) = &patch.evidence {
            self.evidence.push(item.clone());
        }
        self.updated_at = Timestamp::now();
    }
}

/// One turn's worth of state change, applied atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPatch {
    pub stage: Stage,
    pub flow_state: ConversationFlowState,
    pub event: TurnEvent,
    /// Evidence the turn consumed, appended to the multimodal history.
    pub evidence: Option<EvidenceItem>,
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("version conflict: expected {expected}, current {current}")]
    VersionConflict { expected: Version, current: Version },

    #[error("session not found: {0}")]
    NotFound(SessionId),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Port over the durable relational store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the current record, or `None` for a session never written.
    async fn get(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, StoreError>;

    /// Conditional write: succeeds only if the record's version still
    /// equals `expected`. An `expected` of 0 creates the record when
    /// absent. A patch whose event id is already inside the idempotency
    /// window is a successful no-op returning the current version.
    async fn write_if_version(
        &self,
        session_id: &SessionId,
        expected: Version,
        patch: SessionPatch,
    ) -> Result<Version, StoreError>;

    /// Operator cleanup after the retention window.
    async fn delete(&self, session_id: &SessionId) -> Result<(), StoreError>;
}
