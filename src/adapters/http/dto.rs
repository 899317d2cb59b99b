//! HTTP DTOs for the conversation endpoints.
//!
//! These types decouple the HTTP API from domain types, allowing
//! independent evolution.

use serde::{Deserialize, Serialize};

use crate::application::{DeferReason, PersistOutcome, ProcessTurnResult};
use crate::domain::evidence::{Frame, FrameStats, Modality, ScoredFrame};
use crate::domain::foundation::Timestamp;
use crate::domain::funnel::{History, Message, Role, Stage};
use crate::ports::SessionRecord;

/// One message in the turn request.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDto {
    pub role: Role,
    pub content: String,
}

/// Request to process one conversation turn.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    /// Recent turn history, oldest first, ending with the new user message.
    pub messages: Vec<MessageDto>,
}

impl TurnRequest {
    pub fn into_history(self) -> History {
        let mut history = History::new();
        for m in self.messages {
            history.push(match m.role {
                Role::User => Message::user(m.content),
                Role::Agent => Message::agent(m.content),
            });
        }
        history
    }
}

/// Request to ingest one captured evidence frame.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameRequest {
    pub payload_ref: String,
    pub modality: Modality,
    #[serde(default)]
    pub stats: Option<FrameStats>,
    #[serde(default)]
    pub analysis: Option<String>,
}

impl FrameRequest {
    pub fn into_frame(self) -> Frame {
        Frame {
            payload_ref: self.payload_ref,
            modality: self.modality,
            stats: self.stats,
            analysis: self.analysis,
            captured_at: Timestamp::now(),
        }
    }
}

/// Response for a processed turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub output: String,
    pub agent: String,
    pub stage: Stage,
    pub persistence: String,
}

impl From<ProcessTurnResult> for TurnResponse {
    fn from(result: ProcessTurnResult) -> Self {
        Self {
            output: result.output,
            agent: result.agent,
            stage: result.stage,
            persistence: persistence_label(&result.persistence),
        }
    }
}

fn persistence_label(outcome: &PersistOutcome) -> String {
    match outcome {
        PersistOutcome::Committed { .. } => "committed".to_string(),
        PersistOutcome::DuplicateSuppressed => "duplicate_suppressed".to_string(),
        PersistOutcome::AlreadyApplied { .. } => "already_applied".to_string(),
        PersistOutcome::Deferred { reason } => match reason {
            DeferReason::VersionConflictExhausted => "deferred_conflict".to_string(),
            DeferReason::Timeout => "deferred_timeout".to_string(),
            DeferReason::StoreUnavailable => "deferred_unavailable".to_string(),
        },
    }
}

/// Response for an ingested frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameResponse {
    pub quality: f64,
    pub confidence: f64,
    pub usable: bool,
}

impl From<ScoredFrame> for FrameResponse {
    fn from(scored: ScoredFrame) -> Self {
        Self {
            quality: scored.quality,
            confidence: scored.confidence,
            usable: scored.is_usable(),
        }
    }
}

/// Session record view.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub version: u64,
    pub stage: Stage,
    pub stage_label: String,
    pub objection_count: u32,
    pub exit_attempts: u32,
    pub scoring_complete: bool,
    pub pitch_delivered: bool,
    pub updated_at: String,
}

impl From<SessionRecord> for SessionResponse {
    fn from(record: SessionRecord) -> Self {
        Self {
            session_id: record.session_id.to_string(),
            version: record.version,
            stage: record.stage,
            stage_label: record.stage.label().to_string(),
            objection_count: record.flow_state.objection_count,
            exit_attempts: record.flow_state.exit_attempts(),
            scoring_complete: record.flow_state.scoring_complete,
            pitch_delivered: record.flow_state.pitch_delivered,
            updated_at: record.updated_at.as_datetime().to_rfc3339(),
        }
    }
}

/// Standard error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }
}
