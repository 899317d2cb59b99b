//! Stage router: decides, per incoming turn, which responder runs next.
//!
//! Rules are evaluated in strict priority order; the first match wins. The
//! router mutates only its own copy of the flow state and returns it in the
//! decision — nothing is persisted here, and an error leaves the session
//! untouched (fail-closed).

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{DomainError, SessionId};

use super::detectors;
use super::flow_state::{ConversationFlowState, FitScore, Intelligence, LeadScore};
use super::message::History;
use super::stage::{ResponderKind, Stage};

/// Frustration detections at or beyond this count force an exit. The first
/// offense is a warning only.
const FORCE_EXIT_THRESHOLD: u32 = 2;

/// Objection counter value beyond which the next pass dispatches to closing.
const OBJECTION_CLOSING_THRESHOLD: u32 = 2;

/// Hard cap on scoring re-entry within a single router pass.
const SCORING_LOOP_CAP: u32 = 2;

/// Read-only view of a session as loaded from the durable store.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub stage: Stage,
    pub flow_state: ConversationFlowState,
}

impl SessionSnapshot {
    /// Snapshot for a session that has never been written.
    pub fn fresh(session_id: SessionId) -> Self {
        Self {
            session_id,
            stage: Stage::default(),
            flow_state: ConversationFlowState::new(),
        }
    }
}

/// Outcome of one full router pass.
#[derive(Debug, Clone)]
pub struct RouterDecision {
    pub responder: ResponderKind,
    pub next_stage: Stage,
    pub flow_state: ConversationFlowState,
}

/// Scores returned by the scoring responder.
#[derive(Debug, Clone, Copy)]
pub struct ScoringOutcome {
    pub fit: FitScore,
    pub lead: LeadScore,
}

/// Seam for the black-box scoring responder the router invokes
/// synchronously mid-pass.
#[async_trait]
pub trait LeadScorer: Send + Sync {
    async fn score(
        &self,
        turns: &History,
        intelligence: &Intelligence,
    ) -> Result<ScoringOutcome, DomainError>;
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("scoring responder failed: {0}")]
    Scoring(#[source] DomainError),
}

/// The funnel state machine.
pub struct StageRouter<S: LeadScorer> {
    scorer: S,
}

impl<S: LeadScorer> StageRouter<S> {
    pub fn new(scorer: S) -> Self {
        Self { scorer }
    }

    /// Routes one turn. Returns the responder to invoke, the resulting
    /// stage, and the updated flow state to persist alongside it.
    pub async fn route(
        &self,
        turns: &History,
        snapshot: &SessionSnapshot,
    ) -> Result<RouterDecision, RouterError> {
        let window = turns.detector_window();
        let mut flow = snapshot.flow_state.clone();

        // Rule 1: explicit booking intent beats everything.
        if detectors::detect_booking(window).matched {
            return Ok(decision(ResponderKind::Closing, Stage::BookingRequested, flow));
        }

        // Rule 2: frustration. The increment always happens first and is
        // carried in the returned flow state, so it lands in the same
        // versioned write as the stage decision.
        if detectors::detect_frustration(window).matched {
            flow.record_exit_attempt();
            if flow.exit_attempts() >= FORCE_EXIT_THRESHOLD {
                tracing::info!(
                    session_id = %snapshot.session_id,
                    attempts = flow.exit_attempts(),
                    "forcing exit after repeated frustration"
                );
                return Ok(decision(ResponderKind::Summary, Stage::ForceExit, flow));
            }
            // First offense: warning only, continue down the rule chain.
        }

        // Rule 3: wrap-up intent.
        if detectors::detect_wrap_up(window).matched {
            return Ok(decision(ResponderKind::Summary, Stage::Summary, flow));
        }

        // Rule 4: admin trigger phrase.
        if detectors::detect_admin_trigger(window) {
            return Ok(decision(ResponderKind::Admin, Stage::Admin, flow));
        }

        // Rule 5: objection, only meaningful once a pitch was delivered.
        if detectors::detect_objection(window) && flow.pitch_delivered {
            flow.record_objection();
            return Ok(decision(ResponderKind::Objection, Stage::Objection, flow));
        }

        // A session that has objected its way past the threshold moves to
        // closing on the next pass instead of looping objection handling.
        if flow.objection_count > OBJECTION_CLOSING_THRESHOLD {
            return Ok(decision(ResponderKind::Closing, Stage::Closing, flow));
        }

        // Rule 6: synchronous scoring, then re-enter routing. Explicit loop
        // with a hard iteration cap instead of recursion.
        let mut iterations = 0;
        while !flow.scoring_complete
            && flow.intelligence.sufficient_for_scoring()
            && iterations < SCORING_LOOP_CAP
        {
            iterations += 1;
            let outcome = self
                .scorer
                .score(turns, &flow.intelligence)
                .await
                .map_err(RouterError::Scoring)?;
            flow.complete_scoring(outcome.fit, outcome.lead);
        }

        // Rule 7: plain stage-table dispatch.
        let (responder, next_stage) = dispatch(snapshot.stage, &flow);
        Ok(decision(responder, next_stage, flow))
    }
}

fn decision(
    responder: ResponderKind,
    next_stage: Stage,
    mut flow: ConversationFlowState,
) -> RouterDecision {
    if next_stage.is_pitch() {
        flow.pitch_delivered = true;
    }
    if next_stage == Stage::Proposal {
        flow.proposal_generated = true;
    }
    RouterDecision {
        responder,
        next_stage,
        flow_state: flow,
    }
}

/// Stage-table dispatch. Transient stages resolve here, within the same
/// pass, so they are never returned as a resulting stage.
fn dispatch(stage: Stage, flow: &ConversationFlowState) -> (ResponderKind, Stage) {
    match stage {
        Stage::Discovery | Stage::Scoring | Stage::IntelligenceGathering => {
            if flow.scoring_complete {
                let pitch = pitch_stage(flow.fit_score);
                (pitch.responder(), pitch)
            } else {
                (ResponderKind::Discovery, Stage::Discovery)
            }
        }
        other => (other.responder(), other),
    }
}

/// Picks the pitch stage from the fit scores.
fn pitch_stage(fit: Option<FitScore>) -> Stage {
    match fit {
        Some(f) if f.workshop > 0.7 && f.workshop > f.consulting + 0.1 => Stage::WorkshopPitch,
        Some(f) if f.consulting > 0.7 && f.consulting > f.workshop + 0.1 => Stage::ConsultingPitch,
        _ => Stage::Pitching,
    }
}
