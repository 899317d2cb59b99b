//! The turn pipeline: assemble context, route, respond, persist.
//!
//! Responder failures fail the turn with nothing persisted. Persistence
//! failures never fail the turn; the persister absorbs them onto its
//! fallback path and the reply still goes out.

use std::sync::Arc;

use thiserror::Error;

use crate::domain::foundation::{DomainError, SessionId};
use crate::domain::funnel::{
    History, LeadScorer, ResponderKind, RouterError, Stage, StageRouter, TurnMetadata,
};
use crate::ports::{ResponderContext, ResponderRegistry, StoreError};

use super::assemble_context::ContextAssembler;
use super::persist_turn::{PersistOutcome, TurnDraft, TurnPersister};

/// What the caller gets back for one processed turn.
#[derive(Debug, Clone)]
pub struct ProcessTurnResult {
    /// User-visible reply text.
    pub output: String,
    /// Self-reported agent name from the responder.
    pub agent: String,
    /// Stage the session moved to.
    pub stage: Stage,
    /// Which path the write took.
    pub persistence: PersistOutcome,
}

#[derive(Debug, Error)]
pub enum ProcessTurnError {
    /// The session record could not be read; the turn cannot start.
    #[error("session read failed: {0}")]
    SessionRead(#[from] StoreError),

    #[error(transparent)]
    Routing(#[from] RouterError),

    /// The routed responder failed. Nothing was persisted.
    #[error("responder failed: {0}")]
    Responder(#[source] DomainError),

    /// No responder registered for the routed kind.
    #[error("no responder registered for {0:?}")]
    ResponderUnavailable(ResponderKind),
}

/// Drives one conversation turn end to end.
pub struct ProcessTurnHandler<S: LeadScorer> {
    assembler: Arc<ContextAssembler>,
    router: StageRouter<S>,
    registry: Arc<ResponderRegistry>,
    persister: Arc<TurnPersister>,
}

impl<S: LeadScorer> ProcessTurnHandler<S> {
    pub fn new(
        assembler: Arc<ContextAssembler>,
        router: StageRouter<S>,
        registry: Arc<ResponderRegistry>,
        persister: Arc<TurnPersister>,
    ) -> Self {
        Self {
            assembler,
            router,
            registry,
            persister,
        }
    }

    pub async fn handle(
        &self,
        session_id: SessionId,
        turns: &History,
    ) -> Result<ProcessTurnResult, ProcessTurnError> {
        let bundle = self.assembler.assemble(session_id).await?;
        let decision = self.router.route(turns, &bundle.snapshot).await?;

        tracing::info!(
            %session_id,
            from_stage = ?bundle.snapshot.stage,
            to_stage = ?decision.next_stage,
            responder = decision.responder.name(),
            "turn routed"
        );

        let responder = self
            .registry
            .get(decision.responder)
            .ok_or(ProcessTurnError::ResponderUnavailable(decision.responder))?;

        let context = ResponderContext {
            stage: decision.next_stage,
            flow_state: decision.flow_state.clone(),
            intelligence: decision.flow_state.intelligence.clone(),
            evidence: bundle.evidence.clone(),
        };

        let reply = responder
            .respond(turns, &context)
            .await
            .map_err(ProcessTurnError::Responder)?;

        let draft = TurnDraft {
            session_id,
            responder: decision.responder.name().to_string(),
            stage: decision.next_stage,
            evidence: bundle.evidence,
            metadata: reply
                .metadata
                .unwrap_or(TurnMetadata::Generic { notes: None }),
            event_id: None,
        };

        let stage = decision.next_stage;
        let persistence = self.persister.persist(draft, decision.flow_state).await;

        Ok(ProcessTurnResult {
            output: reply.output,
            agent: reply.agent,
            stage,
            persistence,
        })
    }
}
