//! Responder contract: the black-box generative functions invoked per
//! stage.
//!
//! Responders must not mutate shared state; everything they need arrives in
//! the context bundle, and everything they produce comes back in the output.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::evidence::EvidenceItem;
use crate::domain::foundation::DomainError;
use crate::domain::funnel::{
    ConversationFlowState, History, Intelligence, ResponderKind, Stage, TurnMetadata,
};

/// Input bundle for one responder invocation.
#[derive(Debug, Clone)]
pub struct ResponderContext {
    pub stage: Stage,
    pub flow_state: ConversationFlowState,
    pub intelligence: Intelligence,
    /// Best usable evidence for this turn, if any cleared the quality gate.
    pub evidence: Option<EvidenceItem>,
}

/// What a responder returns for one turn.
#[derive(Debug, Clone)]
pub struct ResponderOutput {
    /// User-visible reply text.
    pub output: String,
    /// Self-reported agent name, recorded for diagnostics.
    pub agent: String,
    /// Bounded, responder-specific metadata.
    pub metadata: Option<TurnMetadata>,
}

/// A specialized response generator for one or more stages.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(
        &self,
        turns: &History,
        context: &ResponderContext,
    ) -> Result<ResponderOutput, DomainError>;
}

/// Lookup table from responder kind to implementation.
#[derive(Default)]
pub struct ResponderRegistry {
    responders: HashMap<ResponderKind, Arc<dyn Responder>>,
}

impl ResponderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a responder, replacing any prior registration for the
    /// kind.
    pub fn register(&mut self, kind: ResponderKind, responder: Arc<dyn Responder>) {
        self.responders.insert(kind, responder);
    }

    pub fn get(&self, kind: ResponderKind) -> Option<Arc<dyn Responder>> {
        self.responders.get(&kind).cloned()
    }
}
