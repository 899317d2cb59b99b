//! Scripted responders.
//!
//! Deterministic, template-driven implementations of the responder and
//! scorer seams. They stand in for the generative agents in local
//! development and tests, and exercise the same metadata contract the real
//! agents would.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::foundation::DomainError;
use crate::domain::funnel::{
    FitScore, History, Intelligence, LeadScore, LeadScorer, ResponderKind, ScoringOutcome,
    TurnMetadata,
};
use crate::ports::{Responder, ResponderContext, ResponderOutput, ResponderRegistry};

/// One scripted responder, parameterized by kind.
pub struct ScriptedResponder {
    kind: ResponderKind,
}

impl ScriptedResponder {
    pub fn new(kind: ResponderKind) -> Self {
        Self { kind }
    }

    fn company(&self, intelligence: &Intelligence) -> String {
        intelligence
            .company_name
            .clone()
            .unwrap_or_else(|| "your company".to_string())
    }

    fn reply_for(&self, context: &ResponderContext) -> (String, Option<TurnMetadata>) {
        let company = self.company(&context.intelligence);
        match self.kind {
            ResponderKind::Discovery => (
                format!(
                    "Tell me a bit more about {} and what you're hoping to improve.",
                    company
                ),
                Some(TurnMetadata::Discovery {
                    topics: vec!["goals".to_string(), "team".to_string()],
                }),
            ),
            ResponderKind::Scoring => (
                "Let me make sure I understand where you stand.".to_string(),
                match (context.flow_state.lead_score, context.flow_state.fit_score) {
                    (Some(lead_score), Some(fit_score)) => Some(TurnMetadata::Scoring {
                        lead_score,
                        fit_score,
                    }),
                    _ => None,
                },
            ),
            ResponderKind::WorkshopPitch => (
                format!(
                    "Based on what you've shared, a focused workshop would suit {} well.",
                    company
                ),
                Some(TurnMetadata::Pitch {
                    pitch_type: "workshop".to_string(),
                    talking_points: vec![
                        "hands-on format".to_string(),
                        "fixed scope and price".to_string(),
                    ],
                }),
            ),
            ResponderKind::ConsultingPitch => (
                format!(
                    "An ongoing consulting engagement looks like the right shape for {}.",
                    company
                ),
                Some(TurnMetadata::Pitch {
                    pitch_type: "consulting".to_string(),
                    talking_points: vec![
                        "embedded with your team".to_string(),
                        "scales with the roadmap".to_string(),
                    ],
                }),
            ),
            ResponderKind::GenericPitch => (
                "Here's how we typically help teams like yours.".to_string(),
                Some(TurnMetadata::Pitch {
                    pitch_type: "generic".to_string(),
                    talking_points: vec!["case studies".to_string()],
                }),
            ),
            ResponderKind::Proposal => (
                format!("I'll put together a written proposal for {}.", company),
                Some(TurnMetadata::Generic {
                    notes: Some("proposal drafted".to_string()),
                }),
            ),
            ResponderKind::Objection => (
                "That's a fair concern. Let me address it directly.".to_string(),
                Some(TurnMetadata::Objection {
                    objection_count: context.flow_state.objection_count,
                    rebuttal_angle: Some("value_over_cost".to_string()),
                }),
            ),
            ResponderKind::Closing => (
                "Here's a booking link to pick a time that works for you.".to_string(),
                Some(TurnMetadata::Closing {
                    booking_link_sent: true,
                }),
            ),
            ResponderKind::Summary => (
                "Thanks for the conversation. Here's a quick recap of what we covered."
                    .to_string(),
                Some(TurnMetadata::Summary {
                    highlights: vec!["recap sent".to_string()],
                }),
            ),
            ResponderKind::Retargeting => (
                "Following up on our earlier conversation, is now a better time?".to_string(),
                Some(TurnMetadata::Generic {
                    notes: Some("retargeting touch".to_string()),
                }),
            ),
            ResponderKind::Admin => (
                "Admin mode. Session state is available on the session endpoint.".to_string(),
                Some(TurnMetadata::Admin {
                    command: "status".to_string(),
                }),
            ),
        }
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn respond(
        &self,
        _turns: &History,
        context: &ResponderContext,
    ) -> Result<ResponderOutput, DomainError> {
        let (mut output, metadata) = self.reply_for(context);

        if let Some(evidence) = &context.evidence {
            output.push_str(&format!(
                " (I can also see what you shared on {}.)",
                match evidence.modality {
                    crate::domain::evidence::Modality::Screen => "your screen",
                    crate::domain::evidence::Modality::Webcam => "camera",
                    crate::domain::evidence::Modality::Upload => "the upload",
                }
            ));
        }

        Ok(ResponderOutput {
            output,
            agent: self.kind.name().to_string(),
            metadata,
        })
    }
}

/// Deterministic scorer over gathered intelligence.
///
/// Lead score rises with intelligence completeness; fit leans workshop for
/// smaller teams and consulting for larger ones.
pub struct ScriptedLeadScorer;

#[async_trait]
impl LeadScorer for ScriptedLeadScorer {
    async fn score(
        &self,
        turns: &History,
        intelligence: &Intelligence,
    ) -> Result<ScoringOutcome, DomainError> {
        let known = [
            intelligence.company_name.is_some(),
            intelligence.contact_role.is_some(),
            intelligence.company_size.is_some(),
            intelligence.contact_email.is_some(),
        ]
        .iter()
        .filter(|&&present| present)
        .count() as u8;

        let engagement = (turns.len() as u8).min(10);
        let lead = LeadScore::new((30 + known * 12 + engagement * 2).min(100))
            .map_err(DomainError::from)?;

        let size = intelligence.company_size.as_deref().unwrap_or("");
        let large = size.contains("200") || size.contains("500") || size.contains("1000");
        let fit = if large {
            FitScore::new(0.35, 0.75)
        } else {
            FitScore::new(0.75, 0.35)
        }
        .map_err(DomainError::from)?;

        Ok(ScoringOutcome { fit, lead })
    }
}

/// Registry with a scripted responder for every kind.
pub fn scripted_registry() -> ResponderRegistry {
    let mut registry = ResponderRegistry::new();
    for kind in [
        ResponderKind::Discovery,
        ResponderKind::Scoring,
        ResponderKind::WorkshopPitch,
        ResponderKind::ConsultingPitch,
        ResponderKind::GenericPitch,
        ResponderKind::Proposal,
        ResponderKind::Objection,
        ResponderKind::Closing,
        ResponderKind::Summary,
        ResponderKind::Retargeting,
        ResponderKind::Admin,
    ] {
        registry.register(kind, Arc::new(ScriptedResponder::new(kind)));
    }
    registry
}
