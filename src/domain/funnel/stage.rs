//! Funnel stages and the stage-to-responder dispatch table.
//!
//! Stages flow forward through the funnel in normal operation, but four
//! override stages (`Objection`, `ForceExit`, `BookingRequested`, `Admin`)
//! are reachable from anywhere. `Scoring` and `IntelligenceGathering` are
//! transient: a full router pass always resolves them to a terminal stage
//! before returning.

use serde::{Deserialize, Serialize};

/// One discrete phase of the sales funnel state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovery,
    Scoring,
    IntelligenceGathering,
    WorkshopPitch,
    ConsultingPitch,
    Pitching,
    Proposal,
    Objection,
    Closing,
    BookingRequested,
    Booked,
    Summary,
    Retargeting,
    Admin,
    ForceExit,
}

impl Stage {
    /// Returns all stages in funnel order.
    pub fn all() -> [Stage; 15] {
        [
            Stage::Discovery,
            Stage::Scoring,
            Stage::IntelligenceGathering,
            Stage::WorkshopPitch,
            Stage::ConsultingPitch,
            Stage::Pitching,
            Stage::Proposal,
            Stage::Objection,
            Stage::Closing,
            Stage::BookingRequested,
            Stage::Booked,
            Stage::Summary,
            Stage::Retargeting,
            Stage::Admin,
            Stage::ForceExit,
        ]
    }

    /// Returns true for stages reachable from any other stage.
    pub fn is_override_target(&self) -> bool {
        matches!(
            self,
            Stage::Objection | Stage::ForceExit | Stage::BookingRequested | Stage::Admin
        )
    }

    /// Returns true for stages control never rests on across a full
    /// router pass.
    pub fn is_transient(&self) -> bool {
        matches!(self, Stage::Scoring | Stage::IntelligenceGathering)
    }

    /// Returns true once the conversation has reached a pitch stage.
    pub fn is_pitch(&self) -> bool {
        matches!(
            self,
            Stage::WorkshopPitch | Stage::ConsultingPitch | Stage::Pitching
        )
    }

    /// Returns the responder that handles this stage in plain dispatch.
    ///
    /// Override rules in the router may select a different responder before
    /// this table is consulted.
    pub fn responder(&self) -> ResponderKind {
        match self {
            Stage::Discovery => ResponderKind::Discovery,
            Stage::Scoring => ResponderKind::Scoring,
            Stage::IntelligenceGathering => ResponderKind::Discovery,
            Stage::WorkshopPitch => ResponderKind::WorkshopPitch,
            Stage::ConsultingPitch => ResponderKind::ConsultingPitch,
            Stage::Pitching => ResponderKind::GenericPitch,
            Stage::Proposal => ResponderKind::Proposal,
            Stage::Objection => ResponderKind::Objection,
            Stage::Closing => ResponderKind::Closing,
            Stage::BookingRequested => ResponderKind::Closing,
            Stage::Booked => ResponderKind::Summary,
            Stage::Summary => ResponderKind::Summary,
            Stage::Retargeting => ResponderKind::Retargeting,
            Stage::Admin => ResponderKind::Admin,
            Stage::ForceExit => ResponderKind::Summary,
        }
    }

    /// Returns a short label suitable for UI display.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Discovery => "Discovery",
            Stage::Scoring => "Scoring",
            Stage::IntelligenceGathering => "Intelligence Gathering",
            Stage::WorkshopPitch => "Workshop Pitch",
            Stage::ConsultingPitch => "Consulting Pitch",
            Stage::Pitching => "Pitching",
            Stage::Proposal => "Proposal",
            Stage::Objection => "Objection",
            Stage::Closing => "Closing",
            Stage::BookingRequested => "Booking Requested",
            Stage::Booked => "Booked",
            Stage::Summary => "Summary",
            Stage::Retargeting => "Retargeting",
            Stage::Admin => "Admin",
            Stage::ForceExit => "Force Exit",
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Stage::Discovery
    }
}

/// Identifies which specialized responder produces the reply for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderKind {
    Discovery,
    Scoring,
    WorkshopPitch,
    ConsultingPitch,
    GenericPitch,
    Proposal,
    Objection,
    Closing,
    Summary,
    Retargeting,
    Admin,
}

impl ResponderKind {
    /// Stable name recorded in turn events.
    pub fn name(&self) -> &'static str {
        match self {
            ResponderKind::Discovery => "discovery",
            ResponderKind::Scoring => "scoring",
            ResponderKind::WorkshopPitch => "workshop_pitch",
            ResponderKind::ConsultingPitch => "consulting_pitch",
            ResponderKind::GenericPitch => "generic_pitch",
            ResponderKind::Proposal => "proposal",
            ResponderKind::Objection => "objection",
            ResponderKind::Closing => "closing",
            ResponderKind::Summary => "summary",
            ResponderKind::Retargeting => "retargeting",
            ResponderKind::Admin => "admin",
        }
    }
}

impl std::fmt::Display for ResponderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
