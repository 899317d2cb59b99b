//! Per-session conversation flow state.
//!
//! This is the mutable heart of a session: counters, flags, and scores the
//! router reads and updates on every pass. It is never touched by responders
//! directly; it travels through the versioned write as one atomic unit with
//! the stage decision.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;

/// Suitability estimate for the two offering types, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitScore {
    pub workshop: f64,
    pub consulting: f64,
}

impl FitScore {
    /// Creates a validated fit score pair.
    pub fn new(workshop: f64, consulting: f64) -> Result<Self, ValidationError> {
        for (field, value) in [("workshop", workshop), ("consulting", consulting)] {
            if !(0.0..=1.0).contains(&value) || value.is_nan() {
                return Err(ValidationError::out_of_range(field, 0.0, 1.0, value));
            }
        }
        Ok(Self {
            workshop,
            consulting,
        })
    }
}

/// Qualification score for the lead, in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadScore(u8);

impl LeadScore {
    /// Creates a validated lead score.
    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if value > 100 {
            return Err(ValidationError::out_of_range(
                "lead_score",
                0.0,
                100.0,
                value as f64,
            ));
        }
        Ok(Self(value))
    }

    /// Returns the raw value.
    pub fn value(&self) -> u8 {
        self.0
    }
}

/// Intelligence gathered about the prospect during discovery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intelligence {
    pub company_name: Option<String>,
    pub contact_role: Option<String>,
    pub company_size: Option<String>,
    /// Raw on capture; the persistence service replaces it with a one-way
    /// hash before any durable write.
    pub contact_email: Option<String>,
}

impl Intelligence {
    /// Returns true when there is enough context to run scoring: a company
    /// name plus at least one of role or company size.
    pub fn sufficient_for_scoring(&self) -> bool {
        self.company_name.is_some()
            && (self.contact_role.is_some() || self.company_size.is_some())
    }
}

/// Tracks counters, flags, and scores for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationFlowState {
    exit_attempts: u32,
    pub objection_count: u32,
    pub scoring_complete: bool,
    pub fit_score: Option<FitScore>,
    pub lead_score: Option<LeadScore>,
    pub pitch_delivered: bool,
    pub proposal_generated: bool,
    pub intelligence: Intelligence,
}

impl ConversationFlowState {
    /// Creates a fresh flow state for a new session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a frustration detection. The counter is monotonic; there is
    /// no way to decrement it.
    pub fn record_exit_attempt(&mut self) {
        self.exit_attempts += 1;
    }

    /// Number of frustration detections so far.
    pub fn exit_attempts(&self) -> u32 {
        self.exit_attempts
    }

    /// Records an objection detection.
    pub fn record_objection(&mut self) {
        self.objection_count += 1;
    }

    /// Marks scoring as complete with the returned scores.
    pub fn complete_scoring(&mut self, fit: FitScore, lead: LeadScore) {
        self.scoring_complete = true;
        self.fit_score = Some(fit);
        self.lead_score = Some(lead);
    }

    /// Restores a flow state from persisted fields. Used by store adapters.
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        exit_attempts: u32,
        objection_count: u32,
        scoring_complete: bool,
        fit_score: Option<FitScore>,
        lead_score: Option<LeadScore>,
        pitch_delivered: bool,
        proposal_generated: bool,
        intelligence: Intelligence,
    ) -> Self {
        Self {
            exit_attempts,
            objection_count,
            scoring_complete,
            fit_score,
            lead_score,
            pitch_delivered,
            proposal_generated,
            intelligence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod fit_score {
        use super::*;

        #[test]
        fn accepts_values_in_unit_interval() {
            let fit = FitScore::new(0.82, 0.3).unwrap();
            assert_eq!(fit.workshop, 0.82);
            assert_eq!(fit.consulting, 0.3);
        }

        #[test]
        fn accepts_boundaries() {
            assert!(FitScore::new(0.0, 1.0).is_ok());
        }

        #[test]
        fn rejects_out_of_range() {
            assert!(FitScore::new(1.01, 0.5).is_err());
            assert!(FitScore::new(0.5, -0.1).is_err());
        }

        #[test]
        fn rejects_nan() {
            assert!(FitScore::new(f64::NAN, 0.5).is_err());
        }
    }

    mod lead_score {
        use super::*;

        #[test]
        fn accepts_zero_to_hundred() {
            assert_eq!(LeadScore::new(0).unwrap().value(), 0);
            assert_eq!(LeadScore::new(100).unwrap().value(), 100);
        }

        #[test]
        fn rejects_above_hundred() {
            assert!(LeadScore::new(101).is_err());
        }
    }

    mod exit_counter {
        use super::*;

        #[test]
        fn starts_at_zero() {
            assert_eq!(ConversationFlowState::new().exit_attempts(), 0);
        }

        #[test]
        fn increments_monotonically() {
            let mut state = ConversationFlowState::new();
            state.record_exit_attempt();
            state.record_exit_attempt();
            assert_eq!(state.exit_attempts(), 2);
        }
    }

    mod scoring {
        use super::*;

        #[test]
        fn complete_scoring_sets_flag_and_scores() {
            let mut state = ConversationFlowState::new();
            assert!(!state.scoring_complete);

            state.complete_scoring(FitScore::new(0.7, 0.2).unwrap(), LeadScore::new(65).unwrap());

            assert!(state.scoring_complete);
            assert_eq!(state.fit_score.unwrap().workshop, 0.7);
            assert_eq!(state.lead_score.unwrap().value(), 65);
        }
    }

    mod intelligence {
        use super::*;

        #[test]
        fn insufficient_without_company_name() {
            let intel = Intelligence {
                contact_role: Some("CTO".into()),
                ..Default::default()
            };
            assert!(!intel.sufficient_for_scoring());
        }

        #[test]
        fn insufficient_with_company_name_alone() {
            let intel = Intelligence {
                company_name: Some("Acme GmbH".into()),
                ..Default::default()
            };
            assert!(!intel.sufficient_for_scoring());
        }

        #[test]
        fn sufficient_with_company_and_role() {
            let intel = Intelligence {
                company_name: Some("Acme GmbH".into()),
                contact_role: Some("CTO".into()),
                ..Default::default()
            };
            assert!(intel.sufficient_for_scoring());
        }

        #[test]
        fn sufficient_with_company_and_size() {
            let intel = Intelligence {
                company_name: Some("Acme GmbH".into()),
                company_size: Some("50-200".into()),
                ..Default::default()
            };
            assert!(intel.sufficient_for_scoring());
        }
    }

    #[test]
    fn flow_state_roundtrips_through_json() {
        let mut state = ConversationFlowState::new();
        state.record_exit_attempt();
        state.record_objection();
        state.pitch_delivered = true;
        state.complete_scoring(FitScore::new(0.5, 0.55).unwrap(), LeadScore::new(40).unwrap());

        let json = serde_json::to_string(&state).unwrap();
        let back: ConversationFlowState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }
}
