//! Funnel domain: stages, flow state, detectors, router, and turn events.

pub mod detectors;
mod flow_state;
mod message;
pub mod router;
mod stage;
mod turn_event;

pub use flow_state::{ConversationFlowState, FitScore, Intelligence, LeadScore};
pub use message::{History, Message, Role, DETECTOR_WINDOW};
pub use router::{
    LeadScorer, RouterDecision, RouterError, ScoringOutcome, SessionSnapshot, StageRouter,
};
pub use stage::{ResponderKind, Stage};
pub use turn_event::{
    cap_metadata, MetadataRecord, MetadataStub, StubScalars, TurnEvent, TurnMetadata,
    METADATA_SIZE_CAP_BYTES,
};
