//! Application layer: use-case handlers wiring domain logic to ports.

mod assemble_context;
mod persist_turn;
mod process_turn;
mod replay_writes;

pub use assemble_context::{ContextAssembler, ContextBundle};
pub use persist_turn::{
    DeferReason, PersistOutcome, PersistenceBudget, ReplayPayload, TurnDraft, TurnPersister,
    FALLBACK_NAMESPACE, FALLBACK_TTL_SECS, METADATA_NAMESPACE,
};
pub use process_turn::{ProcessTurnError, ProcessTurnHandler, ProcessTurnResult};
pub use replay_writes::{ReplayTick, WriteReplayer, MAX_REPLAY_ATTEMPTS};
