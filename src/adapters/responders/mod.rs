//! Responder implementations.

mod scripted;

pub use scripted::{scripted_registry, ScriptedLeadScorer, ScriptedResponder};
