//! Ports: capability interfaces the application layer depends on.

mod cache;
mod queue;
mod responder;
mod session_store;

pub use cache::{Cache, CacheError};
pub use queue::{
    EnqueueOptions, Job, JobPriority, Queue, QueueError, JOB_ANALYTICS, JOB_PERSIST_RETRY,
};
pub use responder::{Responder, ResponderContext, ResponderOutput, ResponderRegistry};
pub use session_store::{
    SessionPatch, SessionRecord, SessionStore, StoreError, Version, APPLIED_EVENTS_WINDOW,
};
