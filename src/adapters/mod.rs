//! Adapters: concrete implementations of the ports.

pub mod http;
pub mod memory;
pub mod postgres;
pub mod redis;
pub mod responders;

pub use memory::{InMemoryCache, InMemoryQueue, InMemorySessionStore};
pub use postgres::PostgresSessionStore;
pub use redis::{RedisCache, RedisQueue};
pub use responders::{scripted_registry, ScriptedLeadScorer, ScriptedResponder};
