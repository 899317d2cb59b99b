//! In-memory adapters for tests and local development.

mod cache;
mod queue;
mod session_store;

pub use cache::InMemoryCache;
pub use queue::InMemoryQueue;
pub use session_store::InMemorySessionStore;
