//! Redis adapters: cache and job queue.

mod cache;
mod queue;

pub use cache::RedisCache;
pub use queue::RedisQueue;
