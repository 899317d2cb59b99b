//! Cache capability: namespaced key/value with TTL.
//!
//! Used only by the degraded write path (parked payloads, out-of-line
//! metadata blobs). Nothing on the hot read path depends on it.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache value is not valid JSON: {0}")]
    Malformed(String),
}

/// Port over the key-value cache service.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Stores a value under `namespace:key` with an expiry.
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: Value,
        ttl_secs: u64,
    ) -> Result<(), CacheError>;

    /// Fetches a value, `None` when absent or expired.
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, CacheError>;
}
