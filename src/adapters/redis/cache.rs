//! Redis-backed cache implementation for production deployments.
//!
//! Keys are namespaced as `pitchflow:{namespace}:{key}` and always written
//! with an expiry, so the fallback path can never leak entries past the
//! retention window.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::Value;

use crate::ports::{Cache, CacheError};

/// Redis-backed [`Cache`].
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    fn redis_key(namespace: &str, key: &str) -> String {
        format!("pitchflow:{}:{}", namespace, key)
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: Value,
        ttl_secs: u64,
    ) -> Result<(), CacheError> {
        let redis_key = Self::redis_key(namespace, key);
        let serialized =
            serde_json::to_string(&value).map_err(|e| CacheError::Malformed(e.to_string()))?;

        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(&redis_key, serialized, ttl_secs)
            .await
            .map_err(|e: redis::RedisError| CacheError::Unavailable(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, CacheError> {
        let redis_key = Self::redis_key(namespace, key);

        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(&redis_key)
            .await
            .map_err(|e: redis::RedisError| CacheError::Unavailable(e.to_string()))?;

        match raw {
            Some(raw) => {
                let value =
                    serde_json::from_str(&raw).map_err(|e| CacheError::Malformed(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_carry_the_service_prefix() {
        assert_eq!(
            RedisCache::redis_key("fallback", "s1:e1"),
            "pitchflow:fallback:s1:e1"
        );
    }

    // Redis integration tests require a running Redis instance and are run
    // separately from unit tests.
}
