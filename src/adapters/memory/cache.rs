//! In-memory cache with TTL expiry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::ports::{Cache, CacheError};

#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, (Value, Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn full_key(namespace: &str, key: &str) -> String {
        format!("{}:{}", namespace, key)
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: Value,
        ttl_secs: u64,
    ) -> Result<(), CacheError> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        self.entries
            .write()
            .await
            .insert(Self::full_key(namespace, key), (value, expires_at));
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, CacheError> {
        let full_key = Self::full_key(namespace, key);
        let entries = self.entries.read().await;
        Ok(entries.get(&full_key).and_then(|(value, expires_at)| {
            if Instant::now() < *expires_at {
                Some(value.clone())
            } else {
                None
            }
        }))
    }
}
