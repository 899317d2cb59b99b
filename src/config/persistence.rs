//! Persistence budget configuration
//!
//! Budgets for the synchronous write path and the evidence gate. Defaults
//! keep the turn pipeline under its latency target.

use serde::Deserialize;
use std::time::Duration;

use crate::application::PersistenceBudget;
use crate::domain::evidence::REJECTION_THRESHOLD;

use super::error::ValidationError;

/// Persistence and evidence tuning
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Version-conflict retries after the initial attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Linear backoff between attempts, in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Overall write deadline, in milliseconds
    #[serde(default = "default_overall_timeout_ms")]
    pub overall_timeout_ms: u64,

    /// Fallback cache entry TTL, in seconds
    #[serde(default = "default_fallback_ttl_secs")]
    pub fallback_ttl_secs: u64,

    /// Replay worker poll interval, in milliseconds
    #[serde(default = "default_replay_poll_ms")]
    pub replay_poll_ms: u64,

    /// Evidence quality gate
    #[serde(default = "default_rejection_threshold")]
    pub rejection_threshold: f64,
}

impl PersistenceConfig {
    /// Budget for the synchronous write path
    pub fn budget(&self) -> PersistenceBudget {
        PersistenceBudget {
            max_retries: self.max_retries,
            backoff: Duration::from_millis(self.backoff_ms),
            overall_timeout: Duration::from_millis(self.overall_timeout_ms),
            fallback_ttl: Duration::from_secs(self.fallback_ttl_secs),
        }
    }

    /// Replay worker poll interval as Duration
    pub fn replay_poll(&self) -> Duration {
        Duration::from_millis(self.replay_poll_ms)
    }

    /// Validate persistence configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.overall_timeout_ms <= self.backoff_ms {
            return Err(ValidationError::InvalidPersistenceBudget);
        }
        if !(0.0..=1.0).contains(&self.rejection_threshold) {
            return Err(ValidationError::InvalidRejectionThreshold);
        }
        Ok(())
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            overall_timeout_ms: default_overall_timeout_ms(),
            fallback_ttl_secs: default_fallback_ttl_secs(),
            replay_poll_ms: default_replay_poll_ms(),
            rejection_threshold: default_rejection_threshold(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    50
}

fn default_overall_timeout_ms() -> u64 {
    80
}

fn default_fallback_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_replay_poll_ms() -> u64 {
    500
}

fn default_rejection_threshold() -> f64 {
    REJECTION_THRESHOLD
}
