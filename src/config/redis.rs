//! Redis configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Redis configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
}

impl RedisConfig {
    /// Validate Redis configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("REDIS_URL"));
        }
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(ValidationError::InvalidRedisUrl);
        }
        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self { url: String::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_missing_url() {
        assert!(RedisConfig::default().validate().is_err());
    }

    #[test]
    fn test_validation_invalid_url() {
        let config = RedisConfig {
            url: "http://localhost:6379".to_string(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_valid_url() {
        let config = RedisConfig {
            url: "redis://localhost:6379".to_string(),
        };
        assert!(config.validate().is_ok());
    }
}
