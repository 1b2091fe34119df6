//! Configuration validation module

use crate::config::{
    AbuseConfig, LoggingConfig, PolicyConfig, RateLimitConfig, ServerConfig, StoreBackend,
    StoreConfig, TierMultipliers, WhitelistConfig,
};
use crate::infrastructure::whitelist::parse_entry;

/// Trait for validating configuration sections
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Server configuration error: {message}")]
    Server { message: String },

    #[error("Store configuration error: {message}")]
    Store { message: String },

    #[error("Rate limit configuration error: {message}")]
    RateLimit { message: String },

    #[error("Abuse detection configuration error: {message}")]
    Abuse { message: String },

    #[error("Whitelist configuration error: {message}")]
    Whitelist { message: String },

    #[error("Logging configuration error: {message}")]
    Logging { message: String },
}

impl ValidationError {
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit {
            message: message.into(),
        }
    }

    pub fn abuse(message: impl Into<String>) -> Self {
        Self::Abuse {
            message: message.into(),
        }
    }

    pub fn whitelist(message: impl Into<String>) -> Self {
        Self::Whitelist {
            message: message.into(),
        }
    }

    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // u16 cannot exceed 65535, so only 0 is out of range
        if self.port == 0 {
            return Err(ValidationError::server(format!(
                "Port must be in range 1-65535, got {}",
                self.port
            )));
        }

        if self.host.is_empty() {
            return Err(ValidationError::server("Host cannot be empty"));
        }

        if self.request_timeout_seconds == 0 {
            return Err(ValidationError::server(
                "Request timeout must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Validate for StoreConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.backend == StoreBackend::Redis
            && !self.url.starts_with("redis://")
            && !self.url.starts_with("rediss://")
        {
            return Err(ValidationError::store(format!(
                "Store url must start with redis:// or rediss://, got: {}",
                self.url
            )));
        }

        if self.timeout_ms == 0 {
            return Err(ValidationError::store(
                "Store timeout must be greater than 0 milliseconds",
            ));
        }

        if self.probe_interval_seconds == 0 {
            return Err(ValidationError::store(
                "Probe interval must be greater than 0 seconds",
            ));
        }

        if self.cleanup_interval_seconds == 0 {
            return Err(ValidationError::store(
                "Cleanup interval must be greater than 0 seconds",
            ));
        }

        Ok(())
    }
}

impl TierMultipliers {
    /// Check the multiplier table, using `context` to name the offending policy
    pub fn validate_for(&self, context: &str) -> Result<(), ValidationError> {
        for (tier, value) in [
            ("premium", self.premium),
            ("basic", self.basic),
            ("unauthenticated", self.unauthenticated),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ValidationError::rate_limit(format!(
                    "{context}: {tier} multiplier must be a positive number, got {value}"
                )));
            }
        }

        if self.premium < self.basic {
            return Err(ValidationError::rate_limit(format!(
                "{context}: premium multiplier ({}) must not be lower than basic ({})",
                self.premium, self.basic
            )));
        }

        Ok(())
    }
}

impl PolicyConfig {
    fn validate_named(&self, name: &str) -> Result<(), ValidationError> {
        if name.trim().is_empty() {
            return Err(ValidationError::rate_limit("Policy name cannot be empty"));
        }

        if self.limit == 0 {
            return Err(ValidationError::rate_limit(format!(
                "Policy '{name}': limit must be greater than 0"
            )));
        }

        if self.window_seconds == 0 {
            return Err(ValidationError::rate_limit(format!(
                "Policy '{name}': window_seconds must be greater than 0"
            )));
        }

        if let Some(multipliers) = &self.multipliers {
            multipliers.validate_for(&format!("Policy '{name}'"))?;
        }

        Ok(())
    }
}

impl Validate for RateLimitConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        self.multipliers.validate_for("Default multipliers")?;

        for (name, policy) in &self.policies {
            policy.validate_named(name)?;
        }

        Ok(())
    }
}

impl Validate for AbuseConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.threshold == 0 {
            return Err(ValidationError::abuse("Threshold must be greater than 0"));
        }

        if self.window_seconds == 0 {
            return Err(ValidationError::abuse(
                "Detection window must be greater than 0 seconds",
            ));
        }

        if self.ban_duration_seconds == 0 {
            return Err(ValidationError::abuse(
                "Ban duration must be greater than 0 seconds",
            ));
        }

        // The counter must expire before the ban does, or the next request re-bans
        if self.ban_duration_seconds < self.window_seconds {
            return Err(ValidationError::abuse(format!(
                "Ban duration ({}s) must not be shorter than the detection window ({}s)",
                self.ban_duration_seconds, self.window_seconds
            )));
        }

        Ok(())
    }
}

impl Validate for WhitelistConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        for entry in &self.ips {
            parse_entry(entry).map_err(|e| ValidationError::whitelist(e.to_string()))?;
        }
        Ok(())
    }
}

impl Validate for LoggingConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        match self.format.as_str() {
            "json" | "pretty" => Ok(()),
            other => Err(ValidationError::logging(format!(
                "Log format must be 'json' or 'pretty', got: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_rejects_zero_port() {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::Server { .. })
        ));
    }

    #[test]
    fn test_store_requires_redis_url() {
        let config = StoreConfig {
            url: "http://localhost:6379".to_string(),
            ..StoreConfig::default()
        };
        assert!(config.validate().is_err());

        let memory = StoreConfig {
            backend: StoreBackend::Memory,
            url: String::new(),
            ..StoreConfig::default()
        };
        assert!(memory.validate().is_ok());
    }

    #[test]
    fn test_policy_rejects_zero_limit() {
        let mut config = RateLimitConfig::default();
        config
            .policies
            .insert("broken".to_string(), PolicyConfig::new(0, 60));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_multipliers_must_be_positive_and_monotonic() {
        let negative = TierMultipliers {
            premium: 5.0,
            basic: -1.0,
            unauthenticated: 1.0,
        };
        assert!(negative.validate_for("test").is_err());

        let nan = TierMultipliers {
            premium: f64::NAN,
            ..TierMultipliers::default()
        };
        assert!(nan.validate_for("test").is_err());

        let inverted = TierMultipliers {
            premium: 0.5,
            basic: 1.0,
            unauthenticated: 1.0,
        };
        assert!(inverted.validate_for("test").is_err());
    }

    #[test]
    fn test_whitelist_rejects_garbage() {
        let config = WhitelistConfig {
            ips: vec!["10.0.0.0/8".to_string(), "not-an-ip".to_string()],
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::Whitelist { .. })
        ));
    }

    #[test]
    fn test_abuse_rejects_zero_threshold() {
        let config = AbuseConfig {
            threshold: 0,
            ..AbuseConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_abuse_ban_must_outlast_window() {
        let short = AbuseConfig {
            window_seconds: 3600,
            ban_duration_seconds: 600,
            ..AbuseConfig::default()
        };
        let err = short.validate().unwrap_err();
        assert!(matches!(err, ValidationError::Abuse { .. }));
        assert!(err.to_string().contains("600s"));

        let equal = AbuseConfig {
            window_seconds: 600,
            ban_duration_seconds: 600,
            ..AbuseConfig::default()
        };
        assert!(equal.validate().is_ok());
    }

    #[test]
    fn test_logging_format() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            format: "xml".to_string(),
        };
        assert!(config.validate().is_err());
    }
}
