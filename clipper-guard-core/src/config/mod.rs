//! Configuration management

pub mod validation;

pub use validation::{Validate, ValidationError};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix, e.g. `CLIPPER_GUARD__SERVER__PORT`
pub const ENV_PREFIX: &str = "CLIPPER_GUARD";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub rate_limit: RateLimitConfig,
    pub abuse: AbuseConfig,
    pub whitelist: WhitelistConfig,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Global request timeout in seconds applied at the HTTP layer.
    pub request_timeout_seconds: u64,
    /// Read the client address from `x-forwarded-for` / `x-real-ip`.
    /// Only enable behind a proxy that appends the peer address to
    /// `x-forwarded-for` or overwrites `x-real-ip`.
    pub trust_forwarded_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            request_timeout_seconds: 30,
            trust_forwarded_headers: false,
        }
    }
}

/// Storage backend for counters and ban records
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Shared Redis store (production, multi-instance)
    #[default]
    Redis,
    /// Process-local store (development, single instance, tests)
    Memory,
}

/// Quota store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub url: String,
    /// Upper bound for a single store round-trip before the fallback takes over
    pub timeout_ms: u64,
    /// How often the background probe retries the primary store while degraded
    pub probe_interval_seconds: u64,
    /// Cleanup interval for expired in-memory entries in seconds
    pub cleanup_interval_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            url: "redis://127.0.0.1:6379".to_string(),
            timeout_ms: 250,
            probe_interval_seconds: 5,
            cleanup_interval_seconds: 300,
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_seconds)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

/// Multipliers applied to a policy's base limit per subscription tier.
///
/// Admins are not listed: they bypass rate limiting entirely.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierMultipliers {
    pub premium: f64,
    pub basic: f64,
    pub unauthenticated: f64,
}

impl Default for TierMultipliers {
    fn default() -> Self {
        Self {
            premium: 5.0,
            basic: 1.0,
            unauthenticated: 1.0,
        }
    }
}

/// A single named policy as written in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Requests admitted per window at multiplier 1.0
    pub limit: u32,
    /// Window length in seconds
    pub window_seconds: u64,
    /// Per-policy override of the default tier multipliers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multipliers: Option<TierMultipliers>,
}

impl PolicyConfig {
    pub fn new(limit: u32, window_seconds: u64) -> Self {
        Self {
            limit,
            window_seconds,
            multipliers: None,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    pub enabled: bool,
    /// Default tier multipliers, used by policies without an override
    pub multipliers: TierMultipliers,
    /// Policy table keyed by policy name
    pub policies: BTreeMap<String, PolicyConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let policies = [
            // Per-minute endpoint limits
            ("clips-list", PolicyConfig::new(100, 60)),
            ("clips-create", PolicyConfig::new(10, 60)),
            ("feed", PolicyConfig::new(30, 60)),
            ("user-profile", PolicyConfig::new(200, 60)),
            ("comment-create", PolicyConfig::new(10, 60)),
            ("vote", PolicyConfig::new(20, 60)),
            ("follow", PolicyConfig::new(20, 60)),
            ("report", PolicyConfig::new(10, 60)),
            // Hourly limits for expensive or sensitive actions
            ("submission", PolicyConfig::new(10, 3600)),
            ("watch-party-create", PolicyConfig::new(10, 3600)),
            ("export", PolicyConfig::new(1, 3600)),
            ("account-deletion", PolicyConfig::new(1, 3600)),
            // Catch-all API limit: 100 requests per 15 minutes
            ("api", PolicyConfig::new(100, 900)),
        ]
        .into_iter()
        .map(|(name, policy)| (name.to_string(), policy))
        .collect();

        Self {
            enabled: true,
            multipliers: TierMultipliers::default(),
            policies,
        }
    }
}

/// Abuse detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AbuseConfig {
    pub enabled: bool,
    /// Requests per IP tolerated within one detection window
    pub threshold: u64,
    /// Detection window in seconds
    pub window_seconds: u64,
    /// Ban duration in seconds
    pub ban_duration_seconds: u64,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 1000,
            window_seconds: 3600,
            ban_duration_seconds: 86_400,
        }
    }
}

impl AbuseConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    pub fn ban_duration(&self) -> Duration {
        Duration::from_secs(self.ban_duration_seconds)
    }
}

/// Static exemptions from rate limiting and abuse detection.
/// Loopback addresses are always exempt and need not be listed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WhitelistConfig {
    /// IP addresses or CIDR blocks
    pub ips: Vec<String>,
}

/// Admin control surface configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Token expected in `x-admin-token`. Admin routes are disabled when unset.
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "json" or "pretty"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.store.validate()?;
        self.rate_limit.validate()?;
        self.abuse.validate()?;
        self.whitelist.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

impl Config {
    /// Load configuration from `config/` files and environment variables
    pub fn load() -> Result<Self, ConfigLoadError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        // Add environment-specific config if ENV is set
        if let Ok(env) = std::env::var("ENV") {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{}", env)).required(false));
        }

        // Add local config and environment variables last (highest priority)
        builder = builder
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(environment_source());

        Self::finish(builder)
    }

    /// Load configuration from an explicit file, still honouring environment overrides
    pub fn load_from(path: &Path) -> Result<Self, ConfigLoadError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(environment_source());

        Self::finish(builder)
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigLoadError> {
        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

fn environment_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("whitelist.ips")
}

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Configuration file error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Validation(#[from] ValidationError),
}
