//! Quota Store
//!
//! Counter and ban storage shared by every guard instance:
//! - Redis for distributed, production use
//! - In-memory for development, single-instance deployments and the fallback counter

pub mod memory;
pub mod redis_store;

pub use memory::InMemoryQuotaStore;
pub use redis_store::RedisQuotaStore;

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{StoreBackend, StoreConfig};
use crate::domain::BanRecord;
use crate::infrastructure::clock::Clock;

/// Prefix of per-policy quota keys
pub const RATE_LIMIT_PREFIX: &str = "ratelimit";
/// Prefix of per-IP abuse counters
pub const ABUSE_TRACK_PREFIX: &str = "abuse:track";
/// Prefix of ban records
pub const BAN_PREFIX: &str = "abuse:ban";

pub fn abuse_key(ip: IpAddr) -> String {
    format!("{}:{}", ABUSE_TRACK_PREFIX, ip)
}

pub fn ban_key(ip: IpAddr) -> String {
    format!("{}:{}", BAN_PREFIX, ip)
}

/// Error type for store operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store call timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Store serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Counter value and the time left in its window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub count: u64,
    pub ttl: Duration,
}

/// Windowed counters
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Atomically increment `key` and return the post-increment value.
    /// The first increment of a window sets the expiry to `window`.
    async fn increment(&self, key: &str, window: Duration) -> Result<CounterSnapshot, StoreError>;

    /// Read a counter without touching it
    async fn get(&self, key: &str) -> Result<Option<CounterSnapshot>, StoreError>;

    /// Delete a counter
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Liveness check used by the recovery probe
    async fn ping(&self) -> Result<(), StoreError>;

    /// Cleanup expired entries (for in-memory storage)
    async fn cleanup(&self);
}

/// Ban records keyed by IP
#[async_trait]
pub trait BanStore: Send + Sync {
    /// Store `record` with expiry `ttl` unless a ban already exists.
    /// Returns true if this call created the ban.
    async fn insert_ban(&self, record: &BanRecord, ttl: Duration) -> Result<bool, StoreError>;

    async fn get_ban(&self, ip: IpAddr) -> Result<Option<BanRecord>, StoreError>;

    /// Returns true if a ban was removed
    async fn remove_ban(&self, ip: IpAddr) -> Result<bool, StoreError>;

    async fn list_bans(&self) -> Result<Vec<BanRecord>, StoreError>;
}

/// A backend that holds both counters and bans
pub trait GuardStore: QuotaStore + BanStore {}

impl<T: QuotaStore + BanStore> GuardStore for T {}

/// Open the configured backend.
///
/// Redis connects lazily, so an unreachable server is not an error here:
/// the caller decides whether to start in fallback mode.
pub fn open(config: &StoreConfig, clock: Arc<dyn Clock>) -> Result<Arc<dyn GuardStore>, StoreError> {
    match config.backend {
        StoreBackend::Redis => Ok(Arc::new(RedisQuotaStore::open(&config.url)?)),
        StoreBackend::Memory => Ok(Arc::new(InMemoryQuotaStore::new(clock))),
    }
}
