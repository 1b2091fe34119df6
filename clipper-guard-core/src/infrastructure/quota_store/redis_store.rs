//! Redis store backend

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{BAN_PREFIX, BanStore, CounterSnapshot, QuotaStore, StoreError, ban_key};
use crate::domain::BanRecord;

/// INCR and set the window expiry in one atomic step.
/// A key that somehow lost its TTL gets a fresh one instead of living forever.
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

const SCAN_BATCH: usize = 200;

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            StoreError::Timeout { millis: 0 }
        } else if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped()
        {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

/// Redis-backed counters and bans.
///
/// The connection is established on first use and re-established by the
/// connection manager afterwards, so the store can be created while Redis is
/// down and picked up later by the recovery probe.
pub struct RedisQuotaStore {
    client: redis::Client,
    connection: RwLock<Option<ConnectionManager>>,
    increment_script: redis::Script,
}

impl RedisQuotaStore {
    /// Validate the URL without connecting
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| {
            warn!("Failed to create Redis client for quota store: {}", e);
            StoreError::Backend(format!("Failed to create Redis client: {}", e))
        })?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            increment_script: redis::Script::new(INCREMENT_SCRIPT),
        })
    }

    /// Open and verify the connection with a PING
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let store = Self::open(url)?;
        store.ping().await?;
        debug!("Successfully connected to Redis for quota storage");
        Ok(store)
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut slot = self.connection.write().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let manager = ConnectionManager::new(self.client.clone()).await?;
        *slot = Some(manager.clone());
        Ok(manager)
    }
}

#[async_trait]
impl QuotaStore for RedisQuotaStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<CounterSnapshot, StoreError> {
        let mut conn = self.connection().await?;
        let window_ms = window.as_millis() as u64;

        let (count, ttl_ms): (u64, i64) = self
            .increment_script
            .key(key)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;

        Ok(CounterSnapshot {
            count,
            ttl: Duration::from_millis(u64::try_from(ttl_ms).unwrap_or(window_ms)),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<CounterSnapshot>, StoreError> {
        let mut conn = self.connection().await?;

        let (count, ttl_ms): (Option<u64>, i64) = redis::pipe()
            .cmd("GET")
            .arg(key)
            .cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await?;

        // PTTL is -2 for a missing key, -1 for a key without expiry
        Ok(count.map(|count| CounterSnapshot {
            count,
            ttl: Duration::from_millis(u64::try_from(ttl_ms).unwrap_or(0)),
        }))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("DEL")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    async fn cleanup(&self) {
        // Redis expires keys itself
    }
}

#[async_trait]
impl BanStore for RedisQuotaStore {
    async fn insert_ban(&self, record: &BanRecord, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let json = serde_json::to_string(record)?;

        // NX: an existing ban is never extended
        let created: Option<String> = redis::cmd("SET")
            .arg(ban_key(record.ip))
            .arg(json)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;

        Ok(created.is_some())
    }

    async fn get_ban(&self, ip: IpAddr) -> Result<Option<BanRecord>, StoreError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = redis::cmd("GET")
            .arg(ban_key(ip))
            .query_async(&mut conn)
            .await?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn remove_ban(&self, ip: IpAddr) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let removed: i64 = redis::cmd("DEL")
            .arg(ban_key(ip))
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn list_bans(&self) -> Result<Vec<BanRecord>, StoreError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}:*", BAN_PREFIX);
        let mut records = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let values: Vec<Option<String>> = redis::cmd("MGET")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await?;

                // Keys can expire between SCAN and MGET
                for (key, value) in keys.iter().zip(values) {
                    let Some(json) = value else { continue };
                    match serde_json::from_str::<BanRecord>(&json) {
                        Ok(record) => records.push(record),
                        Err(e) => warn!(key = %key, error = %e, "Skipping malformed ban record"),
                    }
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(unique_oldest_first(records))
    }
}

/// SCAN may return a key more than once; keep one record per IP
fn unique_oldest_first(mut records: Vec<BanRecord>) -> Vec<BanRecord> {
    let mut seen = HashSet::new();
    records.retain(|record| seen.insert(record.ip));
    records.sort_by_key(|record| record.banned_at);
    records
}
