//! In-memory store backend
//!
//! Used as the primary store in development and as the process-local
//! fallback counter while Redis is unreachable.

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::{BanStore, CounterSnapshot, QuotaStore, StoreError};
use crate::domain::BanRecord;
use crate::infrastructure::clock::{Clock, SystemClock};

/// Counter with absolute expiry in unix milliseconds
#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    expires_at: u64,
}

#[derive(Debug, Clone)]
struct BanEntry {
    record: BanRecord,
    expires_at: u64,
}

#[derive(Debug)]
pub struct InMemoryQuotaStore {
    counters: Arc<Mutex<HashMap<String, CounterEntry>>>,
    bans: Arc<RwLock<HashMap<IpAddr, BanEntry>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryQuotaStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: Arc::new(Mutex::new(HashMap::new())),
            bans: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Infallible increment, shared by the trait impl and the fallback path
    pub async fn incr(&self, key: &str, window: Duration) -> CounterSnapshot {
        let now = self.clock.now_millis();
        let window_ms = window.as_millis() as u64;
        let mut counters = self.counters.lock().await;

        let entry = counters.entry(key.to_string()).or_insert(CounterEntry {
            count: 0,
            expires_at: now + window_ms,
        });
        if entry.expires_at <= now {
            *entry = CounterEntry {
                count: 0,
                expires_at: now + window_ms,
            };
        }
        entry.count += 1;

        CounterSnapshot {
            count: entry.count,
            ttl: Duration::from_millis(entry.expires_at - now),
        }
    }

    /// Number of live and expired-but-not-yet-cleaned counters
    pub async fn len(&self) -> usize {
        self.counters.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryQuotaStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<CounterSnapshot, StoreError> {
        Ok(self.incr(key, window).await)
    }

    async fn get(&self, key: &str) -> Result<Option<CounterSnapshot>, StoreError> {
        let now = self.clock.now_millis();
        let counters = self.counters.lock().await;
        if let Some(entry) = counters.get(key)
            && now < entry.expires_at
        {
            return Ok(Some(CounterSnapshot {
                count: entry.count,
                ttl: Duration::from_millis(entry.expires_at - now),
            }));
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.counters.lock().await.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn cleanup(&self) {
        let now = self.clock.now_millis();

        let removed_counters = {
            let mut counters = self.counters.lock().await;
            let before = counters.len();
            counters.retain(|_, entry| entry.expires_at > now);
            before - counters.len()
        };

        let removed_bans = {
            let mut bans = self.bans.write().await;
            let before = bans.len();
            bans.retain(|_, entry| entry.expires_at > now);
            before - bans.len()
        };

        debug!(
            removed_counters,
            removed_bans, "Completed in-memory store cleanup"
        );
    }
}

#[async_trait]
impl BanStore for InMemoryQuotaStore {
    async fn insert_ban(&self, record: &BanRecord, ttl: Duration) -> Result<bool, StoreError> {
        let now = self.clock.now_millis();
        let mut bans = self.bans.write().await;

        if let Some(existing) = bans.get(&record.ip)
            && existing.expires_at > now
        {
            return Ok(false);
        }

        bans.insert(
            record.ip,
            BanEntry {
                record: record.clone(),
                expires_at: now + ttl.as_millis() as u64,
            },
        );
        Ok(true)
    }

    async fn get_ban(&self, ip: IpAddr) -> Result<Option<BanRecord>, StoreError> {
        let now = self.clock.now_millis();
        let bans = self.bans.read().await;
        Ok(bans
            .get(&ip)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.record.clone()))
    }

    async fn remove_ban(&self, ip: IpAddr) -> Result<bool, StoreError> {
        let now = self.clock.now_millis();
        let removed = self.bans.write().await.remove(&ip);
        Ok(removed.is_some_and(|entry| entry.expires_at > now))
    }

    async fn list_bans(&self) -> Result<Vec<BanRecord>, StoreError> {
        let now = self.clock.now_millis();
        let bans = self.bans.read().await;
        let mut records: Vec<BanRecord> = bans
            .values()
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.record.clone())
            .collect();
        records.sort_by_key(|record| record.banned_at);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;

    const START: u64 = 1_700_000_000_000;

    fn store() -> (InMemoryQuotaStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        (InMemoryQuotaStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_increment_within_window() {
        let (store, clock) = store();
        let window = Duration::from_secs(60);

        let first = store.increment("ratelimit:feed:ip:1.2.3.4", window).await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.ttl, window);

        clock.advance(Duration::from_secs(10));
        let second = store.increment("ratelimit:feed:ip:1.2.3.4", window).await.unwrap();
        assert_eq!(second.count, 2);
        assert_eq!(second.ttl, Duration::from_secs(50));
    }

    #[tokio::test]
    async fn test_window_rolls_over() {
        let (store, clock) = store();
        let window = Duration::from_secs(60);

        store.increment("k", window).await.unwrap();
        store.increment("k", window).await.unwrap();
        clock.advance(window);

        assert!(store.get("k").await.unwrap().is_none());
        let fresh = store.increment("k", window).await.unwrap();
        assert_eq!(fresh.count, 1);
    }

    #[tokio::test]
    async fn test_ban_is_create_if_absent() {
        let (store, clock) = store();
        let ip: IpAddr = "198.51.100.4".parse().unwrap();
        let duration = Duration::from_secs(3600);

        let first = BanRecord::new(ip, START, duration, 1001);
        assert!(store.insert_ban(&first, duration).await.unwrap());

        clock.advance(Duration::from_secs(60));
        let second = BanRecord::new(ip, clock.now_millis(), duration, 1002);
        assert!(!store.insert_ban(&second, duration).await.unwrap());

        let stored = store.get_ban(ip).await.unwrap().unwrap();
        assert_eq!(stored.request_count, 1001);
    }

    #[tokio::test]
    async fn test_ban_expires() {
        let (store, clock) = store();
        let ip: IpAddr = "198.51.100.4".parse().unwrap();
        let duration = Duration::from_secs(3600);
        store
            .insert_ban(&BanRecord::new(ip, START, duration, 5), duration)
            .await
            .unwrap();

        clock.advance(duration);
        assert!(store.get_ban(ip).await.unwrap().is_none());
        assert!(store.list_bans().await.unwrap().is_empty());
        assert!(!store.remove_ban(ip).await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_drops_expired_entries() {
        let (store, clock) = store();
        store.increment("short", Duration::from_secs(1)).await.unwrap();
        store.increment("long", Duration::from_secs(600)).await.unwrap();

        clock.advance(Duration::from_secs(2));
        store.cleanup().await;

        assert_eq!(store.len().await, 1);
        assert!(store.get("long").await.unwrap().is_some());
    }
}
