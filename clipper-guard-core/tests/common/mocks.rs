//! Controllable store for failure and latency scenarios

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use clipper_guard_core::domain::BanRecord;
use clipper_guard_core::infrastructure::quota_store::{
    BanStore, CounterSnapshot, InMemoryQuotaStore, QuotaStore, StoreError,
};
use clipper_guard_core::infrastructure::Clock;

/// In-memory store that can be switched off or slowed down mid-test
pub struct MockQuotaStore {
    inner: InMemoryQuotaStore,
    down: AtomicBool,
    delay_ms: AtomicU64,
    calls: AtomicU64,
}

impl MockQuotaStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: InMemoryQuotaStore::new(clock),
            down: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            calls: AtomicU64::new(0),
        }
    }

    /// Make every call fail with `Unavailable`
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Delay every call, to exercise the store timeout
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of calls that reached the store
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl QuotaStore for MockQuotaStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<CounterSnapshot, StoreError> {
        self.enter().await?;
        self.inner.increment(key, window).await
    }

    async fn get(&self, key: &str) -> Result<Option<CounterSnapshot>, StoreError> {
        self.enter().await?;
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.enter().await?;
        self.inner.delete(key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.enter().await
    }

    async fn cleanup(&self) {
        self.inner.cleanup().await
    }
}

#[async_trait]
impl BanStore for MockQuotaStore {
    async fn insert_ban(&self, record: &BanRecord, ttl: Duration) -> Result<bool, StoreError> {
        self.enter().await?;
        self.inner.insert_ban(record, ttl).await
    }

    async fn get_ban(&self, ip: IpAddr) -> Result<Option<BanRecord>, StoreError> {
        self.enter().await?;
        self.inner.get_ban(ip).await
    }

    async fn remove_ban(&self, ip: IpAddr) -> Result<bool, StoreError> {
        self.enter().await?;
        self.inner.remove_ban(ip).await
    }

    async fn list_bans(&self) -> Result<Vec<BanRecord>, StoreError> {
        self.enter().await?;
        self.inner.list_bans().await
    }
}
