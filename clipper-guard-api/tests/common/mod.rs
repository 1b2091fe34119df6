//! Shared helpers for clipper-guard-api integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, extract::Request, response::Response};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clipper_guard_core::Config;
use clipper_guard_core::application::RequestGuard;
use clipper_guard_core::config::{PolicyConfig, StoreBackend};
use clipper_guard_core::domain::BanRecord;
use clipper_guard_core::infrastructure::quota_store::{
    BanStore, CounterSnapshot, InMemoryQuotaStore, QuotaStore, StoreError,
};
use clipper_guard_core::infrastructure::{GuardStore, ManualClock};

pub const START: u64 = 1_700_000_000_000;

/// In-memory store that can be switched off mid-test
pub struct SwitchableStore {
    inner: InMemoryQuotaStore,
    down: AtomicBool,
}

impl SwitchableStore {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            inner: InMemoryQuotaStore::new(clock),
            down: AtomicBool::new(false),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl QuotaStore for SwitchableStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<CounterSnapshot, StoreError> {
        self.check()?;
        self.inner.increment(key, window).await
    }

    async fn get(&self, key: &str) -> Result<Option<CounterSnapshot>, StoreError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    async fn cleanup(&self) {
        self.inner.cleanup().await
    }
}

#[async_trait]
impl BanStore for SwitchableStore {
    async fn insert_ban(&self, record: &BanRecord, ttl: Duration) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.insert_ban(record, ttl).await
    }

    async fn get_ban(&self, ip: IpAddr) -> Result<Option<BanRecord>, StoreError> {
        self.check()?;
        self.inner.get_ban(ip).await
    }

    async fn remove_ban(&self, ip: IpAddr) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.remove_ban(ip).await
    }

    async fn list_bans(&self) -> Result<Vec<BanRecord>, StoreError> {
        self.check()?;
        self.inner.list_bans().await
    }
}

/// Memory-backed config with small test policies
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.store.backend = StoreBackend::Memory;
    config.store.timeout_ms = 50;
    config.server.trust_forwarded_headers = true;
    config
        .rate_limit
        .policies
        .insert("tiny".to_string(), PolicyConfig::new(3, 60));
    config
        .rate_limit
        .policies
        .insert("roomy".to_string(), PolicyConfig::new(100, 60));
    config
        .rate_limit
        .policies
        .insert("ten".to_string(), PolicyConfig::new(10, 60));
    config
}

pub struct TestGuard {
    pub guard: Arc<RequestGuard>,
    pub store: Arc<SwitchableStore>,
    pub clock: Arc<ManualClock>,
}

pub fn test_guard(config: &Config) -> TestGuard {
    let clock = Arc::new(ManualClock::new(START));
    let store = Arc::new(SwitchableStore::new(clock.clone()));
    let dyn_store: Arc<dyn GuardStore> = store.clone();
    let guard = Arc::new(
        RequestGuard::with_store(config, dyn_store, clock.clone()).expect("valid test config"),
    );
    TestGuard {
        guard,
        store,
        clock,
    }
}

/// Request from `ip` with optional trusted identity headers
pub fn request_from(method: &str, uri: &str, ip: &str, user: Option<(&str, &str)>) -> Request {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", ip);
    if let Some((user_id, tier)) = user {
        builder = builder
            .header("x-user-id", user_id)
            .header("x-user-tier", tier);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
