//! Shared helpers for clipper-guard-core integration tests

#![allow(dead_code)]

pub mod mocks;

use std::sync::Arc;

use clipper_guard_core::Config;
use clipper_guard_core::application::{AdminService, RequestGuard};
use clipper_guard_core::config::{PolicyConfig, StoreBackend};
use clipper_guard_core::infrastructure::{GuardStore, ManualClock};

pub use mocks::MockQuotaStore;

/// Fixed start time so expiries are predictable
pub const START: u64 = 1_700_000_000_000;

/// Default configuration on the in-memory backend with one extra policy
pub fn config_with_policy(name: &str, limit: u32, window_seconds: u64) -> Config {
    let mut config = Config::default();
    config.store.backend = StoreBackend::Memory;
    config.store.timeout_ms = 50;
    config
        .rate_limit
        .policies
        .insert(name.to_string(), PolicyConfig::new(limit, window_seconds));
    config
}

pub struct Harness {
    pub guard: Arc<RequestGuard>,
    pub admin: AdminService,
    pub store: Arc<MockQuotaStore>,
    pub clock: Arc<ManualClock>,
}

/// Guard wired to a controllable store and a manual clock
pub fn harness(config: &Config) -> Harness {
    let clock = Arc::new(ManualClock::new(START));
    let store = Arc::new(MockQuotaStore::new(clock.clone()));
    let dyn_store: Arc<dyn GuardStore> = store.clone();
    let guard = Arc::new(
        RequestGuard::with_store(config, dyn_store, clock.clone()).expect("valid test config"),
    );
    let admin = AdminService::new(guard.detector().clone());

    Harness {
        guard,
        admin,
        store,
        clock,
    }
}
