//! Guard counters
//!
//! Lock-free counters shared by the limiter, detector and admin surface.
//! Every increment is paired with a `tracing` event at the call site.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct GuardMetrics {
    admitted: AtomicU64,
    denied: AtomicU64,
    banned_rejections: AtomicU64,
    bans_created: AtomicU64,
    fallback_activations: AtomicU64,
    fallback_recoveries: AtomicU64,
    whitelist_bypasses: AtomicU64,
    admin_bypasses: AtomicU64,
    store_errors: AtomicU64,
    config_errors: AtomicU64,
}

/// Point-in-time copy of [`GuardMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub admitted: u64,
    pub denied: u64,
    pub banned_rejections: u64,
    pub bans_created: u64,
    pub fallback_activations: u64,
    pub fallback_recoveries: u64,
    pub whitelist_bypasses: u64,
    pub admin_bypasses: u64,
    pub store_errors: u64,
    pub config_errors: u64,
}

impl GuardMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_denied(&self) {
        self.denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_banned_rejection(&self) {
        self.banned_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ban_created(&self) {
        self.bans_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_activation(&self) {
        self.fallback_activations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_recovery(&self) {
        self.fallback_recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_whitelist_bypass(&self) {
        self.whitelist_bypasses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admin_bypass(&self) {
        self.admin_bypasses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_config_error(&self) {
        self.config_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            banned_rejections: self.banned_rejections.load(Ordering::Relaxed),
            bans_created: self.bans_created.load(Ordering::Relaxed),
            fallback_activations: self.fallback_activations.load(Ordering::Relaxed),
            fallback_recoveries: self.fallback_recoveries.load(Ordering::Relaxed),
            whitelist_bypasses: self.whitelist_bypasses.load(Ordering::Relaxed),
            admin_bypasses: self.admin_bypasses.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            config_errors: self.config_errors.load(Ordering::Relaxed),
        }
    }
}
