//! Rate Limiting Infrastructure
//!
//! Fixed-window counters per policy and subject:
//! - One counter per `ratelimit:{policy}:{subject}` key, expiring with its window
//! - Limits scaled by subscription tier, admins bypass
//! - Redis for distributed limiting, in-process fallback while Redis is down

pub mod service;
pub mod types;

pub use service::RateLimiterService;
pub use types::{CounterSource, DenyReason, QuotaKey, RateLimitResult, UsageWarning};
