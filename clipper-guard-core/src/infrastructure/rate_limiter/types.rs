//! Rate limiter types and core data structures

use serde::{Deserialize, Serialize};

use crate::domain::{Policy, Subject, Tier};
use crate::infrastructure::quota_store::RATE_LIMIT_PREFIX;

/// Utilisation at which clients start getting warned
pub const WARNING_THRESHOLD: f64 = 0.80;
/// Utilisation at which the warning escalates
pub const CRITICAL_THRESHOLD: f64 = 0.95;

/// Key used to identify a quota bucket: one per policy and subject
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuotaKey {
    pub policy: String,
    pub subject: Subject,
}

impl QuotaKey {
    pub fn new(policy: impl Into<String>, subject: Subject) -> Self {
        Self {
            policy: policy.into(),
            subject,
        }
    }

    /// Convert to a store key, e.g. `ratelimit:feed:user:42`
    pub fn to_store_key(&self) -> String {
        format!(
            "{}:{}:{}",
            RATE_LIMIT_PREFIX,
            self.policy,
            self.subject.key_fragment()
        )
    }
}

/// Which counter answered a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterSource {
    /// Shared store
    Primary,
    /// In-process fallback counter
    Fallback,
    /// No counter consulted (admin tier or limiting disabled)
    Bypass,
}

impl CounterSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterSource::Primary => "primary",
            CounterSource::Fallback => "fallback",
            CounterSource::Bypass => "bypass",
        }
    }
}

/// Early warning for clients close to their limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UsageWarning {
    /// At least 80% of the window's quota used
    ApproachingLimit,
    /// At least 95% used
    Critical,
}

impl UsageWarning {
    /// Warning level for `count` requests against `limit`
    pub fn for_usage(count: u64, limit: u32) -> Option<Self> {
        if limit == 0 {
            return None;
        }
        let utilisation = count as f64 / f64::from(limit);
        if utilisation >= CRITICAL_THRESHOLD {
            Some(UsageWarning::Critical)
        } else if utilisation >= WARNING_THRESHOLD {
            Some(UsageWarning::ApproachingLimit)
        } else {
            None
        }
    }

    /// Header value
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageWarning::ApproachingLimit => "approaching-limit",
            UsageWarning::Critical => "critical",
        }
    }
}

/// Why a request was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Quota for the window is used up
    LimitExceeded,
    /// The route names a policy that is not configured
    UnknownPolicy,
}

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Effective limit for the window, `u32::MAX` when bypassed
    pub limit: u32,
    /// Remaining requests in the current window
    pub remaining: u32,
    /// Unix timestamp (seconds) when the window resets
    pub reset_at: u64,
    /// Retry-After in seconds (only set when blocked)
    pub retry_after: Option<u64>,
    /// The tier that was applied
    pub tier: Tier,
    /// The policy that was applied
    pub policy: String,
    /// Which counter answered
    pub source: CounterSource,
    pub warning: Option<UsageWarning>,
    /// Only set when blocked
    pub denial: Option<DenyReason>,
}

impl RateLimitResult {
    /// Create a new allowed result
    pub fn allowed(
        policy: &Policy,
        tier: Tier,
        limit: u32,
        count: u64,
        reset_at: u64,
        source: CounterSource,
    ) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(u32::try_from(count).unwrap_or(u32::MAX)),
            reset_at,
            retry_after: None,
            tier,
            policy: policy.name.clone(),
            source,
            warning: UsageWarning::for_usage(count, limit),
            denial: None,
        }
    }

    /// Create a new blocked result
    pub fn blocked(
        policy: &Policy,
        tier: Tier,
        limit: u32,
        reset_at: u64,
        retry_after: u64,
        source: CounterSource,
    ) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_at,
            retry_after: Some(retry_after.max(1)),
            tier,
            policy: policy.name.clone(),
            source,
            warning: Some(UsageWarning::Critical),
            denial: Some(DenyReason::LimitExceeded),
        }
    }

    /// Admitted without touching any counter
    pub fn bypass(policy: &Policy, tier: Tier) -> Self {
        Self {
            allowed: true,
            limit: u32::MAX,
            remaining: u32::MAX,
            reset_at: 0,
            retry_after: None,
            tier,
            policy: policy.name.clone(),
            source: CounterSource::Bypass,
            warning: None,
            denial: None,
        }
    }

    /// Fail closed on a policy name that is not configured
    pub fn unknown_policy(policy: &str, tier: Tier) -> Self {
        Self {
            allowed: false,
            limit: 0,
            remaining: 0,
            reset_at: 0,
            retry_after: None,
            tier,
            policy: policy.to_string(),
            source: CounterSource::Bypass,
            warning: None,
            denial: Some(DenyReason::UnknownPolicy),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == CounterSource::Fallback
    }

    pub fn is_bypass(&self) -> bool {
        self.source == CounterSource::Bypass && self.allowed
    }
}
