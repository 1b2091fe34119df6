//! API request/response models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use clipper_guard_core::domain::{AbuseStats, BanRecord, Tier};
use clipper_guard_core::infrastructure::metrics::MetricsSnapshot;
use clipper_guard_core::infrastructure::rate_limiter::RateLimitResult;

/// Error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code
    #[schema(example = "RATE_LIMIT_EXCEEDED")]
    pub code: String,

    /// Human-readable error message
    #[schema(example = "Rate limit exceeded. Please retry after 42 seconds.")]
    pub message: String,

    /// Additional error context
    #[schema(example = r#"{"retry_after": 42, "limit": 10, "policy": "submission"}"#)]
    pub details: Option<serde_json::Value>,

    /// Unique request identifier for tracking and support
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub request_id: Uuid,

    /// Error occurrence timestamp
    #[schema(example = "2024-01-15T10:30:00Z")]
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>, details: Option<serde_json::Value>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details,
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` while the shared store serves, `degraded` on fallback
    #[schema(example = "healthy")]
    pub status: String,

    /// Current service version
    #[schema(example = "0.3.0")]
    pub version: String,

    /// Health check timestamp
    #[schema(example = "2024-01-15T10:30:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Dependency status
    #[schema(example = r#"{"store": "primary"}"#)]
    pub details: Option<serde_json::Value>,
}

/// Ban record as returned by the admin API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BanRecordDto {
    #[schema(example = "203.0.113.7")]
    pub ip: String,
    pub banned_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Abuse counter value that triggered the ban
    #[schema(example = 1001)]
    pub request_count: u64,
}

impl From<&BanRecord> for BanRecordDto {
    fn from(record: &BanRecord) -> Self {
        Self {
            ip: record.ip.to_string(),
            banned_at: record.banned_at,
            expires_at: record.expires_at,
            request_count: record.request_count,
        }
    }
}

/// Active bans
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BanListResponse {
    pub bans: Vec<BanRecordDto>,
    pub total: usize,
}

/// Result of an unban
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UnbanResponse {
    #[schema(example = "203.0.113.7")]
    pub ip: String,
    /// False when there was no active ban; the call still succeeds
    pub was_banned: bool,
}

/// An IP's standing with the abuse detector
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AbuseStatsResponse {
    #[schema(example = "203.0.113.7")]
    pub ip: String,
    /// Requests counted in the current detection window
    #[schema(example = 412)]
    pub count: u64,
    #[schema(example = 1000)]
    pub threshold: u64,
    pub window_expires_at: Option<DateTime<Utc>>,
    pub banned: bool,
    pub ban: Option<BanRecordDto>,
}

impl From<AbuseStats> for AbuseStatsResponse {
    fn from(stats: AbuseStats) -> Self {
        Self {
            ip: stats.ip.to_string(),
            count: stats.count,
            threshold: stats.threshold,
            window_expires_at: stats.window_expires_at,
            banned: stats.is_banned(),
            ban: stats.ban.as_ref().map(BanRecordDto::from),
        }
    }
}

fn default_track_abuse() -> bool {
    true
}

/// Decision request from a service that cannot embed the middleware
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GuardCheckRequest {
    /// Client IP as seen by the caller
    #[schema(example = "198.51.100.23")]
    pub ip: String,

    /// Authenticated user id, absent for anonymous traffic
    #[schema(example = "user-42")]
    pub user_id: Option<String>,

    /// Subscription tier: admin, premium, basic, unauthenticated
    #[schema(example = "premium")]
    pub tier: Option<String>,

    /// Policy name from the policy table
    #[schema(example = "submission")]
    pub policy: String,

    /// False for routes exempt from abuse detection
    #[serde(default = "default_track_abuse")]
    pub track_abuse: bool,
}

/// Verdict for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Deny,
    Banned,
    Misconfigured,
}

/// Decision returned by `POST /api/v1/guard/check`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GuardCheckResponse {
    pub verdict: Verdict,
    pub allowed: bool,
    /// HTTP status the caller should answer with
    #[schema(example = 200)]
    pub status_code: u16,
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    /// Unix seconds when the window resets
    pub reset_at: Option<u64>,
    pub retry_after: Option<u64>,
    #[schema(example = "premium")]
    pub tier: Option<String>,
    #[schema(example = "submission")]
    pub policy: String,
    /// primary, fallback or bypass
    pub source: Option<String>,
    /// approaching-limit or critical
    pub warning: Option<String>,
    /// whitelisted or admin
    pub bypass: Option<String>,
    pub ban: Option<BanRecordDto>,
}

impl GuardCheckResponse {
    pub fn whitelisted(policy: &str) -> Self {
        Self {
            verdict: Verdict::Allow,
            allowed: true,
            status_code: 200,
            limit: None,
            remaining: None,
            reset_at: None,
            retry_after: None,
            tier: None,
            policy: policy.to_string(),
            source: None,
            warning: None,
            bypass: Some("whitelisted".to_string()),
            ban: None,
        }
    }

    pub fn banned(policy: &str, ban: &BanRecord) -> Self {
        Self {
            verdict: Verdict::Banned,
            allowed: false,
            status_code: 403,
            ban: Some(BanRecordDto::from(ban)),
            bypass: None,
            ..Self::whitelisted(policy)
        }
    }

    pub fn checked(result: &RateLimitResult) -> Self {
        use clipper_guard_core::infrastructure::rate_limiter::DenyReason;

        let (verdict, status_code) = match result.denial {
            None => (Verdict::Allow, 200),
            Some(DenyReason::LimitExceeded) => (Verdict::Deny, 429),
            Some(DenyReason::UnknownPolicy) => (Verdict::Misconfigured, 503),
        };
        let bypass = (result.is_bypass() && result.tier == Tier::Admin)
            .then(|| "admin".to_string());
        let counted = result.denial != Some(DenyReason::UnknownPolicy) && !result.is_bypass();

        Self {
            verdict,
            allowed: result.allowed,
            status_code,
            limit: counted.then_some(result.limit),
            remaining: counted.then_some(result.remaining),
            reset_at: counted.then_some(result.reset_at),
            retry_after: result.retry_after,
            tier: Some(result.tier.as_str().to_string()),
            policy: result.policy.clone(),
            source: Some(result.source.as_str().to_string()),
            warning: result.warning.map(|w| w.as_str().to_string()),
            bypass,
            ban: None,
        }
    }
}

/// Guard counters plus the current store state
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MetricsResponse {
    /// `primary` or `fallback`
    #[schema(example = "primary")]
    pub store: String,
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

impl MetricsResponse {
    pub fn new(store: &str, snapshot: MetricsSnapshot) -> Self {
        Self {
            store: store.to_string(),
            admitted: snapshot.admitted,
            denied: snapshot.denied,
            banned_rejections: snapshot.banned_rejections,
            bans_created: snapshot.bans_created,
            fallback_activations: snapshot.fallback_activations,
            fallback_recoveries: snapshot.fallback_recoveries,
            whitelist_bypasses: snapshot.whitelist_bypasses,
            admin_bypasses: snapshot.admin_bypasses,
            store_errors: snapshot.store_errors,
            config_errors: snapshot.config_errors,
        }
    }
}
