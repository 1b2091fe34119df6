//! Guard middleware for axum routers
//!
//! Layers run in this order for every guarded route:
//! identity → ban gate → abuse tracking (tracked routes only) → rate limit.
//! Use [`guard_routes`] to install them in the right order.

use axum::{
    Router,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use clipper_guard_core::Config;
use clipper_guard_core::application::RequestGuard;
use clipper_guard_core::domain::{BanRecord, Subject, Tier};
use clipper_guard_core::infrastructure::rate_limiter::{DenyReason, RateLimitResult};

use crate::presentation::models::ErrorResponse;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_RETRY_AFTER: &str = "retry-after";
pub const HEADER_FALLBACK: &str = "x-ratelimit-fallback";
pub const HEADER_BYPASS: &str = "x-ratelimit-bypass";
pub const HEADER_WARNING: &str = "x-ratelimit-warning";

/// Trusted identity headers set by the upstream auth layer
pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_USER_TIER: &str = "x-user-tier";
pub const HEADER_ADMIN_TOKEN: &str = "x-admin-token";

/// Shared state for the guard layers
#[derive(Clone)]
pub struct GuardState {
    pub guard: Arc<RequestGuard>,
    /// Read the client IP from `x-forwarded-for` / `x-real-ip`
    pub trust_forwarded_headers: bool,
}

impl GuardState {
    pub fn new(guard: Arc<RequestGuard>, trust_forwarded_headers: bool) -> Self {
        Self {
            guard,
            trust_forwarded_headers,
        }
    }

    pub fn from_config(guard: Arc<RequestGuard>, config: &Config) -> Self {
        Self::new(guard, config.server.trust_forwarded_headers)
    }
}

impl std::fmt::Debug for GuardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardState")
            .field("store", &self.guard.circuit_state().as_str())
            .field("trust_forwarded_headers", &self.trust_forwarded_headers)
            .finish()
    }
}

/// Rate limit layer state: one per policy
#[derive(Debug, Clone)]
pub struct PolicyState {
    pub shared: Arc<GuardState>,
    pub policy: String,
}

/// Whether a route group counts towards abuse detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbuseTracking {
    Tracked,
    /// Authentication endpoints and the like: ban gate only
    Exempt,
}

/// Client identity resolved once per request, stored in request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub ip: IpAddr,
    pub user_id: Option<String>,
    pub tier: Tier,
    pub whitelisted: bool,
}

impl ClientIdentity {
    pub fn subject(&self) -> Subject {
        Subject::resolve(self.user_id.as_deref(), self.ip)
    }
}

/// Wrap `router` with the full guard stack for `policy`.
///
/// Only routes already registered on `router` are guarded.
pub fn guard_routes<S>(
    router: Router<S>,
    state: &Arc<GuardState>,
    policy: &str,
    tracking: AbuseTracking,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let policy_state = Arc::new(PolicyState {
        shared: state.clone(),
        policy: policy.to_string(),
    });

    // Last layer added runs first
    let router = router.layer(middleware::from_fn_with_state(
        policy_state,
        rate_limit_middleware,
    ));
    let router = match tracking {
        AbuseTracking::Tracked => router.layer(middleware::from_fn_with_state(
            state.clone(),
            abuse_detection_middleware,
        )),
        AbuseTracking::Exempt => router,
    };
    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            ban_gate_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            identity_middleware,
        ))
}

/// Extract the client IP
///
/// Forwarded headers first (when trusted), then the socket address.
/// Only the last `x-forwarded-for` hop is read: it is the one the trusted
/// proxy appended, everything before it is client-supplied.
/// IPv4-mapped IPv6 addresses are folded to IPv4 so both spellings share a bucket.
pub fn extract_ip(request: &Request, trust_forwarded_headers: bool) -> IpAddr {
    let forwarded = if trust_forwarded_headers {
        request
            .headers()
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.rsplit(',').next())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
            .or_else(|| {
                request
                    .headers()
                    .get("x-real-ip")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.trim().parse::<IpAddr>().ok())
            })
    } else {
        None
    };

    forwarded
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
        .to_canonical()
}

/// Tier from the trusted header. Anonymous traffic is always unauthenticated.
fn resolve_tier(user_id: Option<&str>, header: Option<&str>) -> Tier {
    if user_id.is_none() {
        return Tier::Unauthenticated;
    }

    match header {
        None => Tier::Basic,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(tier = raw, "Unrecognised tier header, treating as basic");
            Tier::Basic
        }),
    }
}

fn resolve_identity(state: &GuardState, request: &Request) -> ClientIdentity {
    let ip = extract_ip(request, state.trust_forwarded_headers);
    let user_id = request
        .headers()
        .get(HEADER_USER_ID)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let tier_header = request
        .headers()
        .get(HEADER_USER_TIER)
        .and_then(|h| h.to_str().ok());
    let tier = resolve_tier(user_id.as_deref(), tier_header);

    ClientIdentity {
        ip,
        user_id,
        tier,
        whitelisted: state.guard.bypass(ip),
    }
}

fn identity_of(state: &GuardState, request: &Request) -> ClientIdentity {
    request
        .extensions()
        .get::<ClientIdentity>()
        .cloned()
        .unwrap_or_else(|| resolve_identity(state, request))
}

/// Resolve the client identity and store it in request extensions
pub async fn identity_middleware(
    State(state): State<Arc<GuardState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<ClientIdentity>().is_none() {
        let identity = resolve_identity(&state, &request);
        request.extensions_mut().insert(identity);
    }
    next.run(request).await
}

/// Reject banned IPs before anything is counted
pub async fn ban_gate_middleware(
    State(state): State<Arc<GuardState>>,
    request: Request,
    next: Next,
) -> Response {
    let identity = identity_of(&state, &request);
    if identity.whitelisted {
        return next.run(request).await;
    }

    match state.guard.gate(identity.ip).await {
        Some(ban) => banned_response(&ban),
        None => next.run(request).await,
    }
}

/// Count the request towards the IP's abuse window; the request that
/// crosses the threshold is rejected with the new ban.
pub async fn abuse_detection_middleware(
    State(state): State<Arc<GuardState>>,
    request: Request,
    next: Next,
) -> Response {
    let identity = identity_of(&state, &request);
    if identity.whitelisted {
        return next.run(request).await;
    }

    match state.guard.track(identity.ip).await {
        Some(ban) => banned_response(&ban),
        None => next.run(request).await,
    }
}

/// Per-policy rate limiting
pub async fn rate_limit_middleware(
    State(state): State<Arc<PolicyState>>,
    request: Request,
    next: Next,
) -> Response {
    let identity = identity_of(&state.shared, &request);
    if identity.whitelisted {
        let mut response = next.run(request).await;
        response
            .headers_mut()
            .insert(HEADER_BYPASS, HeaderValue::from_static("whitelisted"));
        return response;
    }

    let result = state
        .shared
        .guard
        .admit(&state.policy, &identity.subject(), identity.tier)
        .await;

    match result.denial {
        None => {
            let mut response = next.run(request).await;
            if result.is_bypass() {
                if identity.tier == Tier::Admin {
                    response
                        .headers_mut()
                        .insert(HEADER_BYPASS, HeaderValue::from_static("admin"));
                }
            } else {
                add_rate_limit_headers(&mut response, &result);
            }
            response
        }
        Some(DenyReason::LimitExceeded) => rate_limited_response(&result),
        Some(DenyReason::UnknownPolicy) => policy_misconfigured_response(&result),
    }
}

/// Add rate limit headers to response
pub fn add_rate_limit_headers(response: &mut Response, result: &RateLimitResult) {
    let headers = response.headers_mut();

    headers.insert(HEADER_LIMIT, HeaderValue::from(result.limit));
    headers.insert(HEADER_REMAINING, HeaderValue::from(result.remaining));
    headers.insert(HEADER_RESET, HeaderValue::from(result.reset_at));

    if let Some(warning) = result.warning {
        headers.insert(HEADER_WARNING, HeaderValue::from_static(warning.as_str()));
    }
    if result.is_fallback() {
        headers.insert(HEADER_FALLBACK, HeaderValue::from_static("true"));
    }
}

fn rate_limited_response(result: &RateLimitResult) -> Response {
    let retry_after = result.retry_after.unwrap_or(1);

    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorResponse::new(
            "RATE_LIMIT_EXCEEDED",
            format!(
                "Rate limit exceeded. Please retry after {} seconds.",
                retry_after
            ),
            Some(serde_json::json!({
                "retry_after": retry_after,
                "limit": result.limit,
                "remaining": result.remaining,
                "policy": result.policy,
                "tier": result.tier.as_str(),
            })),
        )),
    )
        .into_response();

    add_rate_limit_headers(&mut response, result);
    response
        .headers_mut()
        .insert(HEADER_RETRY_AFTER, HeaderValue::from(retry_after));

    response
}

fn policy_misconfigured_response(result: &RateLimitResult) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse::new(
            "POLICY_MISCONFIGURED",
            "Service temporarily unavailable",
            Some(serde_json::json!({ "policy": result.policy })),
        )),
    )
        .into_response()
}

/// 403 without quota headers
pub fn banned_response(ban: &BanRecord) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse::new(
            "IP_BANNED",
            "Access denied: this IP address is temporarily banned for abusive traffic",
            Some(serde_json::json!({
                "banned_at": ban.banned_at,
                "expires_at": ban.expires_at,
            })),
        )),
    )
        .into_response()
}

/// Admin token check state
pub struct AdminAuthState {
    token: String,
}

impl AdminAuthState {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Constant-time comparison against the configured token
    pub fn verify(&self, provided: &str) -> bool {
        self.token.as_bytes().ct_eq(provided.as_bytes()).into()
    }
}

impl std::fmt::Debug for AdminAuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuthState")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Require `x-admin-token` on admin routes
pub async fn admin_auth_middleware(
    State(state): State<Arc<AdminAuthState>>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(HEADER_ADMIN_TOKEN)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|token| state.verify(token));

    if !authorized {
        tracing::warn!(
            path = %request.uri().path(),
            "Rejected admin request with missing or invalid token"
        );
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(
                "UNAUTHORIZED",
                "Missing or invalid admin token",
                None,
            )),
        )
            .into_response();
    }

    next.run(request).await
}
