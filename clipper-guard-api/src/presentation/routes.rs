//! API routes

use axum::{
    Router,
    http::StatusCode,
    middleware,
    response::Json,
    routing::{delete, get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::OpenApi;

use clipper_guard_core::Config;
use clipper_guard_core::application::{AdminService, RequestGuard};

use crate::presentation::controllers::{
    abuse_stats, check_request, health_check, list_bans, liveness, metrics, readiness, unban_ip,
};
use crate::presentation::middleware::{AdminAuthState, admin_auth_middleware};
use crate::presentation::models::*;

/// State shared by the service's own handlers
#[derive(Clone)]
pub struct AppState {
    pub guard: Arc<RequestGuard>,
    pub admin: Arc<AdminService>,
}

impl AppState {
    pub fn new(guard: Arc<RequestGuard>) -> Self {
        let admin = Arc::new(AdminService::new(guard.detector().clone()));
        Self { guard, admin }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::presentation::controllers::health::health_check,
        crate::presentation::controllers::health::liveness,
        crate::presentation::controllers::health::readiness,
        crate::presentation::controllers::health::metrics,
        crate::presentation::controllers::decision::check_request,
        crate::presentation::controllers::admin::list_bans,
        crate::presentation::controllers::admin::unban_ip,
        crate::presentation::controllers::admin::abuse_stats,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            MetricsResponse,
            GuardCheckRequest,
            GuardCheckResponse,
            Verdict,
            BanRecordDto,
            BanListResponse,
            UnbanResponse,
            AbuseStatsResponse,
        )
    ),
    tags(
        (name = "health", description = "Health, readiness and guard counters"),
        (name = "guard", description = "Rate limit and abuse decisions for non-embedded callers"),
        (name = "admin", description = "Ban management; requires the x-admin-token header")
    ),
    info(
        title = "Clipper Guard API",
        version = "0.3.0",
        description = "Rate limiting and abuse detection for the Clipper platform"
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Create the service router
///
/// Admin routes are mounted only when `admin.api_token` is set.
pub fn create_router(state: AppState, config: &Config) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .route("/metrics", get(metrics));

    let guard_routes = Router::new().route("/guard/check", post(check_request));

    let mut router = Router::new()
        .merge(health_routes)
        .nest("/api/v1", guard_routes)
        .route("/api-docs/openapi.json", get(openapi_json));

    match config
        .admin
        .api_token
        .as_deref()
        .filter(|token| !token.is_empty())
    {
        Some(token) => {
            let auth = Arc::new(AdminAuthState::new(token));
            let admin_routes = Router::new()
                .route("/abuse/bans", get(list_bans))
                .route("/abuse/bans/{ip}", delete(unban_ip))
                .route("/abuse/stats/{ip}", get(abuse_stats))
                .layer(middleware::from_fn_with_state(auth, admin_auth_middleware));
            router = router.nest("/admin", admin_routes);
        }
        None => {
            tracing::warn!("admin.api_token is not set, admin routes are disabled");
        }
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    Duration::from_secs(config.server.request_timeout_seconds),
                )),
        )
        .with_state(state)
}
