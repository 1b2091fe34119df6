//! Application setup and wiring

use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;

use clipper_guard_api::{AppState, create_router};
use clipper_guard_core::Config;
use clipper_guard_core::application::{GuardInitError, RequestGuard};

/// Handle returned from create_app for graceful shutdown coordination
pub struct AppHandle {
    pub router: Router,
    pub guard: Arc<RequestGuard>,
    pub shutdown_token: CancellationToken,
}

/// Build the guard, start its background tasks and create the router.
///
/// An unreachable store does not fail startup: the guard starts on the
/// fallback counter and the recovery probe switches back once it answers.
pub async fn create_app(config: &Config) -> Result<AppHandle, GuardInitError> {
    let guard = Arc::new(RequestGuard::from_config(config).await?);

    let shutdown_token = CancellationToken::new();
    guard.spawn_background_tasks(&config.store, shutdown_token.clone());

    tracing::info!(
        policies = guard.limiter().policies().len(),
        rate_limit_enabled = guard.limiter().is_enabled(),
        abuse_detection_enabled = guard.detector().is_enabled(),
        store = guard.circuit_state().as_str(),
        "Clipper Guard initialised"
    );

    let router = create_router(AppState::new(guard.clone()), config);

    Ok(AppHandle {
        router,
        guard,
        shutdown_token,
    })
}
