//! Admin control surface over HTTP

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use clipper_guard_core::application::AdminError;

use crate::presentation::models::{
    AbuseStatsResponse, BanListResponse, BanRecordDto, ErrorResponse, UnbanResponse,
};
use crate::presentation::routes::AppState;

/// Convert AdminError to HTTP response
pub fn admin_error_to_response(error: AdminError) -> Response {
    let (status, code, message) = match &error {
        AdminError::InvalidIp(_) => (
            StatusCode::BAD_REQUEST,
            "INVALID_IP",
            "Invalid IP address".to_string(),
        ),
        AdminError::Store(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "STORE_UNAVAILABLE",
            "Quota store unavailable".to_string(),
        ),
    };

    if status.is_server_error() {
        tracing::error!(
            error = %error,
            http_status = %status,
            error_code = code,
            "Admin operation failed"
        );
    } else {
        tracing::warn!(
            error = %error,
            http_status = %status,
            error_code = code,
            "Rejected admin request"
        );
    }

    (
        status,
        Json(ErrorResponse::new(
            code,
            message,
            Some(serde_json::json!({ "error": error.to_string() })),
        )),
    )
        .into_response()
}

/// List all active bans
#[utoipa::path(
    get,
    path = "/admin/abuse/bans",
    tag = "admin",
    params(
        ("x-admin-token" = String, Header, description = "Admin API token")
    ),
    responses(
        (status = 200, description = "Active bans", body = BanListResponse),
        (status = 401, description = "Missing or invalid admin token", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn list_bans(State(state): State<AppState>) -> Result<Json<BanListResponse>, Response> {
    let bans = state
        .admin
        .list_banned_ips()
        .await
        .map_err(admin_error_to_response)?;

    let bans: Vec<BanRecordDto> = bans.iter().map(BanRecordDto::from).collect();
    Ok(Json(BanListResponse {
        total: bans.len(),
        bans,
    }))
}

/// Remove a ban and reset the IP's abuse counter. Idempotent.
#[utoipa::path(
    delete,
    path = "/admin/abuse/bans/{ip}",
    tag = "admin",
    params(
        ("ip" = String, Path, description = "IP address to unban"),
        ("x-admin-token" = String, Header, description = "Admin API token")
    ),
    responses(
        (status = 200, description = "IP is not banned anymore", body = UnbanResponse),
        (status = 400, description = "Invalid IP address", body = ErrorResponse),
        (status = 401, description = "Missing or invalid admin token", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn unban_ip(
    State(state): State<AppState>,
    Path(ip): Path<String>,
) -> Result<Json<UnbanResponse>, Response> {
    let outcome = state
        .admin
        .unban_ip(&ip)
        .await
        .map_err(admin_error_to_response)?;

    Ok(Json(UnbanResponse {
        ip: outcome.ip.to_string(),
        was_banned: outcome.was_banned,
    }))
}

/// Abuse counter, window expiry and active ban for one IP
#[utoipa::path(
    get,
    path = "/admin/abuse/stats/{ip}",
    tag = "admin",
    params(
        ("ip" = String, Path, description = "IP address to inspect"),
        ("x-admin-token" = String, Header, description = "Admin API token")
    ),
    responses(
        (status = 200, description = "Abuse statistics", body = AbuseStatsResponse),
        (status = 400, description = "Invalid IP address", body = ErrorResponse),
        (status = 401, description = "Missing or invalid admin token", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn abuse_stats(
    State(state): State<AppState>,
    Path(ip): Path<String>,
) -> Result<Json<AbuseStatsResponse>, Response> {
    let stats = state
        .admin
        .get_abuse_stats(&ip)
        .await
        .map_err(admin_error_to_response)?;

    Ok(Json(AbuseStatsResponse::from(stats)))
}
