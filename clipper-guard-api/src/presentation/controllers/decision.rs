//! Decision endpoint for services that cannot embed the middleware

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::net::IpAddr;

use clipper_guard_core::application::{GuardDecision, GuardRequest};
use clipper_guard_core::domain::Tier;

use crate::presentation::models::{ErrorResponse, GuardCheckRequest, GuardCheckResponse};
use crate::presentation::routes::AppState;

fn bad_request(code: &str, message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(code, message, None)),
    )
        .into_response()
}

/// Run the guard pipeline for one request and return the verdict
///
/// The answer is always 200 when the input is valid; `status_code` tells the
/// caller what to send to its client.
#[utoipa::path(
    post,
    path = "/api/v1/guard/check",
    tag = "guard",
    request_body = GuardCheckRequest,
    responses(
        (status = 200, description = "Guard verdict", body = GuardCheckResponse),
        (status = 400, description = "Invalid IP or tier", body = ErrorResponse)
    )
)]
pub async fn check_request(
    State(state): State<AppState>,
    Json(request): Json<GuardCheckRequest>,
) -> Result<Json<GuardCheckResponse>, Response> {
    let ip: IpAddr = request
        .ip
        .trim()
        .parse::<IpAddr>()
        .map(|ip| ip.to_canonical())
        .map_err(|_| bad_request("INVALID_IP", format!("Invalid IP address: {}", request.ip)))?;

    let user_id = request
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let claimed = request
        .tier
        .as_deref()
        .map(str::parse::<Tier>)
        .transpose()
        .map_err(|e| bad_request("INVALID_TIER", e.to_string()))?;

    // Anonymous callers cannot claim a tier
    let tier = match (&user_id, claimed) {
        (None, _) => Tier::Unauthenticated,
        (Some(_), Some(tier)) => tier,
        (Some(_), None) => Tier::Basic,
    };

    let guard_request = GuardRequest {
        ip,
        user_id,
        tier,
        policy: request.policy,
        track_abuse: request.track_abuse,
    };

    let response = match state.guard.evaluate(&guard_request).await {
        GuardDecision::Whitelisted => GuardCheckResponse::whitelisted(&guard_request.policy),
        GuardDecision::Banned(ban) => GuardCheckResponse::banned(&guard_request.policy, &ban),
        GuardDecision::Checked(result) => GuardCheckResponse::checked(&result),
    };

    Ok(Json(response))
}
