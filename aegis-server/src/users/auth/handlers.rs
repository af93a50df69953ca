use aegis_core::{
    api_types::{ApiResponse, AuthTokenResponse, PermissionsResponse},
    domain::users::{
        auth::{CallerIdentity, LoginOutcome},
        rbac::Role,
        user::{
            EmailRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
            UserProfile,
        },
    },
};
use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{info, warn};

use super::cookies::{clear_refresh_cookie, read_refresh_cookie, refresh_cookie};
use crate::infra::{
    app_state::AppState,
    client_ip::ClientIp,
    errors::{AppError, AppResult},
    extract::{ApiJson, ApiQuery},
};

/// `?verify_token=...` on the links sent by email. A missing value is left
/// for the account service to reject with a validation error.
#[derive(Debug, Default, Deserialize)]
pub struct LinkTokenQuery {
    #[serde(default)]
    pub verify_token: String,
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<UserProfile>>)> {
    let registration = state.lifecycle().register(request).await?;
    info!(user_id = %registration.user.id, "account registered");

    // Delivery runs on the notification worker; its outcome is only logged.
    drop(registration.notification);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "registration successful, check your email to verify the account",
            registration.user,
        )),
    ))
}

pub async fn verify_account(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LinkTokenQuery>,
) -> AppResult<Json<ApiResponse<UserProfile>>> {
    let profile = state.lifecycle().verify_account(&query.verify_token).await?;
    Ok(Json(ApiResponse::success("account verified", profile)))
}

pub async fn resend_verify(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<EmailRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let _receipt = state.lifecycle().resend_verification(request).await?;
    Ok(Json(ApiResponse::ok("verification email sent")))
}

pub async fn login(
    State(state): State<AppState>,
    client_ip: ClientIp,
    ApiJson(request): ApiJson<LoginRequest>,
) -> AppResult<Response> {
    let outcome = state
        .lifecycle()
        .login(request, client_ip.as_str())
        .await?;
    token_response(&state, "login successful", &outcome)
}

pub async fn refresh_token(
    State(state): State<AppState>,
    client_ip: ClientIp,
    headers: HeaderMap,
) -> AppResult<Response> {
    let Some(presented) = read_refresh_cookie(&headers) else {
        return Err(AppError::unauthorized("refresh token cookie is required"));
    };

    let outcome = state
        .lifecycle()
        .refresh_token(&presented, client_ip.as_str())
        .await?;
    token_response(&state, "token refreshed", &outcome)
}

pub async fn me(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
) -> AppResult<Json<ApiResponse<UserProfile>>> {
    let profile = state.lifecycle().current_user(Some(&caller)).await?;
    Ok(Json(ApiResponse::success("current user", profile)))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
) -> AppResult<Response> {
    state.lifecycle().logout(Some(&caller)).await?;
    let cookie = clear_refresh_cookie(&state.config().cookies)?;

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(ApiResponse::ok("logout successful")),
    )
        .into_response())
}

pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<EmailRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.lifecycle().forgot_password(request).await?;
    Ok(Json(ApiResponse::ok("password reset email sent")))
}

pub async fn reset_password(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LinkTokenQuery>,
    ApiJson(request): ApiJson<ResetPasswordRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    state
        .lifecycle()
        .reset_password(&query.verify_token, request)
        .await?;
    Ok(Json(ApiResponse::ok("password has been reset")))
}

/// Effective role and permission keys of the caller.
pub async fn my_permissions(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
) -> AppResult<Json<ApiResponse<PermissionsResponse>>> {
    let granted = state
        .permissions()
        .permissions_for(caller.user_id)
        .await?
        .ok_or_else(|| AppError::unauthorized("user not found"))?;

    Ok(Json(ApiResponse::success(
        "permissions loaded",
        PermissionsResponse::from(&granted),
    )))
}

pub async fn list_roles(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<Role>>>> {
    let roles = state.lifecycle().list_roles().await?;
    Ok(Json(ApiResponse::success("roles loaded", roles)))
}

pub async fn admin_ping(
    Extension(caller): Extension<CallerIdentity>,
) -> Json<ApiResponse<CallerIdentity>> {
    Json(ApiResponse::success("pong", caller))
}

fn token_response(
    state: &AppState,
    message: &str,
    outcome: &LoginOutcome,
) -> AppResult<Response> {
    let config = state.config();
    let cookie = refresh_cookie(
        &outcome.tokens.refresh_token,
        config.auth.refresh_token_ttl,
        &config.cookies,
    )
    .inspect_err(|err| warn!(error = %err, "could not build refresh cookie"))?;

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(ApiResponse::success(message, AuthTokenResponse::from(outcome))),
    )
        .into_response())
}
