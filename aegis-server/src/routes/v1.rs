use aegis_core::domain::users::rbac::{permissions, roles};
use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::{
    AppState,
    users::auth::{self, handlers},
};

const ADMIN_ROLES: &[&str] = &[roles::OWNER, roles::ADMIN];

pub fn create_v1_router(state: AppState) -> Router<AppState> {
    Router::new()
        // Public account endpoints
        .route("/auth/register", post(handlers::register))
        .route(
            "/auth/verify-account",
            get(handlers::verify_account).post(handlers::verify_account),
        )
        .route("/auth/resend-verify", post(handlers::resend_verify))
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh-token", post(handlers::refresh_token))
        .route("/auth/forgot-password", post(handlers::forgot_password))
        .route("/auth/reset-password", post(handlers::reset_password))
        .merge(create_protected_routes(state.clone()))
        .merge(create_permission_routes(state.clone()))
        .merge(create_admin_routes(state))
}

/// Routes that only need a valid access token.
fn create_protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(handlers::me))
        .route("/auth/logout", post(handlers::logout))
        .layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

fn create_permission_routes(state: AppState) -> Router<AppState> {
    let own_permissions = Router::new()
        .route("/users/permissions", get(handlers::my_permissions))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_permission(permissions::PROFILE_READ),
        ));

    let roles = Router::new()
        .route("/roles", get(handlers::list_roles))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_permission(permissions::ROLE_READ),
        ));

    own_permissions
        .merge(roles)
        .layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

fn create_admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/ping", get(handlers::admin_ping))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_role(ADMIN_ROLES),
        ))
        .layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}
