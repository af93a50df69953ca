use aegis_core::domain::users::auth::{CallerIdentity, Decision};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::future::Future;
use std::pin::Pin;

use crate::infra::{app_state::AppState, errors::AppError};

type GateFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Middleware that admits callers whose role grants `(module, action)`.
/// Must sit inside `auth_middleware`, which sets the caller extension.
pub fn require_permission(
    permission: (&'static str, &'static str),
) -> impl Fn(State<AppState>, Request, Next) -> GateFuture + Clone + Send + Sync + 'static
{
    move |State(state): State<AppState>, request: Request, next: Next| {
        Box::pin(check_permission(state, request, next, permission))
    }
}

/// Middleware that admits callers holding any of `role_codes`.
pub fn require_role(
    role_codes: &'static [&'static str],
) -> impl Fn(State<AppState>, Request, Next) -> GateFuture + Clone + Send + Sync + 'static
{
    move |State(state): State<AppState>, request: Request, next: Next| {
        Box::pin(check_role(state, request, next, role_codes))
    }
}

async fn check_permission(
    state: AppState,
    request: Request,
    next: Next,
    (module, action): (&'static str, &'static str),
) -> Response {
    let caller = request.extensions().get::<CallerIdentity>().cloned();
    let decision = state
        .permissions()
        .require_permission(caller.as_ref(), module, action)
        .await;
    admit(decision, request, next).await
}

async fn check_role(
    state: AppState,
    request: Request,
    next: Next,
    role_codes: &'static [&'static str],
) -> Response {
    let caller = request.extensions().get::<CallerIdentity>().cloned();
    let decision = state
        .permissions()
        .require_role(caller.as_ref(), role_codes)
        .await;
    admit(decision, request, next).await
}

async fn admit(decision: Decision, request: Request, next: Next) -> Response {
    match decision.into_result() {
        Ok(()) => next.run(request).await,
        Err(err) => AppError::from(err).into_response(),
    }
}
