//! Request gate for bearer access tokens.
//!
//! [`authenticate`] is the whole decision; [`auth_middleware`] only wires it
//! into the router and turns a rejection into a 401 envelope.

use aegis_core::domain::users::auth::{CallerIdentity, TokenIssuer};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::infra::{app_state::AppState, errors::AppError};

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingHeader,
    Malformed,
    InvalidToken,
}

impl Rejection {
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::MissingHeader => "authorization header is required",
            Rejection::Malformed => "authorization header must be a Bearer token",
            Rejection::InvalidToken => "access token is invalid or expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    Authenticated(CallerIdentity),
    Rejected(Rejection),
}

pub fn authenticate(headers: &HeaderMap, issuer: &TokenIssuer) -> GatewayOutcome {
    let Some(raw) = headers.get(header::AUTHORIZATION) else {
        return GatewayOutcome::Rejected(Rejection::MissingHeader);
    };

    let Some(token) = raw
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
    else {
        return GatewayOutcome::Rejected(Rejection::Malformed);
    };

    match issuer.validate_access(token) {
        Ok(claims) => GatewayOutcome::Authenticated(CallerIdentity {
            user_id: claims.user_id,
            role_code: claims.role,
        }),
        Err(err) => {
            debug!(error = %err, "access token rejected");
            GatewayOutcome::Rejected(Rejection::InvalidToken)
        }
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(request.headers(), state.token_issuer()) {
        GatewayOutcome::Authenticated(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        GatewayOutcome::Rejected(reason) => {
            AppError::unauthorized(reason.message()).into_response()
        }
    }
}
