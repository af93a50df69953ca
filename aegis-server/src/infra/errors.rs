use aegis_core::{AuthError, api_types::ApiResponse};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

pub type AppResult<T> = Result<T, AppError>;

const INTERNAL_MESSAGE: &str = "internal server error";

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        if err.is_internal() {
            tracing::error!(error = %err, "request failed");
            return Self::internal(INTERNAL_MESSAGE);
        }
        match err {
            AuthError::Authentication(msg) => Self::unauthorized(msg),
            AuthError::Permission(msg) => Self::forbidden(msg),
            AuthError::Validation(msg) => Self::unprocessable(msg),
            AuthError::NotFound(msg)
            | AuthError::Conflict(msg)
            | AuthError::Expired(msg) => Self::bad_request(msg),
            AuthError::Infrastructure(_) | AuthError::Config(_) => {
                Self::internal(INTERNAL_MESSAGE)
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = ?err, "request failed");
        Self::internal(INTERNAL_MESSAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_onto_status_codes() {
        let cases = [
            (AuthError::authentication("x"), StatusCode::UNAUTHORIZED),
            (AuthError::permission("x"), StatusCode::FORBIDDEN),
            (AuthError::validation("x"), StatusCode::UNPROCESSABLE_ENTITY),
            (AuthError::not_found("x"), StatusCode::BAD_REQUEST),
            (AuthError::conflict("x"), StatusCode::BAD_REQUEST),
            (AuthError::expired("x"), StatusCode::BAD_REQUEST),
            (AuthError::infrastructure("x"), StatusCode::INTERNAL_SERVER_ERROR),
            (AuthError::Config("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = AppError::from(AuthError::infrastructure(
            "connection refused to 10.0.0.5:5432",
        ));
        assert_eq!(err.message, INTERNAL_MESSAGE);
    }

    #[test]
    fn client_errors_keep_their_message() {
        let err = AppError::from(AuthError::conflict("user email already exists"));
        assert_eq!(err.message, "user email already exists");
    }
}
