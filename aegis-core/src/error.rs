use thiserror::Error;

use crate::domain::users::auth::crypto::AuthCryptoError;
use crate::notify::NotifyError;

/// Failure taxonomy shared by every account, token and access-control
/// operation. The transport layer maps each variant onto a status code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Expired(String),

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Permission(String),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Discriminant of [`AuthError`] without the attached message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Expired,
    Authentication,
    Permission,
    Infrastructure,
    Config,
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Validation(_) => ErrorKind::Validation,
            AuthError::NotFound(_) => ErrorKind::NotFound,
            AuthError::Conflict(_) => ErrorKind::Conflict,
            AuthError::Expired(_) => ErrorKind::Expired,
            AuthError::Authentication(_) => ErrorKind::Authentication,
            AuthError::Permission(_) => ErrorKind::Permission,
            AuthError::Infrastructure(_) => ErrorKind::Infrastructure,
            AuthError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AuthError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AuthError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AuthError::Conflict(message.into())
    }

    pub fn expired(message: impl Into<String>) -> Self {
        AuthError::Expired(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        AuthError::Authentication(message.into())
    }

    pub fn permission(message: impl Into<String>) -> Self {
        AuthError::Permission(message.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        AuthError::Infrastructure(message.into())
    }

    /// True for failures caused by the environment rather than the caller.
    pub fn is_internal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Infrastructure | ErrorKind::Config
        )
    }
}

impl From<AuthCryptoError> for AuthError {
    fn from(err: AuthCryptoError) -> Self {
        match err {
            AuthCryptoError::EmptyPasswordPepper
            | AuthCryptoError::EmptyTokenKey
            | AuthCryptoError::InvalidArgon2Params(_) => {
                AuthError::Config(err.to_string())
            }
            AuthCryptoError::PasswordHash(_)
            | AuthCryptoError::RandomSource(_) => {
                AuthError::Infrastructure(err.to_string())
            }
        }
    }
}

impl From<NotifyError> for AuthError {
    fn from(err: NotifyError) -> Self {
        AuthError::Infrastructure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
