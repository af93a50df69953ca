//! Wire types shared by the transport layer and its clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::users::auth::LoginOutcome;
use crate::domain::users::rbac::RolePermissions;
use crate::domain::users::user::{RoleSummary, UserProfile};

/// Response envelope: `{"status": "success"|"error", "message": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

impl ApiResponse<()> {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data: None,
        }
    }
}

/// Body returned by login and refresh. The refresh token travels in a
/// cookie, never in the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthTokenResponse {
    pub user: UserProfile,
    /// `Bearer <jwt>`, ready for the `Authorization` header.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<&LoginOutcome> for AuthTokenResponse {
    fn from(outcome: &LoginOutcome) -> Self {
        Self {
            user: outcome.user.clone(),
            token: format!("Bearer {}", outcome.tokens.access_token),
            expires_at: outcome.tokens.access_expires_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsResponse {
    pub role: RoleSummary,
    pub permissions: Vec<String>,
}

impl From<&RolePermissions> for PermissionsResponse {
    fn from(granted: &RolePermissions) -> Self {
        Self {
            role: RoleSummary::from(&granted.role),
            permissions: granted.permission_keys(),
        }
    }
}
