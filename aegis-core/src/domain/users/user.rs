use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::rbac::Role;
use crate::error::{AuthError, Result};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;
pub const MAX_NAME_LENGTH: usize = 120;
pub const MAX_EMAIL_LENGTH: usize = 254;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex")
});

/// What a one-time token may be redeemed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Verification,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Verification => "verification",
            TokenPurpose::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenPurpose {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "verification" => Ok(TokenPurpose::Verification),
            "password_reset" => Ok(TokenPurpose::PasswordReset),
            other => Err(AuthError::infrastructure(format!(
                "unknown token purpose '{other}'"
            ))),
        }
    }
}

/// The single one-time token slot of a user. Only the keyed digest of the
/// token is kept; the token itself leaves the process in a notification.
#[derive(Clone, PartialEq, Eq)]
pub struct OneTimeToken {
    pub token_hash: String,
    pub purpose: TokenPurpose,
    pub expires_at: DateTime<Utc>,
}

impl OneTimeToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

impl fmt::Debug for OneTimeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneTimeToken")
            .field("purpose", &self.purpose)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Stored account record.
#[derive(Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub password_hash: String,
    pub role_id: Uuid,
    pub is_verified: bool,
    pub one_time_token: Option<OneTimeToken>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("role_id", &self.role_id)
            .field("is_verified", &self.is_verified)
            .field("one_time_token", &self.one_time_token)
            .finish_non_exhaustive()
    }
}

impl User {
    /// Replace whatever token the user held with `token`.
    pub fn attach_token(&mut self, token: OneTimeToken, now: DateTime<Utc>) {
        self.one_time_token = Some(token);
        self.updated_at = now;
    }

    /// Unverified -> Verified. The token slot must hold an unexpired
    /// verification token; it is cleared on success.
    pub fn confirm_verification(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.is_verified {
            return Err(AuthError::conflict("user is already verified"));
        }

        match &self.one_time_token {
            Some(token) if token.purpose == TokenPurpose::Verification => {
                if token.is_expired(now) {
                    return Err(AuthError::expired(
                        "verification token is expired",
                    ));
                }
            }
            _ => return Err(AuthError::not_found("verification token not found")),
        }

        self.is_verified = true;
        self.one_time_token = None;
        self.updated_at = now;
        Ok(())
    }

    /// Swap in a new password hash using an unexpired reset token, clearing
    /// the token.
    pub fn apply_password_reset(
        &mut self,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match &self.one_time_token {
            Some(token) if token.purpose == TokenPurpose::PasswordReset => {
                if token.is_expired(now) {
                    return Err(AuthError::expired("reset token is expired"));
                }
            }
            _ => return Err(AuthError::not_found("reset token not found")),
        }

        self.password_hash = password_hash;
        self.one_time_token = None;
        self.updated_at = now;
        Ok(())
    }
}

/// Lowercase and trim an email address for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_password(password: &str) -> Result<()> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(AuthError::validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(AuthError::validation(format!(
            "password must be at most {MAX_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(AuthError::validation("email is required"));
    }
    if email.len() > MAX_EMAIL_LENGTH || !EMAIL_PATTERN.is_match(email) {
        return Err(AuthError::validation("email is invalid"));
    }
    Ok(())
}

/// Body of a registration request.
#[derive(Clone, Deserialize, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone_number: String,
    pub role_id: Uuid,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("role_id", &self.role_id)
            .finish_non_exhaustive()
    }
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AuthError::validation("name is required"));
        }
        if name.chars().count() > MAX_NAME_LENGTH {
            return Err(AuthError::validation(format!(
                "name must be at most {MAX_NAME_LENGTH} characters"
            )));
        }
        validate_email(&normalize_email(&self.email))?;
        validate_password(&self.password)?;
        if self.phone_number.trim().is_empty() {
            return Err(AuthError::validation("phone number is required"));
        }
        Ok(())
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct ResetPasswordRequest {
    pub password: String,
    pub retry_password: String,
}

impl fmt::Debug for ResetPasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetPasswordRequest").finish_non_exhaustive()
    }
}

/// Role detail embedded in a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSummary {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub level: i32,
}

impl From<&Role> for RoleSummary {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id,
            code: role.code.clone(),
            name: role.name.clone(),
            level: role.level,
        }
    }
}

/// Public view of an account; never carries secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub is_verified: bool,
    pub role: RoleSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user: &User, role: &Role) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            phone_number: user.phone_number.clone(),
            is_verified: user.is_verified,
            role: RoleSummary::from(role),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user_with_token(purpose: TokenPurpose, expires_in: Duration) -> User {
        let now = Utc::now();
        User {
            id: Uuid::now_v7(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            phone_number: "+100000".into(),
            password_hash: "$argon2id$stub".into(),
            role_id: Uuid::now_v7(),
            is_verified: false,
            one_time_token: Some(OneTimeToken {
                token_hash: "digest".into(),
                purpose,
                expires_at: now + expires_in,
            }),
            created_at: now,
            updated_at: now,
        }
    }

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            name: "Ada Lovelace".into(),
            email: "  Ada@Example.com ".into(),
            password: "analytical-engine".into(),
            phone_number: "+44 20 7946 0000".into(),
            role_id: Uuid::now_v7(),
        }
    }

    #[test]
    fn verification_clears_token_and_flips_flag() {
        let mut user = user_with_token(TokenPurpose::Verification, Duration::hours(1));
        user.confirm_verification(Utc::now()).unwrap();
        assert!(user.is_verified);
        assert!(user.one_time_token.is_none());
    }

    #[test]
    fn verification_rejects_expired_token() {
        let mut user = user_with_token(TokenPurpose::Verification, Duration::hours(1));
        let err = user
            .confirm_verification(Utc::now() + Duration::hours(2))
            .unwrap_err();
        assert!(matches!(err, AuthError::Expired(_)));
        assert!(!user.is_verified);
        assert!(user.one_time_token.is_some());
    }

    #[test]
    fn verification_is_terminal() {
        let mut user = user_with_token(TokenPurpose::Verification, Duration::hours(1));
        user.confirm_verification(Utc::now()).unwrap();
        let err = user.confirm_verification(Utc::now()).unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[test]
    fn reset_token_cannot_verify() {
        let mut user = user_with_token(TokenPurpose::PasswordReset, Duration::hours(1));
        let err = user.confirm_verification(Utc::now()).unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[test]
    fn verification_token_cannot_reset_password() {
        let mut user = user_with_token(TokenPurpose::Verification, Duration::hours(1));
        let err = user
            .apply_password_reset("new".into(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
        assert_eq!(user.password_hash, "$argon2id$stub");
    }

    #[test]
    fn password_reset_swaps_hash() {
        let mut user = user_with_token(TokenPurpose::PasswordReset, Duration::hours(1));
        user.apply_password_reset("$argon2id$new".into(), Utc::now())
            .unwrap();
        assert_eq!(user.password_hash, "$argon2id$new");
        assert!(user.one_time_token.is_none());
    }

    #[test]
    fn register_request_validation() {
        assert!(register_request().validate().is_ok());

        let mut bad = register_request();
        bad.email = "not-an-email".into();
        assert!(matches!(bad.validate(), Err(AuthError::Validation(_))));

        let mut bad = register_request();
        bad.password = "short".into();
        assert!(matches!(bad.validate(), Err(AuthError::Validation(_))));

        let mut bad = register_request();
        bad.name = "   ".into();
        assert!(matches!(bad.validate(), Err(AuthError::Validation(_))));

        let mut bad = register_request();
        bad.phone_number = "".into();
        assert!(matches!(bad.validate(), Err(AuthError::Validation(_))));
    }

    #[test]
    fn password_policy_bounds() {
        assert!(validate_password(&"a".repeat(MIN_PASSWORD_LENGTH)).is_ok());
        assert!(validate_password(&"a".repeat(MAX_PASSWORD_LENGTH)).is_ok());
        assert!(validate_password(&"a".repeat(MAX_PASSWORD_LENGTH + 1)).is_err());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let user = user_with_token(TokenPurpose::Verification, Duration::hours(1));
        let rendered = format!("{user:?}");
        assert!(!rendered.contains("argon2id"));
        assert!(!rendered.contains("digest"));
    }

    #[test]
    fn purpose_round_trips_through_text() {
        for purpose in [TokenPurpose::Verification, TokenPurpose::PasswordReset] {
            assert_eq!(purpose.as_str().parse::<TokenPurpose>().unwrap(), purpose);
        }
    }
}
