use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::users::user::{OneTimeToken, User};
use crate::error::Result;

#[async_trait]
pub trait UsersRepository: Send + Sync {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Lookup by normalized email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Lookup by the digest of a one-time token, whatever its purpose.
    async fn find_user_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<User>>;

    /// Whether any user currently holds the role with `role_code`.
    async fn role_holder_exists(&self, role_code: &str) -> Result<bool>;

    /// Insert a new user. Email uniqueness and, when `exclusive_role` is
    /// given, the absence of any holder of that role are re-checked in the
    /// same transaction as the insert. Violations are `Conflict`.
    async fn create_user_atomic(
        &self,
        user: &User,
        exclusive_role: Option<&str>,
    ) -> Result<()>;

    /// Overwrite the user's one-time token slot. `NotFound` if the user is
    /// gone.
    async fn store_one_time_token(
        &self,
        user_id: Uuid,
        token: &OneTimeToken,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Lock the holder of `token_hash`, apply
    /// [`User::confirm_verification`] and persist the result.
    async fn verify_user_atomic(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User>;

    /// Lock the holder of `token_hash`, apply
    /// [`User::apply_password_reset`] and persist the result.
    async fn reset_password_atomic(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User>;
}
