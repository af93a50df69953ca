use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::users::session::Session;
use crate::error::Result;

#[async_trait]
pub trait SessionsRepository: Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<()>;

    /// Remove every session of `session.user_id` and insert `session` in
    /// one step. Returns how many sessions were replaced.
    async fn replace_user_sessions_atomic(&self, session: &Session) -> Result<u64>;

    /// Swap the session holding `old_token_hash` for `session`. Fails with
    /// `NotFound` when no session of `session.user_id` holds the old hash,
    /// so a refresh token can be consumed at most once.
    async fn rotate_session_atomic(
        &self,
        old_token_hash: &str,
        session: &Session,
    ) -> Result<()>;

    async fn find_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>>;

    /// Newest session of the user by `created_at`.
    async fn find_latest_session_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Session>>;

    /// Returns whether a row was removed.
    async fn delete_session_by_token_hash(&self, token_hash: &str)
    -> Result<bool>;

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> Result<u64>;

    /// Remove sessions whose `expires_at` is before `now`.
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;
}
