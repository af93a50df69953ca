use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::crypto::AuthCrypto;
use crate::database::ports::sessions::SessionsRepository;
use crate::domain::users::session::Session;
use crate::error::{AuthError, Result};
use crate::time::TimeProvider;

/// Refresh-token sessions. Tokens are only ever stored as keyed digests;
/// callers pass and receive raw tokens.
#[derive(Clone)]
pub struct SessionManager {
    repo: Arc<dyn SessionsRepository>,
    crypto: Arc<AuthCrypto>,
    clock: Arc<dyn TimeProvider>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("repo", &std::any::type_name_of_val(self.repo.as_ref()))
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        repo: Arc<dyn SessionsRepository>,
        crypto: Arc<AuthCrypto>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            repo,
            crypto,
            clock,
        }
    }

    fn new_session(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        client_ip: &str,
        expires_at: DateTime<Utc>,
    ) -> Session {
        Session {
            id: Uuid::now_v7(),
            user_id,
            refresh_token_hash: self.crypto.hash_token(refresh_token),
            client_ip: client_ip.to_string(),
            expires_at,
            is_blocked: false,
            created_at: self.clock.utc_now(),
        }
    }

    pub async fn save(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        client_ip: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session> {
        let session = self.new_session(user_id, refresh_token, client_ip, expires_at);
        self.repo.insert_session(&session).await?;
        debug!(%user_id, session_id = %session.id, "saved session");
        Ok(session)
    }

    /// Make `refresh_token` the user's only session. Returns the new session
    /// and how many it replaced.
    pub async fn replace_for_user(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        client_ip: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(Session, u64)> {
        let session = self.new_session(user_id, refresh_token, client_ip, expires_at);
        let replaced = self.repo.replace_user_sessions_atomic(&session).await?;
        debug!(%user_id, session_id = %session.id, replaced, "replaced sessions");
        Ok((session, replaced))
    }

    /// Consume `previous` and store `refresh_token` in its place. Only one
    /// caller can consume a given session; the others get `NotFound`.
    pub async fn rotate(
        &self,
        previous: &Session,
        refresh_token: &str,
        client_ip: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session> {
        let session =
            self.new_session(previous.user_id, refresh_token, client_ip, expires_at);
        self.repo
            .rotate_session_atomic(&previous.refresh_token_hash, &session)
            .await?;
        debug!(
            user_id = %session.user_id,
            previous = %previous.id,
            session_id = %session.id,
            "rotated session"
        );
        Ok(session)
    }

    pub async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Session>> {
        self.repo.find_latest_session_for_user(user_id).await
    }

    pub async fn find_by_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Session>> {
        self.repo
            .find_session_by_token_hash(&self.crypto.hash_token(refresh_token))
            .await
    }

    /// A session that can still be used to refresh at `now`.
    pub async fn find_active_by_token(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let session = self
            .find_by_token(refresh_token)
            .await?
            .ok_or_else(|| AuthError::not_found("session not found"))?;
        if session.is_expired(now) {
            return Err(AuthError::expired("session is expired"));
        }
        if session.is_blocked {
            return Err(AuthError::authentication("session is blocked"));
        }
        Ok(session)
    }

    /// Idempotent. Returns whether a session was removed.
    pub async fn delete(&self, refresh_token: &str) -> Result<bool> {
        self.repo
            .delete_session_by_token_hash(&self.crypto.hash_token(refresh_token))
            .await
    }

    pub(crate) async fn delete_by_hash(&self, token_hash: &str) -> Result<bool> {
        self.repo.delete_session_by_token_hash(token_hash).await
    }

    pub async fn delete_for_user(&self, user_id: Uuid) -> Result<u64> {
        self.repo.delete_sessions_for_user(user_id).await
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        let removed = self.repo.purge_expired_sessions(self.clock.utc_now()).await?;
        if removed > 0 {
            info!(removed, "purged expired sessions");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::infrastructure::memory::InMemoryAuthStore;
    use crate::time::VirtualTimeProvider;
    use chrono::Duration;

    fn manager() -> (SessionManager, Arc<InMemoryAuthStore>, VirtualTimeProvider) {
        let store = Arc::new(InMemoryAuthStore::new());
        let clock = VirtualTimeProvider::new();
        let crypto = Arc::new(
            AuthCrypto::with_cost("pepper", "token-key", 8 * 1024, 1).unwrap(),
        );
        let manager = SessionManager::new(store.clone(), crypto, Arc::new(clock.clone()));
        (manager, store, clock)
    }

    #[tokio::test]
    async fn stores_digest_not_token() {
        let (manager, _store, clock) = manager();
        let user_id = Uuid::now_v7();
        let session = manager
            .save(user_id, "raw-refresh", "10.0.0.1", clock.utc_now() + Duration::days(7))
            .await
            .unwrap();
        assert_ne!(session.refresh_token_hash, "raw-refresh");
        assert_eq!(
            manager.find_by_token("raw-refresh").await.unwrap().unwrap().id,
            session.id
        );
        assert_eq!(manager.find_by_user(user_id).await.unwrap().unwrap().id, session.id);
    }

    #[tokio::test]
    async fn active_lookup_checks_expiry_and_block() {
        let (manager, store, clock) = manager();
        let user_id = Uuid::now_v7();
        manager
            .save(user_id, "tok-a", "ip", clock.utc_now() + Duration::hours(1))
            .await
            .unwrap();

        assert!(manager.find_active_by_token("tok-a", clock.utc_now()).await.is_ok());
        assert!(matches!(
            manager.find_active_by_token("other", clock.utc_now()).await,
            Err(AuthError::NotFound(_))
        ));

        store.block_sessions_for_user(user_id).await;
        assert!(matches!(
            manager.find_active_by_token("tok-a", clock.utc_now()).await,
            Err(AuthError::Authentication(_))
        ));

        clock.advance(Duration::hours(2));
        assert!(matches!(
            manager.find_active_by_token("tok-a", clock.utc_now()).await,
            Err(AuthError::Expired(_))
        ));
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_purge_drops_stale_rows() {
        let (manager, store, clock) = manager();
        let user_id = Uuid::now_v7();
        manager
            .save(user_id, "tok-a", "ip", clock.utc_now() + Duration::hours(1))
            .await
            .unwrap();
        manager
            .save(user_id, "tok-b", "ip", clock.utc_now() + Duration::days(1))
            .await
            .unwrap();

        assert!(manager.delete("tok-a").await.unwrap());
        assert!(!manager.delete("tok-a").await.unwrap());

        manager
            .save(user_id, "tok-c", "ip", clock.utc_now() + Duration::minutes(5))
            .await
            .unwrap();
        clock.advance(Duration::hours(1));
        assert_eq!(manager.purge_expired().await.unwrap(), 1);
        assert_eq!(store.session_count().await, 1);

        assert_eq!(manager.delete_for_user(user_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn replace_leaves_one_session() {
        let (manager, store, clock) = manager();
        let user_id = Uuid::now_v7();
        let expires = clock.utc_now() + Duration::days(1);
        manager.save(user_id, "tok-a", "ip", expires).await.unwrap();
        manager.save(user_id, "tok-b", "ip", expires).await.unwrap();

        let (session, replaced) = manager
            .replace_for_user(user_id, "tok-c", "10.0.0.9", expires)
            .await
            .unwrap();
        assert_eq!(replaced, 2);
        assert_eq!(store.session_count().await, 1);
        assert_eq!(manager.find_by_user(user_id).await.unwrap().unwrap().id, session.id);
    }

    #[tokio::test]
    async fn a_session_rotates_once() {
        let (manager, store, clock) = manager();
        let user_id = Uuid::now_v7();
        let expires = clock.utc_now() + Duration::days(1);
        let first = manager.save(user_id, "tok-a", "ip", expires).await.unwrap();

        manager.rotate(&first, "tok-b", "ip", expires).await.unwrap();
        assert!(matches!(
            manager.rotate(&first, "tok-c", "ip", expires).await,
            Err(AuthError::NotFound(_))
        ));
        assert_eq!(store.session_count().await, 1);
        assert!(manager.find_by_token("tok-b").await.unwrap().is_some());
        assert!(manager.find_by_token("tok-c").await.unwrap().is_none());
    }
}
