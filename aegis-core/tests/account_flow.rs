//! End-to-end account scenarios against the in-memory store.

use std::sync::Arc;

use aegis_core::{
    AuthError, AuthUnitOfWork,
    application::rbac_bootstrap::{OWNER_ROLE_ID, PATIENT_ROLE_ID},
    database::{InMemoryAuthStore, ports::sessions::SessionsRepository},
    domain::users::{
        Session,
        auth::{CallerIdentity, Decision, PermissionEvaluator},
        user::{EmailRequest, ResetPasswordRequest},
    },
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[path = "support/mod.rs"]
mod support;

use support::TestAccounts;

#[tokio::test]
async fn patient_registers_verifies_logs_in_and_rotates() -> Result<()> {
    let accounts = TestAccounts::in_memory().await?;
    let lifecycle = &accounts.lifecycle;

    let registration = lifecycle
        .register(TestAccounts::register_request("a@clinic.io", PATIENT_ROLE_ID))
        .await?;
    assert!(!registration.user.is_verified);
    assert_eq!(registration.user.role.code, "patient");
    registration.notification.wait().await?;
    let token = accounts.last_link_token("a@clinic.io")?;

    let wrong = lifecycle.verify_account(&"f".repeat(64)).await;
    assert!(matches!(wrong, Err(AuthError::NotFound(_))));

    let verified = lifecycle.verify_account(&token).await?;
    assert!(verified.is_verified);

    let login = lifecycle
        .login(TestAccounts::login_request("a@clinic.io"), "192.0.2.10")
        .await?;
    let session = lifecycle
        .sessions()
        .find_by_token(&login.tokens.refresh_token)
        .await?
        .expect("session persisted at login");
    assert_eq!(session.user_id, login.user.id);
    assert_eq!(session.client_ip, "192.0.2.10");

    let rotated = lifecycle
        .refresh_token(&login.tokens.refresh_token, "192.0.2.10")
        .await?;
    assert_ne!(rotated.tokens.refresh_token, login.tokens.refresh_token);

    let reused = lifecycle
        .refresh_token(&login.tokens.refresh_token, "192.0.2.10")
        .await;
    assert!(matches!(reused, Err(AuthError::NotFound(_))));

    lifecycle
        .refresh_token(&rotated.tokens.refresh_token, "192.0.2.10")
        .await?;

    accounts.register("owner@clinic.io", OWNER_ROLE_ID).await?;
    let second_owner = lifecycle
        .register(TestAccounts::register_request("owner2@clinic.io", OWNER_ROLE_ID))
        .await;
    assert!(matches!(second_owner, Err(AuthError::Conflict(_))));

    Ok(())
}

#[tokio::test]
async fn owner_holds_every_permission_and_patient_only_profile() -> Result<()> {
    let accounts = TestAccounts::in_memory().await?;
    let evaluator =
        PermissionEvaluator::new(accounts.uow.users.clone(), accounts.uow.roles.clone());

    let owner_token = accounts.register("boss@clinic.io", OWNER_ROLE_ID).await?;
    let owner = accounts.lifecycle.verify_account(&owner_token).await?;
    let patient_token = accounts.register("p@clinic.io", PATIENT_ROLE_ID).await?;
    let patient = accounts.lifecycle.verify_account(&patient_token).await?;

    let owner_caller = CallerIdentity {
        user_id: owner.id,
        role_code: owner.role.code.clone(),
    };
    let patient_caller = CallerIdentity {
        user_id: patient.id,
        role_code: patient.role.code.clone(),
    };

    for (module, action) in [("user", "delete"), ("role", "manage"), ("profile", "read")] {
        assert_eq!(
            evaluator.require_permission(Some(&owner_caller), module, action).await,
            Decision::Allow
        );
    }
    assert!(matches!(
        evaluator.require_permission(Some(&patient_caller), "user", "delete").await,
        Decision::Forbidden(_)
    ));
    assert!(
        evaluator
            .require_role(Some(&patient_caller), &["patient"])
            .await
            .is_allowed()
    );
    Ok(())
}

#[tokio::test]
async fn password_recovery_invalidates_old_credentials_and_sessions() -> Result<()> {
    let accounts = TestAccounts::in_memory().await?;
    let lifecycle = &accounts.lifecycle;
    let token = accounts.register("r@clinic.io", PATIENT_ROLE_ID).await?;
    lifecycle.verify_account(&token).await?;
    let login = lifecycle
        .login(TestAccounts::login_request("r@clinic.io"), "ip")
        .await?;

    lifecycle
        .forgot_password(EmailRequest {
            email: "R@Clinic.io".to_string(),
        })
        .await?;
    let reset_token = accounts.last_link_token("r@clinic.io")?;

    accounts.clock.advance(chrono::Duration::hours(1));
    lifecycle
        .reset_password(
            &reset_token,
            ResetPasswordRequest {
                password: "a brand new secret".to_string(),
                retry_password: "a brand new secret".to_string(),
            },
        )
        .await?;

    let stale = lifecycle.refresh_token(&login.tokens.refresh_token, "ip").await;
    assert!(matches!(stale, Err(AuthError::NotFound(_))));

    let again = lifecycle
        .reset_password(
            &reset_token,
            ResetPasswordRequest {
                password: "another new secret".to_string(),
                retry_password: "another new secret".to_string(),
            },
        )
        .await;
    assert!(matches!(again, Err(AuthError::NotFound(_))));

    let old_password = lifecycle
        .login(TestAccounts::login_request("r@clinic.io"), "ip")
        .await;
    assert!(matches!(old_password, Err(AuthError::Authentication(_))));
    Ok(())
}

#[tokio::test]
async fn reset_token_expires() -> Result<()> {
    let accounts = TestAccounts::in_memory().await?;
    let token = accounts.register("e@clinic.io", PATIENT_ROLE_ID).await?;
    accounts.lifecycle.verify_account(&token).await?;
    accounts
        .lifecycle
        .forgot_password(EmailRequest {
            email: "e@clinic.io".to_string(),
        })
        .await?;
    let reset_token = accounts.last_link_token("e@clinic.io")?;

    accounts.clock.advance(chrono::Duration::hours(25));
    let result = accounts
        .lifecycle
        .reset_password(
            &reset_token,
            ResetPasswordRequest {
                password: "a brand new secret".to_string(),
                retry_password: "a brand new secret".to_string(),
            },
        )
        .await;
    assert!(matches!(result, Err(AuthError::Expired(_))));
    Ok(())
}

/// Session store that yields after every token lookup, so concurrent
/// refreshes interleave between their read and their write.
struct InterleavingSessions(Arc<InMemoryAuthStore>);

#[async_trait]
impl SessionsRepository for InterleavingSessions {
    async fn insert_session(&self, session: &Session) -> aegis_core::Result<()> {
        self.0.insert_session(session).await
    }

    async fn replace_user_sessions_atomic(
        &self,
        session: &Session,
    ) -> aegis_core::Result<u64> {
        self.0.replace_user_sessions_atomic(session).await
    }

    async fn rotate_session_atomic(
        &self,
        old_token_hash: &str,
        session: &Session,
    ) -> aegis_core::Result<()> {
        self.0.rotate_session_atomic(old_token_hash, session).await
    }

    async fn find_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> aegis_core::Result<Option<Session>> {
        let found = self.0.find_session_by_token_hash(token_hash).await;
        tokio::task::yield_now().await;
        found
    }

    async fn find_latest_session_for_user(
        &self,
        user_id: Uuid,
    ) -> aegis_core::Result<Option<Session>> {
        self.0.find_latest_session_for_user(user_id).await
    }

    async fn delete_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> aegis_core::Result<bool> {
        self.0.delete_session_by_token_hash(token_hash).await
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> aegis_core::Result<u64> {
        self.0.delete_sessions_for_user(user_id).await
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> aegis_core::Result<u64> {
        self.0.purge_expired_sessions(now).await
    }
}

#[tokio::test]
async fn concurrent_refreshes_consume_the_token_once() -> Result<()> {
    let store = Arc::new(InMemoryAuthStore::new());
    let uow = AuthUnitOfWork::new(
        store.clone(),
        store.clone(),
        Arc::new(InterleavingSessions(store.clone())),
    );
    let accounts = TestAccounts::with_uow(uow).await?;
    let lifecycle = &accounts.lifecycle;

    let token = accounts.register("race@clinic.io", PATIENT_ROLE_ID).await?;
    lifecycle.verify_account(&token).await?;
    let login = lifecycle
        .login(TestAccounts::login_request("race@clinic.io"), "ip")
        .await?;
    let presented = login.tokens.refresh_token.as_str();

    let (first, second) = tokio::join!(
        lifecycle.refresh_token(presented, "ip-a"),
        lifecycle.refresh_token(presented, "ip-b"),
    );
    let winners = [first.is_ok(), second.is_ok()]
        .into_iter()
        .filter(|ok| *ok)
        .count();
    assert_eq!(winners, 1, "one refresh token rotated twice");
    let loser = if first.is_ok() { second } else { first };
    assert!(matches!(loser, Err(AuthError::NotFound(_))));
    assert_eq!(store.session_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_logins_leave_one_session() -> Result<()> {
    let store = Arc::new(InMemoryAuthStore::new());
    let accounts = TestAccounts::with_uow(AuthUnitOfWork::in_memory(store.clone())).await?;
    let lifecycle = &accounts.lifecycle;

    let token = accounts.register("twice@clinic.io", PATIENT_ROLE_ID).await?;
    lifecycle.verify_account(&token).await?;

    let (first, second) = tokio::join!(
        lifecycle.login(TestAccounts::login_request("twice@clinic.io"), "ip-a"),
        lifecycle.login(TestAccounts::login_request("twice@clinic.io"), "ip-b"),
    );
    first?;
    second?;
    assert_eq!(store.session_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn session_expiry_matches_refresh_token_expiry() -> Result<()> {
    let accounts = TestAccounts::in_memory().await?;
    let token = accounts.register("clock@clinic.io", PATIENT_ROLE_ID).await?;
    accounts.lifecycle.verify_account(&token).await?;

    // A shifted clock must not make freshly issued tokens look immature.
    accounts.clock.advance(chrono::Duration::days(3));
    let login = accounts
        .lifecycle
        .login(TestAccounts::login_request("clock@clinic.io"), "ip")
        .await?;
    let session = accounts
        .lifecycle
        .sessions()
        .find_by_token(&login.tokens.refresh_token)
        .await?
        .expect("session persisted at login");
    assert_eq!(session.expires_at, login.tokens.refresh_expires_at);

    let rotated = accounts
        .lifecycle
        .refresh_token(&login.tokens.refresh_token, "ip")
        .await?;

    accounts.clock.advance(chrono::Duration::days(8));
    let expired = accounts
        .lifecycle
        .refresh_token(&rotated.tokens.refresh_token, "ip")
        .await;
    assert!(matches!(expired, Err(AuthError::Expired(_))));
    Ok(())
}
