//! Account lifecycle: registration, verification, login, refresh, logout and
//! password recovery.
//!
//! Every operation re-reads the store. Nothing about users, roles or
//! sessions is cached in process.

use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::crypto::AuthCrypto;
use super::one_time_token::{normalize_one_time_token, token_prefix};
use super::permissions::CallerIdentity;
use super::session_manager::SessionManager;
use super::tokens::{TokenIssuer, TokenPair};
use crate::application::unit_of_work::AuthUnitOfWork;
use crate::domain::users::rbac::{Role, roles};
use crate::domain::users::user::{
    EmailRequest, LoginRequest, OneTimeToken, RegisterRequest,
    ResetPasswordRequest, TokenPurpose, User, UserProfile, normalize_email,
    validate_password,
};
use crate::error::{AuthError, Result};
use crate::notify::{DeliveryReceipt, EmailTemplates, NotificationDispatcher};
use crate::time::TimeProvider;

/// Token lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub one_time_token_ttl: Duration,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            access_token_ttl: Duration::minutes(15),
            refresh_token_ttl: Duration::days(7),
            one_time_token_ttl: Duration::hours(24),
        }
    }
}

/// Result of a successful registration. The receipt resolves once the
/// verification email has been handed to the notifier; it can be dropped.
#[derive(Debug)]
pub struct Registration {
    pub user: UserProfile,
    pub notification: DeliveryReceipt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginOutcome {
    pub user: UserProfile,
    pub tokens: TokenPair,
}

pub struct AccountLifecycle {
    uow: AuthUnitOfWork,
    issuer: Arc<TokenIssuer>,
    crypto: Arc<AuthCrypto>,
    sessions: SessionManager,
    notifications: Arc<NotificationDispatcher>,
    templates: EmailTemplates,
    policy: LifecyclePolicy,
    clock: Arc<dyn TimeProvider>,
}

impl fmt::Debug for AccountLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountLifecycle")
            .field("uow", &self.uow)
            .field("sessions", &self.sessions)
            .field("notifications", &self.notifications)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl AccountLifecycle {
    pub fn new(
        uow: AuthUnitOfWork,
        issuer: Arc<TokenIssuer>,
        crypto: Arc<AuthCrypto>,
        notifications: Arc<NotificationDispatcher>,
        templates: EmailTemplates,
        policy: LifecyclePolicy,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        let sessions = SessionManager::new(
            uow.sessions.clone(),
            Arc::clone(&crypto),
            Arc::clone(&clock),
        );
        Self {
            uow,
            issuer,
            crypto,
            sessions,
            notifications,
            templates,
            policy,
            clock,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn policy(&self) -> LifecyclePolicy {
        self.policy
    }

    async fn role_of(&self, user: &User) -> Result<Role> {
        self.uow
            .roles
            .find_role_by_id(user.role_id)
            .await?
            .ok_or_else(|| AuthError::not_found("role not found"))
    }

    fn mint_one_time_token(
        &self,
        purpose: TokenPurpose,
    ) -> Result<(String, OneTimeToken)> {
        let raw = self.crypto.generate_opaque_token()?;
        let token = OneTimeToken {
            token_hash: self.crypto.hash_token(&raw),
            purpose,
            expires_at: self.clock.utc_now() + self.policy.one_time_token_ttl,
        };
        Ok((raw, token))
    }

    async fn find_by_required_email(&self, email: &str) -> Result<User> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AuthError::validation("email is required"));
        }
        self.uow
            .users
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| AuthError::not_found("user email not found"))
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<Registration> {
        request.validate()?;
        let email = normalize_email(&request.email);

        if self.uow.users.find_user_by_email(&email).await?.is_some() {
            warn!(%email, "registration rejected: email already exists");
            return Err(AuthError::conflict("user email already exists"));
        }

        let role = self
            .uow
            .roles
            .find_role_by_id(request.role_id)
            .await?
            .ok_or_else(|| AuthError::not_found("role not found"))?;

        if !role.can_self_register {
            warn!(role = %role.code, "registration rejected: role cannot self register");
            return Err(AuthError::permission("role cannot self register"));
        }

        let exclusive_role = (role.code == roles::OWNER).then_some(roles::OWNER);
        if exclusive_role.is_some()
            && self.uow.users.role_holder_exists(roles::OWNER).await?
        {
            warn!("registration rejected: owner already exists");
            return Err(AuthError::conflict("owner already exists"));
        }

        let password_hash = self.crypto.hash_password(&request.password)?;
        let (raw_token, token) = self.mint_one_time_token(TokenPurpose::Verification)?;

        let now = self.clock.utc_now();
        let user = User {
            id: Uuid::now_v7(),
            name: request.name.trim().to_string(),
            email,
            phone_number: request.phone_number.trim().to_string(),
            password_hash,
            role_id: role.id,
            is_verified: false,
            one_time_token: Some(token),
            created_at: now,
            updated_at: now,
        };

        self.uow
            .users
            .create_user_atomic(&user, exclusive_role)
            .await?;

        info!(user_id = %user.id, role = %role.code, "registered user");

        let notification = self
            .notifications
            .dispatch(self.templates.verification(&user.email, &raw_token));

        Ok(Registration {
            user: UserProfile::new(&user, &role),
            notification,
        })
    }

    pub async fn verify_account(&self, raw_token: &str) -> Result<UserProfile> {
        let token = normalize_one_time_token(raw_token)?;
        let token_hash = self.crypto.hash_token(token);

        let user = self
            .uow
            .users
            .verify_user_atomic(&token_hash, self.clock.utc_now())
            .await
            .inspect_err(|err| {
                warn!(token = token_prefix(token), error = %err, "verification failed");
            })?;

        info!(user_id = %user.id, "verified account");
        let role = self.role_of(&user).await?;
        Ok(UserProfile::new(&user, &role))
    }

    pub async fn resend_verification(
        &self,
        request: EmailRequest,
    ) -> Result<DeliveryReceipt> {
        let user = self.find_by_required_email(&request.email).await?;
        if user.is_verified {
            return Err(AuthError::conflict("user is already verified"));
        }

        let (raw_token, token) = self.mint_one_time_token(TokenPurpose::Verification)?;
        self.uow
            .users
            .store_one_time_token(user.id, &token, self.clock.utc_now())
            .await?;

        debug!(user_id = %user.id, "issued new verification token");
        Ok(self
            .notifications
            .dispatch(self.templates.verification(&user.email, &raw_token)))
    }

    pub async fn login(
        &self,
        request: LoginRequest,
        client_ip: &str,
    ) -> Result<LoginOutcome> {
        let email = normalize_email(&request.email);
        if email.is_empty() {
            return Err(AuthError::validation("email is required"));
        }
        if request.password.is_empty() {
            return Err(AuthError::validation("password is required"));
        }

        let Some(user) = self.uow.users.find_user_by_email(&email).await? else {
            warn!(%email, "login rejected: unknown email");
            return Err(AuthError::authentication("invalid email or password"));
        };

        if !user.is_verified {
            warn!(user_id = %user.id, "login rejected: user not verified");
            return Err(AuthError::permission("user is not verified"));
        }

        if !self
            .crypto
            .verify_password(&request.password, &user.password_hash)?
        {
            warn!(user_id = %user.id, "login rejected: bad password");
            return Err(AuthError::authentication("invalid email or password"));
        }

        let role = self.role_of(&user).await?;
        let tokens = self.issue_pair(&user, &role)?;

        let (_, replaced) = self
            .sessions
            .replace_for_user(
                user.id,
                &tokens.refresh_token,
                client_ip,
                tokens.refresh_expires_at,
            )
            .await?;

        info!(user_id = %user.id, client_ip, replaced, "user logged in");
        Ok(LoginOutcome {
            user: UserProfile::new(&user, &role),
            tokens,
        })
    }

    fn issue_pair(&self, user: &User, role: &Role) -> Result<TokenPair> {
        let access = self.issuer.issue_access_token(
            user.id,
            &role.code,
            self.policy.access_token_ttl,
        )?;
        let refresh = self
            .issuer
            .issue_refresh_token(user.id, self.policy.refresh_token_ttl)?;
        Ok(TokenPair {
            access_token: access.token,
            access_expires_at: access.expires_at,
            refresh_token: refresh.token,
            refresh_expires_at: refresh.expires_at,
        })
    }

    pub async fn logout(&self, caller: Option<&CallerIdentity>) -> Result<()> {
        let caller = caller
            .ok_or_else(|| AuthError::authentication("authentication required"))?;

        let session = self
            .sessions
            .find_by_user(caller.user_id)
            .await?
            .ok_or_else(|| AuthError::not_found("session not found"))?;

        self.sessions.delete_by_hash(&session.refresh_token_hash).await?;
        info!(user_id = %caller.user_id, "user logged out");
        Ok(())
    }

    /// Single-use rotation: the presented refresh token stops working as
    /// soon as this returns.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        client_ip: &str,
    ) -> Result<LoginOutcome> {
        let refresh_token = refresh_token.trim();
        if refresh_token.is_empty() {
            return Err(AuthError::authentication("refresh token is required"));
        }

        let now = self.clock.utc_now();
        let session = self
            .sessions
            .find_active_by_token(refresh_token, now)
            .await?;

        let claims = self.issuer.validate_refresh_at(refresh_token, now)?;
        if claims.user_id != session.user_id {
            warn!(session_id = %session.id, "refresh token does not belong to session owner");
            return Err(AuthError::authentication("refresh token is invalid"));
        }

        let Some(user) = self.uow.users.find_user_by_id(session.user_id).await?
        else {
            warn!(user_id = %session.user_id, "refresh rejected: session owner is gone");
            return Err(AuthError::authentication("refresh token is invalid"));
        };

        let role = self.role_of(&user).await?;
        let tokens = self.issue_pair(&user, &role)?;

        self.sessions
            .rotate(
                &session,
                &tokens.refresh_token,
                client_ip,
                tokens.refresh_expires_at,
            )
            .await
            .inspect_err(|err| {
                warn!(session_id = %session.id, error = %err, "session rotation failed");
            })?;

        debug!(user_id = %user.id, "rotated refresh token");
        Ok(LoginOutcome {
            user: UserProfile::new(&user, &role),
            tokens,
        })
    }

    /// Unlike registration, the caller learns whether the email went out.
    pub async fn forgot_password(&self, request: EmailRequest) -> Result<()> {
        let user = self.find_by_required_email(&request.email).await?;
        if !user.is_verified {
            return Err(AuthError::permission("user is not verified"));
        }

        let (raw_token, token) = self.mint_one_time_token(TokenPurpose::PasswordReset)?;
        self.uow
            .users
            .store_one_time_token(user.id, &token, self.clock.utc_now())
            .await?;

        self.notifications
            .dispatch(self.templates.password_reset(&user.email, &raw_token))
            .wait()
            .await
            .map_err(|err| {
                error!(user_id = %user.id, error = %err, "failed to send password reset email");
                AuthError::from(err)
            })?;

        info!(user_id = %user.id, "sent password reset email");
        Ok(())
    }

    pub async fn reset_password(
        &self,
        raw_token: &str,
        request: ResetPasswordRequest,
    ) -> Result<()> {
        let token = normalize_one_time_token(raw_token)?;
        let token_hash = self.crypto.hash_token(token);
        let now = self.clock.utc_now();

        let holder = self
            .uow
            .users
            .find_user_by_token_hash(&token_hash)
            .await?
            .and_then(|user| user.one_time_token)
            .filter(|slot| slot.purpose == TokenPurpose::PasswordReset)
            .ok_or_else(|| AuthError::not_found("reset token not found"))?;
        if holder.is_expired(now) {
            return Err(AuthError::expired("reset token is expired"));
        }

        if request.password != request.retry_password {
            return Err(AuthError::validation("passwords do not match"));
        }
        validate_password(&request.password)?;

        let password_hash = self.crypto.hash_password(&request.password)?;
        let user = self
            .uow
            .users
            .reset_password_atomic(&token_hash, &password_hash, now)
            .await
            .inspect_err(|err| {
                warn!(token = token_prefix(token), error = %err, "password reset failed");
            })?;

        let revoked = self.sessions.delete_for_user(user.id).await?;
        info!(user_id = %user.id, revoked, "password reset");

        // Confirmation only; its delivery outcome is logged by the worker.
        drop(
            self.notifications
                .dispatch(self.templates.password_reset_success(&user.email)),
        );
        Ok(())
    }

    pub async fn current_user(
        &self,
        caller: Option<&CallerIdentity>,
    ) -> Result<UserProfile> {
        let caller = caller
            .ok_or_else(|| AuthError::authentication("authentication required"))?;

        let user = self
            .uow
            .users
            .find_user_by_id(caller.user_id)
            .await?
            .ok_or_else(|| AuthError::not_found("user not found"))?;
        if !user.is_verified {
            return Err(AuthError::permission("user is not verified"));
        }

        let role = self.role_of(&user).await?;
        Ok(UserProfile::new(&user, &role))
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        self.uow.roles.list_roles().await
    }
}
