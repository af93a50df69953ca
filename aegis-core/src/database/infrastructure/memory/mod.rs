//! In-process store used by tests and local development.
//!
//! One `RwLock` guards every table, so the `*_atomic` operations hold a
//! single write guard across their check and mutation.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::ports::{
    roles::RolesRepository, sessions::SessionsRepository,
    users::UsersRepository,
};
use crate::domain::users::{
    rbac::{Permission, Role},
    session::Session,
    user::{OneTimeToken, User},
};
use crate::error::{AuthError, Result};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    roles: HashMap<Uuid, Role>,
    permissions: HashMap<Uuid, Permission>,
    grants: HashSet<(Uuid, Uuid)>,
    sessions: HashMap<Uuid, Session>,
}

impl Tables {
    fn user_id_by_token_hash(&self, token_hash: &str) -> Option<Uuid> {
        self.users
            .values()
            .find(|user| {
                user.one_time_token
                    .as_ref()
                    .is_some_and(|token| token.token_hash == token_hash)
            })
            .map(|user| user.id)
    }

    fn email_taken(&self, email: &str) -> bool {
        self.users.values().any(|user| user.email == email)
    }

    fn role_holder_exists(&self, role_code: &str) -> bool {
        let Some(role_id) = self
            .roles
            .values()
            .find(|role| role.code == role_code)
            .map(|role| role.id)
        else {
            return false;
        };
        self.users.values().any(|user| user.role_id == role_id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAuthStore {
    tables: RwLock<Tables>,
}

impl InMemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.tables.read().await.sessions.len()
    }

    /// Flag every session of a user as blocked.
    pub async fn block_sessions_for_user(&self, user_id: Uuid) -> usize {
        let mut tables = self.tables.write().await;
        let mut blocked = 0;
        for session in tables.sessions.values_mut() {
            if session.user_id == user_id {
                session.is_blocked = true;
                blocked += 1;
            }
        }
        blocked
    }

    /// Hard-delete a user and their sessions.
    pub async fn remove_user(&self, user_id: Uuid) -> bool {
        let mut tables = self.tables.write().await;
        tables.sessions.retain(|_, session| session.user_id != user_id);
        tables.users.remove(&user_id).is_some()
    }
}

#[async_trait]
impl UsersRepository for InMemoryAuthStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn find_user_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .user_id_by_token_hash(token_hash)
            .and_then(|id| tables.users.get(&id).cloned()))
    }

    async fn role_holder_exists(&self, role_code: &str) -> Result<bool> {
        Ok(self.tables.read().await.role_holder_exists(role_code))
    }

    async fn create_user_atomic(
        &self,
        user: &User,
        exclusive_role: Option<&str>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.email_taken(&user.email) {
            return Err(AuthError::conflict("user email already exists"));
        }
        if let Some(code) = exclusive_role
            && tables.role_holder_exists(code)
        {
            return Err(AuthError::conflict(format!("{code} already exists")));
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn store_one_time_token(
        &self,
        user_id: Uuid,
        token: &OneTimeToken,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AuthError::not_found("user not found"))?;
        user.attach_token(token.clone(), now);
        Ok(())
    }

    async fn verify_user_atomic(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let mut tables = self.tables.write().await;
        let user_id = tables
            .user_id_by_token_hash(token_hash)
            .ok_or_else(|| AuthError::not_found("verification token not found"))?;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AuthError::not_found("verification token not found"))?;
        user.confirm_verification(now)?;
        Ok(user.clone())
    }

    async fn reset_password_atomic(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let mut tables = self.tables.write().await;
        let user_id = tables
            .user_id_by_token_hash(token_hash)
            .ok_or_else(|| AuthError::not_found("reset token not found"))?;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AuthError::not_found("reset token not found"))?;
        user.apply_password_reset(password_hash.to_string(), now)?;
        Ok(user.clone())
    }
}

#[async_trait]
impl RolesRepository for InMemoryAuthStore {
    async fn find_role_by_id(&self, id: Uuid) -> Result<Option<Role>> {
        Ok(self.tables.read().await.roles.get(&id).cloned())
    }

    async fn find_role_by_code(&self, code: &str) -> Result<Option<Role>> {
        Ok(self
            .tables
            .read()
            .await
            .roles
            .values()
            .find(|role| role.code == code)
            .cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let mut roles: Vec<Role> =
            self.tables.read().await.roles.values().cloned().collect();
        roles.sort_by(|a, b| b.level.cmp(&a.level).then(a.code.cmp(&b.code)));
        Ok(roles)
    }

    async fn permissions_for_role(
        &self,
        role_id: Uuid,
    ) -> Result<Vec<Permission>> {
        let tables = self.tables.read().await;
        let mut permissions: Vec<Permission> = tables
            .grants
            .iter()
            .filter(|(granted_role, _)| *granted_role == role_id)
            .filter_map(|(_, permission_id)| {
                tables.permissions.get(permission_id).cloned()
            })
            .collect();
        permissions.sort_by(|a, b| {
            a.module.cmp(&b.module).then(a.action.cmp(&b.action))
        });
        Ok(permissions)
    }

    async fn upsert_role(&self, role: &Role) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables
            .roles
            .values()
            .any(|existing| existing.code == role.code && existing.id != role.id)
        {
            return Err(AuthError::conflict(format!(
                "role code '{}' already exists",
                role.code
            )));
        }
        tables.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn upsert_permission(&self, permission: &Permission) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.permissions.insert(permission.id, permission.clone());
        Ok(())
    }

    async fn grant_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.roles.contains_key(&role_id) {
            return Err(AuthError::not_found("role not found"));
        }
        if !tables.permissions.contains_key(&permission_id) {
            return Err(AuthError::not_found("permission not found"));
        }
        tables.grants.insert((role_id, permission_id));
        Ok(())
    }
}

#[async_trait]
impl SessionsRepository for InMemoryAuthStore {
    async fn insert_session(&self, session: &Session) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables
            .sessions
            .values()
            .any(|existing| existing.refresh_token_hash == session.refresh_token_hash)
        {
            return Err(AuthError::conflict("refresh token already in use"));
        }
        tables.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn replace_user_sessions_atomic(&self, session: &Session) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables
            .sessions
            .retain(|_, existing| existing.user_id != session.user_id);
        let replaced = (before - tables.sessions.len()) as u64;
        tables.sessions.insert(session.id, session.clone());
        Ok(replaced)
    }

    async fn rotate_session_atomic(
        &self,
        old_token_hash: &str,
        session: &Session,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let Some(old_id) = tables
            .sessions
            .values()
            .find(|existing| {
                existing.refresh_token_hash == old_token_hash
                    && existing.user_id == session.user_id
            })
            .map(|existing| existing.id)
        else {
            return Err(AuthError::not_found("session not found"));
        };
        tables.sessions.remove(&old_id);
        tables.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>> {
        Ok(self
            .tables
            .read()
            .await
            .sessions
            .values()
            .find(|session| session.refresh_token_hash == token_hash)
            .cloned())
    }

    async fn find_latest_session_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Session>> {
        Ok(self
            .tables
            .read()
            .await
            .sessions
            .values()
            .filter(|session| session.user_id == user_id)
            .max_by_key(|session| (session.created_at, session.id))
            .cloned())
    }

    async fn delete_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables
            .sessions
            .retain(|_, session| session.refresh_token_hash != token_hash);
        Ok(tables.sessions.len() < before)
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, session| session.user_id != user_id);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, session| session.expires_at >= now);
        Ok((before - tables.sessions.len()) as u64)
    }
}
