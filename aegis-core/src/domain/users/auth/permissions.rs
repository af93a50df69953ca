use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::database::ports::{roles::RolesRepository, users::UsersRepository};
use crate::domain::users::rbac::RolePermissions;
use crate::error::{AuthError, Result};

/// Identity established by the gateway for the current request.
///
/// `role_code` is what the access token claimed at issue time. Permission
/// checks never trust it and re-resolve the role from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub user_id: Uuid,
    pub role_code: String,
}

/// Outcome of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Forbidden(String),
    Unauthorized(String),
    InternalError(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Forbidden(message) => Err(AuthError::Permission(message)),
            Decision::Unauthorized(message) => {
                Err(AuthError::Authentication(message))
            }
            Decision::InternalError(message) => {
                Err(AuthError::Infrastructure(message))
            }
        }
    }
}

/// Resolves a caller's role and permission set from the store on every
/// call.
#[derive(Clone)]
pub struct PermissionEvaluator {
    users: Arc<dyn UsersRepository>,
    roles: Arc<dyn RolesRepository>,
}

impl fmt::Debug for PermissionEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionEvaluator")
            .field("users", &std::any::type_name_of_val(self.users.as_ref()))
            .field("roles", &std::any::type_name_of_val(self.roles.as_ref()))
            .finish()
    }
}

enum Resolution {
    Resolved(RolePermissions),
    Denied(Decision),
}

impl PermissionEvaluator {
    pub fn new(
        users: Arc<dyn UsersRepository>,
        roles: Arc<dyn RolesRepository>,
    ) -> Self {
        Self { users, roles }
    }

    /// Current role and permissions of a user. `Ok(None)` when the user or
    /// their role no longer exists.
    pub async fn permissions_for(
        &self,
        user_id: Uuid,
    ) -> Result<Option<RolePermissions>> {
        let Some(user) = self.users.find_user_by_id(user_id).await? else {
            return Ok(None);
        };
        let Some(role) = self.roles.find_role_by_id(user.role_id).await? else {
            return Ok(None);
        };
        let permissions = self.roles.permissions_for_role(role.id).await?;
        Ok(Some(RolePermissions::new(role, permissions)))
    }

    async fn resolve(&self, caller: Option<&CallerIdentity>) -> Resolution {
        let Some(caller) = caller else {
            return Resolution::Denied(Decision::Unauthorized(
                "authentication required".into(),
            ));
        };

        match self.permissions_for(caller.user_id).await {
            Ok(Some(granted)) => Resolution::Resolved(granted),
            Ok(None) => {
                warn!(user_id = %caller.user_id, "caller no longer resolves to a user with a role");
                Resolution::Denied(Decision::Unauthorized(
                    "authentication required".into(),
                ))
            }
            Err(err) => {
                error!(user_id = %caller.user_id, error = %err, "failed to load caller permissions");
                Resolution::Denied(Decision::InternalError(
                    "failed to load permissions".into(),
                ))
            }
        }
    }

    pub async fn require_permission(
        &self,
        caller: Option<&CallerIdentity>,
        module: &str,
        action: &str,
    ) -> Decision {
        let granted = match self.resolve(caller).await {
            Resolution::Resolved(granted) => granted,
            Resolution::Denied(decision) => return decision,
        };

        if granted.has_permission(module, action) {
            return Decision::Allow;
        }

        warn!(
            user_id = %granted_user(caller),
            role = %granted.role.code,
            module,
            action,
            "permission denied"
        );
        Decision::Forbidden(format!("permission '{module}:{action}' required"))
    }

    pub async fn require_role(
        &self,
        caller: Option<&CallerIdentity>,
        allowed_role_codes: &[&str],
    ) -> Decision {
        let granted = match self.resolve(caller).await {
            Resolution::Resolved(granted) => granted,
            Resolution::Denied(decision) => return decision,
        };

        if allowed_role_codes
            .iter()
            .any(|code| granted.has_role(code))
        {
            return Decision::Allow;
        }

        warn!(
            user_id = %granted_user(caller),
            role = %granted.role.code,
            allowed = ?allowed_role_codes,
            "role denied"
        );
        Decision::Forbidden(format!(
            "one of these roles required: {}",
            allowed_role_codes.join(", ")
        ))
    }
}

fn granted_user(caller: Option<&CallerIdentity>) -> Uuid {
    caller.map(|caller| caller.user_id).unwrap_or_default()
}
