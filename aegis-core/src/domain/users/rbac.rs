//! Role-Based Access Control (RBAC) model
//!
//! Every user holds exactly one role. A role grants a set of permissions,
//! each identified by a `(module, action)` pair such as `("user", "read")`.
//! Roles and permissions are seeded once at startup and are read-only to the
//! account services.
//!
//! ## Example
//!
//! ```
//! use aegis_core::domain::users::rbac::{Permission, RolePermissions, Role, roles};
//! use chrono::Utc;
//! use uuid::Uuid;
//!
//! let role = Role {
//!     id: Uuid::now_v7(),
//!     code: roles::PATIENT.to_string(),
//!     name: "Patient".to_string(),
//!     description: None,
//!     level: 10,
//!     can_self_register: true,
//!     created_at: Utc::now(),
//! };
//! let granted = RolePermissions::new(role, vec![Permission::new("profile", "read")]);
//! assert!(granted.has_permission("profile", "read"));
//! assert!(!granted.has_permission("user", "delete"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A role users can be assigned to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Unique identifier
    pub id: Uuid,
    /// Stable machine code (e.g. "owner", "patient")
    pub code: String,
    /// Display name
    pub name: String,
    /// Human-readable description
    pub description: Option<String>,
    /// Rank; higher levels carry more authority
    pub level: i32,
    /// Whether anonymous callers may register with this role
    pub can_self_register: bool,
    /// When the role was created
    pub created_at: DateTime<Utc>,
}

/// A granular `(module, action)` permission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub module: String,
    pub action: String,
}

impl Permission {
    pub fn new(module: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            module: module.into(),
            action: action.into(),
        }
    }

    pub fn matches(&self, module: &str, action: &str) -> bool {
        self.module == module && self.action == action
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.action)
    }
}

/// A role together with the permissions it grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePermissions {
    pub role: Role,
    pub permissions: Vec<Permission>,
}

impl RolePermissions {
    pub fn new(role: Role, permissions: Vec<Permission>) -> Self {
        Self { role, permissions }
    }

    pub fn has_permission(&self, module: &str, action: &str) -> bool {
        self.permissions.iter().any(|p| p.matches(module, action))
    }

    pub fn has_any_permission(&self, wanted: &[(&str, &str)]) -> bool {
        wanted
            .iter()
            .any(|(module, action)| self.has_permission(module, action))
    }

    pub fn has_role(&self, code: &str) -> bool {
        self.role.code == code
    }

    /// Permission keys in `module:action` form, sorted for stable output.
    pub fn permission_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> =
            self.permissions.iter().map(ToString::to_string).collect();
        keys.sort();
        keys
    }
}

/// Seeded role codes
pub mod roles {
    pub const OWNER: &str = "owner";
    pub const ADMIN: &str = "admin";
    pub const DOCTOR: &str = "doctor";
    pub const STAFF: &str = "staff";
    pub const PATIENT: &str = "patient";
}

/// Seeded permission pairs
pub mod permissions {
    pub const USER_READ: (&str, &str) = ("user", "read");
    pub const USER_CREATE: (&str, &str) = ("user", "create");
    pub const USER_UPDATE: (&str, &str) = ("user", "update");
    pub const USER_DELETE: (&str, &str) = ("user", "delete");
    pub const ROLE_READ: (&str, &str) = ("role", "read");
    pub const ROLE_MANAGE: (&str, &str) = ("role", "manage");
    pub const PROFILE_READ: (&str, &str) = ("profile", "read");
    pub const PROFILE_UPDATE: (&str, &str) = ("profile", "update");
}
