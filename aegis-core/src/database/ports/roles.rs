use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::users::rbac::{Permission, Role};
use crate::error::Result;

#[async_trait]
pub trait RolesRepository: Send + Sync {
    async fn find_role_by_id(&self, id: Uuid) -> Result<Option<Role>>;
    async fn find_role_by_code(&self, code: &str) -> Result<Option<Role>>;
    async fn list_roles(&self) -> Result<Vec<Role>>;

    /// Permissions granted to the role; empty when the role has none or
    /// does not exist.
    async fn permissions_for_role(
        &self,
        role_id: Uuid,
    ) -> Result<Vec<Permission>>;

    async fn upsert_role(&self, role: &Role) -> Result<()>;
    async fn upsert_permission(&self, permission: &Permission) -> Result<()>;
    async fn grant_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<()>;
}
