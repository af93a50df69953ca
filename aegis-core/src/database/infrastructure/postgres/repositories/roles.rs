use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::ports::roles::RolesRepository;
use crate::domain::users::rbac::{Permission, Role};
use crate::error::{AuthError, Result};

#[derive(Clone, Debug)]
pub struct PostgresRolesRepository {
    pool: PgPool,
}

impl PostgresRolesRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RolesRepository for PostgresRolesRepository {
    async fn find_role_by_id(&self, id: Uuid) -> Result<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, code, name, description, level, can_self_register, created_at
            FROM roles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            AuthError::infrastructure(format!("Failed to get role: {}", e))
        })?;
        Ok(row.map(Role::from))
    }

    async fn find_role_by_code(&self, code: &str) -> Result<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, code, name, description, level, can_self_register, created_at
            FROM roles
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            AuthError::infrastructure(format!(
                "Failed to get role by code: {}",
                e
            ))
        })?;
        Ok(row.map(Role::from))
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, code, name, description, level, can_self_register, created_at
            FROM roles
            ORDER BY level DESC, code
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            AuthError::infrastructure(format!("Failed to list roles: {}", e))
        })?;
        Ok(rows.into_iter().map(Role::from).collect())
    }

    async fn permissions_for_role(
        &self,
        role_id: Uuid,
    ) -> Result<Vec<Permission>> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT p.id, p.module, p.action
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = $1
            ORDER BY p.module, p.action
            "#,
        )
        .bind(role_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            AuthError::infrastructure(format!(
                "Failed to get role permissions: {}",
                e
            ))
        })?;
        Ok(rows.into_iter().map(Permission::from).collect())
    }

    async fn upsert_role(&self, role: &Role) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO roles (id, code, name, description, level, can_self_register, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET code = EXCLUDED.code,
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                level = EXCLUDED.level,
                can_self_register = EXCLUDED.can_self_register
            "#,
        )
        .bind(role.id)
        .bind(&role.code)
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.level)
        .bind(role.can_self_register)
        .bind(role.created_at)
        .execute(self.pool())
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error()
                && db_err.constraint() == Some("roles_code_key")
            {
                return AuthError::conflict(format!(
                    "role code {} already exists",
                    role.code
                ));
            }
            AuthError::infrastructure(format!("Failed to upsert role: {}", e))
        })?;
        Ok(())
    }

    async fn upsert_permission(&self, permission: &Permission) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO permissions (id, module, action)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET module = EXCLUDED.module,
                action = EXCLUDED.action
            "#,
        )
        .bind(permission.id)
        .bind(&permission.module)
        .bind(&permission.action)
        .execute(self.pool())
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error()
                && db_err.constraint() == Some("permissions_module_action_key")
            {
                return AuthError::conflict(format!(
                    "permission {} already exists",
                    permission
                ));
            }
            AuthError::infrastructure(format!(
                "Failed to upsert permission: {}",
                e
            ))
        })?;
        Ok(())
    }

    async fn grant_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id)
            VALUES ($1, $2)
            ON CONFLICT (role_id, permission_id) DO NOTHING
            "#,
        )
        .bind(role_id)
        .bind(permission_id)
        .execute(self.pool())
        .await
        .map_err(|e| {
            AuthError::infrastructure(format!(
                "Failed to grant permission: {}",
                e
            ))
        })?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: Uuid,
    code: String,
    name: String,
    description: Option<String>,
    level: i32,
    can_self_register: bool,
    created_at: DateTime<Utc>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Role {
            id: row.id,
            code: row.code,
            name: row.name,
            description: row.description,
            level: row.level,
            can_self_register: row.can_self_register,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PermissionRow {
    id: Uuid,
    module: String,
    action: String,
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        Permission {
            id: row.id,
            module: row.module,
            action: row.action,
        }
    }
}
