use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::database::ports::users::UsersRepository;
use crate::domain::users::user::{OneTimeToken, TokenPurpose, User};
use crate::error::{AuthError, Result};

const USER_COLUMNS: &str = r#"
    id, name, email, phone_number, password_hash, role_id, is_verified,
    token_hash, token_purpose, token_expires_at, created_at, updated_at
"#;

/// PostgreSQL-backed implementation of the `UsersRepository` port.
#[derive(Clone, Debug)]
pub struct PostgresUsersRepository {
    pool: PgPool,
}

impl PostgresUsersRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> Result<Transaction<'_, Postgres>> {
        self.pool().begin().await.map_err(|e| {
            AuthError::infrastructure(format!(
                "Failed to start transaction: {}",
                e
            ))
        })
    }

    async fn lock_by_token_hash(
        tx: &mut Transaction<'_, Postgres>,
        token_hash: &str,
    ) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE token_hash = $1 FOR UPDATE"
        ))
        .bind(token_hash)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| {
            AuthError::infrastructure(format!(
                "Failed to lock user by token: {}",
                e
            ))
        })?;
        row.map(User::try_from).transpose()
    }

    async fn write_back(
        tx: &mut Transaction<'_, Postgres>,
        user: &User,
    ) -> Result<()> {
        let (token_hash, token_purpose, token_expires_at) = token_columns(user);
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, is_verified = $3,
                token_hash = $4, token_purpose = $5, token_expires_at = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.password_hash)
        .bind(user.is_verified)
        .bind(token_hash)
        .bind(token_purpose)
        .bind(token_expires_at)
        .bind(user.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            AuthError::infrastructure(format!("Failed to update user: {}", e))
        })?;
        Ok(())
    }

    async fn commit(tx: Transaction<'_, Postgres>) -> Result<()> {
        tx.commit().await.map_err(|e| {
            AuthError::infrastructure(format!(
                "Failed to commit transaction: {}",
                e
            ))
        })
    }
}

fn token_columns(
    user: &User,
) -> (Option<&str>, Option<&'static str>, Option<DateTime<Utc>>) {
    match &user.one_time_token {
        Some(token) => (
            Some(token.token_hash.as_str()),
            Some(token.purpose.as_str()),
            Some(token.expires_at),
        ),
        None => (None, None, None),
    }
}

fn map_insert_error(e: sqlx::Error) -> AuthError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.constraint() == Some("users_email_key") {
            return AuthError::conflict("user email already exists");
        }
        if db_err.constraint() == Some("idx_users_single_owner") {
            return AuthError::conflict("owner already exists");
        }
        if db_err.constraint() == Some("users_role_id_fkey") {
            return AuthError::not_found("role not found");
        }
    }
    AuthError::infrastructure(format!("Failed to create user: {}", e))
}

#[async_trait]
impl UsersRepository for PostgresUsersRepository {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            AuthError::infrastructure(format!("Failed to get user by id: {}", e))
        })?;
        row.map(User::try_from).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            AuthError::infrastructure(format!(
                "Failed to get user by email: {}",
                e
            ))
        })?;
        row.map(User::try_from).transpose()
    }

    async fn find_user_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            AuthError::infrastructure(format!(
                "Failed to get user by token: {}",
                e
            ))
        })?;
        row.map(User::try_from).transpose()
    }

    async fn role_holder_exists(&self, role_code: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users u
                JOIN roles r ON r.id = u.role_id
                WHERE r.code = $1
            )
            "#,
        )
        .bind(role_code)
        .fetch_one(self.pool())
        .await
        .map_err(|e| {
            AuthError::infrastructure(format!(
                "Failed to check role holders: {}",
                e
            ))
        })
    }

    async fn create_user_atomic(
        &self,
        user: &User,
        exclusive_role: Option<&str>,
    ) -> Result<()> {
        let mut tx = self.begin().await?;

        let email_taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)",
        )
        .bind(&user.email)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AuthError::infrastructure(format!("Failed to check email: {}", e))
        })?;
        if email_taken {
            return Err(AuthError::conflict("user email already exists"));
        }

        if let Some(code) = exclusive_role {
            let held = sqlx::query_scalar::<_, bool>(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM users u
                    JOIN roles r ON r.id = u.role_id
                    WHERE r.code = $1
                )
                "#,
            )
            .bind(code)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AuthError::infrastructure(format!(
                    "Failed to check role holders: {}",
                    e
                ))
            })?;
            if held {
                return Err(AuthError::conflict(format!("{code} already exists")));
            }
        }

        let (token_hash, token_purpose, token_expires_at) = token_columns(user);
        sqlx::query(
            r#"
            INSERT INTO users (
                id, name, email, phone_number, password_hash, role_id,
                is_verified, token_hash, token_purpose, token_expires_at,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone_number)
        .bind(&user.password_hash)
        .bind(user.role_id)
        .bind(user.is_verified)
        .bind(token_hash)
        .bind(token_purpose)
        .bind(token_expires_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        Self::commit(tx).await?;

        info!(user_id = %user.id, "created user");
        Ok(())
    }

    async fn store_one_time_token(
        &self,
        user_id: Uuid,
        token: &OneTimeToken,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET token_hash = $2, token_purpose = $3, token_expires_at = $4,
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(&token.token_hash)
        .bind(token.purpose.as_str())
        .bind(token.expires_at)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(|e| {
            AuthError::infrastructure(format!("Failed to store token: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AuthError::not_found("user not found"));
        }
        Ok(())
    }

    async fn verify_user_atomic(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let mut tx = self.begin().await?;
        let mut user = Self::lock_by_token_hash(&mut tx, token_hash)
            .await?
            .ok_or_else(|| AuthError::not_found("verification token not found"))?;

        user.confirm_verification(now)?;
        Self::write_back(&mut tx, &user).await?;
        Self::commit(tx).await?;
        Ok(user)
    }

    async fn reset_password_atomic(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let mut tx = self.begin().await?;
        let mut user = Self::lock_by_token_hash(&mut tx, token_hash)
            .await?
            .ok_or_else(|| AuthError::not_found("reset token not found"))?;

        user.apply_password_reset(password_hash.to_string(), now)?;
        Self::write_back(&mut tx, &user).await?;
        Self::commit(tx).await?;
        Ok(user)
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    phone_number: String,
    password_hash: String,
    role_id: Uuid,
    is_verified: bool,
    token_hash: Option<String>,
    token_purpose: Option<String>,
    token_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AuthError;

    fn try_from(row: UserRow) -> Result<Self> {
        let one_time_token =
            match (row.token_hash, row.token_purpose, row.token_expires_at) {
                (Some(token_hash), Some(purpose), Some(expires_at)) => {
                    Some(OneTimeToken {
                        token_hash,
                        purpose: purpose.parse::<TokenPurpose>()?,
                        expires_at,
                    })
                }
                _ => None,
            };

        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            phone_number: row.phone_number,
            password_hash: row.password_hash,
            role_id: row.role_id,
            is_verified: row.is_verified,
            one_time_token,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
