use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::database::ports::sessions::SessionsRepository;
use crate::domain::users::session::Session;
use crate::error::{AuthError, Result};

#[derive(Clone, Debug)]
pub struct PostgresSessionsRepository {
    pool: PgPool,
}

impl PostgresSessionsRepository {
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

    async fn commit(tx: Transaction<'_, Postgres>) -> Result<()> {
        tx.commit().await.map_err(|e| {
            AuthError::infrastructure(format!(
                "Failed to commit transaction: {}",
                e
            ))
        })
    }

    /// Serialises session writes per user. Fails with `NotFound` when the
    /// user row is gone.
    async fn lock_owner(conn: &mut PgConnection, user_id: Uuid) -> Result<()> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            AuthError::infrastructure(format!(
                "Failed to lock session owner: {}",
                e
            ))
        })?
        .ok_or_else(|| AuthError::not_found("user not found"))?;
        Ok(())
    }

    async fn insert_with(conn: &mut PgConnection, session: &Session) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, user_id, refresh_token_hash, client_ip, expires_at,
                is_blocked, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.refresh_token_hash)
        .bind(&session.client_ip)
        .bind(session.expires_at)
        .bind(session.is_blocked)
        .bind(session.created_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                match db_err.constraint() {
                    Some("sessions_refresh_token_hash_key") => {
                        return AuthError::conflict(
                            "refresh token already in use",
                        );
                    }
                    Some("sessions_user_id_fkey") => {
                        return AuthError::not_found("user not found");
                    }
                    _ => {}
                }
            }
            AuthError::infrastructure(format!(
                "Failed to create session: {}",
                e
            ))
        })?;
        Ok(())
    }
}

#[async_trait]
impl SessionsRepository for PostgresSessionsRepository {
    async fn insert_session(&self, session: &Session) -> Result<()> {
        let mut conn = self.pool().acquire().await.map_err(|e| {
            AuthError::infrastructure(format!(
                "Failed to acquire connection: {}",
                e
            ))
        })?;
        Self::insert_with(&mut conn, session).await
    }

    async fn replace_user_sessions_atomic(&self, session: &Session) -> Result<u64> {
        let mut tx = self.begin().await?;
        Self::lock_owner(&mut tx, session.user_id).await?;

        let replaced = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(session.user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AuthError::infrastructure(format!(
                    "Failed to delete user sessions: {}",
                    e
                ))
            })?
            .rows_affected();

        Self::insert_with(&mut tx, session).await?;
        Self::commit(tx).await?;
        Ok(replaced)
    }

    async fn rotate_session_atomic(
        &self,
        old_token_hash: &str,
        session: &Session,
    ) -> Result<()> {
        let mut tx = self.begin().await?;
        Self::lock_owner(&mut tx, session.user_id).await?;

        let removed = sqlx::query(
            "DELETE FROM sessions WHERE refresh_token_hash = $1 AND user_id = $2",
        )
        .bind(old_token_hash)
        .bind(session.user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AuthError::infrastructure(format!(
                "Failed to delete session: {}",
                e
            ))
        })?
        .rows_affected();
        if removed == 0 {
            // Dropping the transaction rolls it back.
            return Err(AuthError::not_found("session not found"));
        }

        Self::insert_with(&mut tx, session).await?;
        Self::commit(tx).await
    }

    async fn find_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, refresh_token_hash, client_ip, expires_at,
                   is_blocked, created_at
            FROM sessions
            WHERE refresh_token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            AuthError::infrastructure(format!("Failed to get session: {}", e))
        })?;
        Ok(row.map(Session::from))
    }

    async fn find_latest_session_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, refresh_token_hash, client_ip, expires_at,
                   is_blocked, created_at
            FROM sessions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            AuthError::infrastructure(format!(
                "Failed to get user session: {}",
                e
            ))
        })?;
        Ok(row.map(Session::from))
    }

    async fn delete_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM sessions WHERE refresh_token_hash = $1")
                .bind(token_hash)
                .execute(self.pool())
                .await
                .map_err(|e| {
                    AuthError::infrastructure(format!(
                        "Failed to delete session: {}",
                        e
                    ))
                })?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(self.pool())
            .await
            .map_err(|e| {
                AuthError::infrastructure(format!(
                    "Failed to delete user sessions: {}",
                    e
                ))
            })?;
        Ok(result.rows_affected())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < $1")
            .bind(now)
            .execute(self.pool())
            .await
            .map_err(|e| {
                AuthError::infrastructure(format!(
                    "Failed to purge sessions: {}",
                    e
                ))
            })?;
        debug!(removed = result.rows_affected(), "purged expired sessions");
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    refresh_token_hash: String,
    client_ip: String,
    expires_at: DateTime<Utc>,
    is_blocked: bool,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            user_id: row.user_id,
            refresh_token_hash: row.refresh_token_hash,
            client_ip: row.client_ip,
            expires_at: row.expires_at,
            is_blocked: row.is_blocked,
            created_at: row.created_at,
        }
    }
}
