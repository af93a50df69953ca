pub mod repositories;

use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

use crate::error::{AuthError, Result};

pub use repositories::{
    PostgresRolesRepository, PostgresSessionsRepository,
    PostgresUsersRepository,
};

/// Owns the connection pool shared by the Postgres repositories.
#[derive(Clone, Debug)]
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| {
                AuthError::infrastructure(format!(
                    "Failed to connect to PostgreSQL: {}",
                    e
                ))
            })?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations from [`crate::MIGRATOR`].
    pub async fn initialize_schema(&self) -> Result<()> {
        crate::MIGRATOR.run(&self.pool).await.map_err(|e| {
            AuthError::infrastructure(format!("Failed to run migrations: {}", e))
        })?;
        info!("database migrations applied");
        Ok(())
    }
}
