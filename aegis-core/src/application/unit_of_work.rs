use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;

use crate::database::infrastructure::memory::InMemoryAuthStore;
#[cfg(feature = "database")]
use crate::database::infrastructure::postgres::{
    PostgresDatabase, PostgresRolesRepository, PostgresSessionsRepository,
    PostgresUsersRepository,
};
use crate::database::ports::{
    roles::RolesRepository, sessions::SessionsRepository,
    users::UsersRepository,
};

/// Aggregates the repository ports used by the account services.
#[derive(Clone)]
pub struct AuthUnitOfWork {
    pub users: Arc<dyn UsersRepository>,
    pub roles: Arc<dyn RolesRepository>,
    pub sessions: Arc<dyn SessionsRepository>,
}

impl fmt::Debug for AuthUnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthUnitOfWork")
            .field("users", &type_name_of_val(self.users.as_ref()))
            .field("roles", &type_name_of_val(self.roles.as_ref()))
            .field("sessions", &type_name_of_val(self.sessions.as_ref()))
            .finish()
    }
}

impl AuthUnitOfWork {
    pub fn new(
        users: Arc<dyn UsersRepository>,
        roles: Arc<dyn RolesRepository>,
        sessions: Arc<dyn SessionsRepository>,
    ) -> Self {
        Self {
            users,
            roles,
            sessions,
        }
    }

    #[cfg(feature = "database")]
    pub fn from_postgres(db: &PostgresDatabase) -> Self {
        let pool = db.pool().clone();
        Self {
            users: Arc::new(PostgresUsersRepository::new(pool.clone())),
            roles: Arc::new(PostgresRolesRepository::new(pool.clone())),
            sessions: Arc::new(PostgresSessionsRepository::new(pool)),
        }
    }

    /// Every port backed by the same in-memory store.
    pub fn in_memory(store: Arc<InMemoryAuthStore>) -> Self {
        Self {
            users: store.clone(),
            roles: store.clone(),
            sessions: store,
        }
    }
}
