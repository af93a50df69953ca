pub mod roles;
pub mod sessions;
pub mod users;

pub use roles::PostgresRolesRepository;
pub use sessions::PostgresSessionsRepository;
pub use users::PostgresUsersRepository;
