/// Accounts, roles, sessions and the services that operate on them
pub mod users;
