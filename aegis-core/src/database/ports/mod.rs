//! Repository ports consumed by the account services. Adapters live under
//! [`crate::database::infrastructure`].

pub mod roles;
pub mod sessions;
pub mod users;
