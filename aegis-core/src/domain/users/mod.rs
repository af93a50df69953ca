pub mod auth;
pub mod rbac;
pub mod session;
pub mod user;

pub use rbac::{Permission, Role, RolePermissions};
pub use session::Session;
pub use user::{OneTimeToken, TokenPurpose, User, UserProfile};
