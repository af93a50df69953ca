pub mod cookies;
pub mod handlers;
pub mod middleware;
pub mod permission_middleware;

pub use middleware::{GatewayOutcome, Rejection, auth_middleware, authenticate};
pub use permission_middleware::{require_permission, require_role};
