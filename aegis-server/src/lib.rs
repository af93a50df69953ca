//! # Aegis Server
//!
//! HTTP front end for the account services in `aegis-core`.
//!
//! Public endpoints cover registration, email verification, login, refresh
//! rotation and password reset. Everything else sits behind the bearer
//! token gate, and some routes additionally behind a role or permission
//! gate. The refresh token only ever travels in an `HttpOnly` cookie.

pub mod app;
pub mod infra;
pub mod routes;
pub mod users;

pub use app::create_app;
pub use infra::app_state::AppState;
