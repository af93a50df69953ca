//! # Aegis Core
//!
//! Account lifecycle, token issuance, refresh-token sessions and role-based
//! access control for the Aegis service.
//!
//! ## Overview
//!
//! - **Tokens**: HS256 access and refresh JWTs with typed claims
//!   ([`domain::users::auth::TokenIssuer`])
//! - **Sessions**: single-use refresh rotation over a session store
//!   ([`domain::users::auth::SessionManager`])
//! - **RBAC**: roles carry `(module, action)` permissions, re-read on every
//!   check ([`domain::users::auth::PermissionEvaluator`])
//! - **Accounts**: registration, verification, login, logout, refresh and
//!   password recovery ([`domain::users::auth::AccountLifecycle`])
//! - **Persistence**: repository ports with PostgreSQL and in-memory
//!   adapters ([`database`])
//! - **Notifications**: a bounded dispatcher in front of a [`notify::Notifier`]
//!
//! ## Feature Flags
//!
//! - `database`: PostgreSQL adapters and the embedded migrations (default)

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod api_types;
pub mod application;
pub mod database;
pub mod domain;
pub mod error;
pub mod notify;
pub mod time;

pub use application::{AuthUnitOfWork, RbacBootstrapService};
pub use error::{AuthError, ErrorKind, Result};

/// Embedded schema migrations.
#[cfg(feature = "database")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
