//! Authentication services: token issuance, sessions, permission checks and
//! the account lifecycle built on top of them.

pub mod crypto;
pub mod lifecycle;
pub mod one_time_token;
pub mod permissions;
pub mod session_manager;
pub mod tokens;

pub use crypto::{AuthCrypto, AuthCryptoError};
pub use lifecycle::{
    AccountLifecycle, LifecyclePolicy, LoginOutcome, Registration,
};
pub use permissions::{CallerIdentity, Decision, PermissionEvaluator};
pub use session_manager::SessionManager;
pub use tokens::{AccessClaims, IssuedToken, RefreshClaims, TokenIssuer, TokenPair};
