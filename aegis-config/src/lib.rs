//! Configuration for the Aegis auth service.
//!
//! Settings come from an optional TOML file and the process environment
//! (optionally seeded from a `.env` file); environment values win. The
//! loader resolves defaults, parses human-readable durations and runs the
//! guard rails in [`validation`] before handing back a [`Config`].

pub mod constants;
pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoader, ConfigLoaderOptions, error::ConfigLoadError};
pub use models::sources::{EnvConfig, FileConfig};
pub use models::{
    AuthConfig, Config, ConfigMetadata, CookieConfig, CorsConfig,
    DatabaseConfig, NotifierConfig, SameSite, SecurityConfig, ServerConfig,
    SessionConfig,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
