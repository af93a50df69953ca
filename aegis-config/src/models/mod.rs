pub mod sources;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::constants::{DEFAULT_PASSWORD_PEPPER, DEFAULT_TOKEN_KEY};

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub cookies: CookieConfig,
    pub notifier: NotifierConfig,
    pub security: SecurityConfig,
    pub cors: CorsConfig,
    pub sessions: SessionConfig,
    pub dev_mode: bool,
    pub metadata: ConfigMetadata,
}

impl Config {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Without a URL the service runs against the in-process store.
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub password_pepper: String,
    pub token_key: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub one_time_token_ttl: Duration,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
}

impl AuthConfig {
    pub fn is_default_pepper(&self) -> bool {
        self.password_pepper == DEFAULT_PASSWORD_PEPPER
    }

    pub fn is_default_token_key(&self) -> bool {
        self.token_key == DEFAULT_TOKEN_KEY
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("password_pepper", &"<redacted>")
            .field("token_key", &"<redacted>")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("one_time_token_ttl", &self.one_time_token_ttl)
            .field("argon2_memory_kib", &self.argon2_memory_kib)
            .field("argon2_iterations", &self.argon2_iterations)
            .finish()
    }
}

/// `SameSite` attribute of the refresh-token cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

impl FromStr for SameSite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            other => Err(format!("unknown SameSite value `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub secure: bool,
    pub same_site: SameSite,
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Public base URL used to build verification and reset links.
    pub site_url: Url,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Honour `X-Forwarded-For` when deriving the client address.
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
}

impl CorsConfig {
    pub fn is_wildcard_included(&self) -> bool {
        self.allowed_origins
            .iter()
            .any(|origin| origin.trim() == "*")
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often expired sessions are swept from the store.
    pub purge_interval: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
