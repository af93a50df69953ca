use std::time::Duration;

/// Placeholder pepper used when none is configured. Only acceptable for
/// local development.
pub const DEFAULT_PASSWORD_PEPPER: &str = "aegis-dev-password-pepper-change-me";

/// Placeholder HMAC key for token digests.
pub const DEFAULT_TOKEN_KEY: &str = "aegis-dev-token-key-change-me";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3002;
pub const DEFAULT_SITE_URL: &str = "http://localhost:3002";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_DB_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_REFRESH_TOKEN_TTL: Duration =
    Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_ONE_TIME_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Argon2id cost defaults: 64 MiB and three passes.
pub const DEFAULT_ARGON2_MEMORY_KIB: u32 = 64 * 1024;
pub const DEFAULT_ARGON2_ITERATIONS: u32 = 3;

pub const DEFAULT_SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_NOTIFY_QUEUE_CAPACITY: usize = 256;

/// Name of the refresh-token cookie set on login and refresh.
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";
