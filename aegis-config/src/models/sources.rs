use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as defined in a TOML file.
///
/// Durations are humantime strings (`"15m"`, `"7days"`).
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub database: FileDatabaseConfig,
    #[serde(default)]
    pub auth: FileAuthConfig,
    #[serde(default)]
    pub cookies: FileCookieConfig,
    #[serde(default)]
    pub notifier: FileNotifierConfig,
    #[serde(default)]
    pub security: FileSecurityConfig,
    #[serde(default)]
    pub cors: FileCorsConfig,
    #[serde(default)]
    pub sessions: FileSessionConfig,
    pub dev_mode: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquire_timeout: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileAuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_pepper: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_time_token_ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argon2_memory_kib: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argon2_iterations: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCookieConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileNotifierConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileSecurityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_proxy_headers: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCorsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_methods: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_headers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_credentials: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileSessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purge_interval: Option<String>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub request_timeout: Option<String>,
    pub database_url: Option<String>,
    pub database_max_connections: Option<u32>,
    pub database_acquire_timeout: Option<String>,
    pub jwt_secret: Option<String>,
    pub password_pepper: Option<String>,
    pub token_key: Option<String>,
    pub access_token_ttl: Option<String>,
    pub refresh_token_ttl: Option<String>,
    pub one_time_token_ttl: Option<String>,
    pub argon2_memory_kib: Option<u32>,
    pub argon2_iterations: Option<u32>,
    pub cookie_secure: Option<bool>,
    pub cookie_same_site: Option<String>,
    pub site_url: Option<String>,
    pub notify_queue_capacity: Option<usize>,
    pub trust_proxy_headers: Option<bool>,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub cors_allowed_methods: Option<Vec<String>>,
    pub cors_allowed_headers: Option<Vec<String>>,
    pub cors_allow_credentials: Option<bool>,
    pub session_purge_interval: Option<String>,
    pub dev_mode: Option<bool>,
}

impl EnvConfig {
    /// Read every recognised variable from the process environment.
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());

        Self {
            config_path: var("AEGIS_CONFIG_PATH").map(PathBuf::from),
            server_host: var("AEGIS_SERVER_HOST"),
            server_port: var("AEGIS_SERVER_PORT").and_then(|s| s.parse().ok()),
            request_timeout: var("AEGIS_REQUEST_TIMEOUT"),
            database_url: var("DATABASE_URL"),
            database_max_connections: var("AEGIS_DATABASE_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok()),
            database_acquire_timeout: var("AEGIS_DATABASE_ACQUIRE_TIMEOUT"),
            jwt_secret: lookup("AEGIS_JWT_SECRET"),
            password_pepper: var("AEGIS_PASSWORD_PEPPER"),
            token_key: var("AEGIS_TOKEN_KEY"),
            access_token_ttl: var("AEGIS_ACCESS_TOKEN_TTL"),
            refresh_token_ttl: var("AEGIS_REFRESH_TOKEN_TTL"),
            one_time_token_ttl: var("AEGIS_ONE_TIME_TOKEN_TTL"),
            argon2_memory_kib: var("AEGIS_ARGON2_MEMORY_KIB")
                .and_then(|s| s.parse().ok()),
            argon2_iterations: var("AEGIS_ARGON2_ITERATIONS")
                .and_then(|s| s.parse().ok()),
            cookie_secure: parse_bool_var(var("AEGIS_COOKIE_SECURE")),
            cookie_same_site: var("AEGIS_COOKIE_SAME_SITE"),
            site_url: var("AEGIS_SITE_URL"),
            notify_queue_capacity: var("AEGIS_NOTIFY_QUEUE_CAPACITY")
                .and_then(|s| s.parse().ok()),
            trust_proxy_headers: parse_bool_var(var("AEGIS_TRUST_PROXY_HEADERS")),
            cors_allowed_origins: parse_csv_var(var("AEGIS_CORS_ALLOWED_ORIGINS")),
            cors_allowed_methods: parse_csv_var(var("AEGIS_CORS_ALLOWED_METHODS")),
            cors_allowed_headers: parse_csv_var(var("AEGIS_CORS_ALLOWED_HEADERS")),
            cors_allow_credentials: parse_bool_var(var(
                "AEGIS_CORS_ALLOW_CREDENTIALS",
            )),
            session_purge_interval: var("AEGIS_SESSION_PURGE_INTERVAL"),
            dev_mode: parse_bool_var(var("AEGIS_DEV_MODE")),
        }
    }
}

fn parse_csv_var(raw: Option<String>) -> Option<Vec<String>> {
    raw.map(|raw| {
        raw.split(',')
            .filter_map(|part| {
                let trimmed = part.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect::<Vec<_>>()
    })
    .filter(|values| !values.is_empty())
}

fn parse_bool_var(raw: Option<String>) -> Option<bool> {
    raw.and_then(|value| match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> EnvConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn reads_recognised_variables() {
        let config = env(&[
            ("AEGIS_SERVER_PORT", "8080"),
            ("AEGIS_JWT_SECRET", "s3cret"),
            ("AEGIS_COOKIE_SECURE", "yes"),
            ("AEGIS_CORS_ALLOWED_ORIGINS", "https://a.example, ,https://b.example"),
            ("DATABASE_URL", "postgres://localhost/aegis"),
        ]);
        assert_eq!(config.server_port, Some(8080));
        assert_eq!(config.jwt_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.cookie_secure, Some(true));
        assert_eq!(
            config.cors_allowed_origins,
            Some(vec!["https://a.example".into(), "https://b.example".into()])
        );
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/aegis")
        );
    }

    #[test]
    fn unparseable_values_are_ignored() {
        let config = env(&[
            ("AEGIS_SERVER_PORT", "eighty"),
            ("AEGIS_TRUST_PROXY_HEADERS", "maybe"),
            ("AEGIS_CORS_ALLOWED_METHODS", " , "),
        ]);
        assert_eq!(config.server_port, None);
        assert_eq!(config.trust_proxy_headers, None);
        assert_eq!(config.cors_allowed_methods, None);
    }

    #[test]
    fn empty_jwt_secret_is_kept_for_validation() {
        let config = env(&[("AEGIS_JWT_SECRET", "")]);
        assert_eq!(config.jwt_secret.as_deref(), Some(""));
    }
}
