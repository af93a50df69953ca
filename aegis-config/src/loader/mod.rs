pub mod error;

use once_cell::sync::Lazy;
use std::{fs, path::PathBuf, time::Duration};
use url::Url;

use crate::constants::{
    DEFAULT_ACCESS_TOKEN_TTL, DEFAULT_ARGON2_ITERATIONS,
    DEFAULT_ARGON2_MEMORY_KIB, DEFAULT_DB_ACQUIRE_TIMEOUT,
    DEFAULT_DB_MAX_CONNECTIONS, DEFAULT_HOST, DEFAULT_NOTIFY_QUEUE_CAPACITY,
    DEFAULT_ONE_TIME_TOKEN_TTL, DEFAULT_PASSWORD_PEPPER, DEFAULT_PORT,
    DEFAULT_REFRESH_TOKEN_TTL, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_SESSION_PURGE_INTERVAL, DEFAULT_SITE_URL, DEFAULT_TOKEN_KEY,
};
use crate::models::{
    AuthConfig, Config, ConfigMetadata, CookieConfig, CorsConfig,
    DatabaseConfig, NotifierConfig, SameSite, SecurityConfig, ServerConfig,
    SessionConfig,
    sources::{EnvConfig, FileConfig},
};
use crate::validation::{self, ConfigWarnings};
use error::ConfigLoadError;

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![PathBuf::from("aegis.toml"), PathBuf::from("config/aegis.toml")]
});

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

/// A resolved configuration together with non-fatal findings.
#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Load `.env`, read the process environment and the config file, then
    /// compose and validate.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        self.load_with_env(EnvConfig::gather(), env_file_loaded)
    }

    /// Same as [`ConfigLoader::load`] but with an already gathered
    /// environment; `.env` handling is skipped.
    pub fn load_with_env(
        &self,
        env_config: EnvConfig,
        env_file_loaded: bool,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env_config)?;

        let (config, warnings) = compose_config(
            file_config,
            env_config,
            config_path,
            env_file_loaded,
        )?;

        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let mut source = ConfigPathSource::default();

        if let Some(explicit) = &self.options.config_path {
            source.explicit = Some(explicit.clone());
        } else if let Some(from_env) = &env_config.config_path {
            source.env = Some(from_env.clone());
        }

        if source.is_empty() {
            source.default = DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
                .cloned();
        }

        let Some((path, provenance)) = source.resolved_path() else {
            return Ok((None, None));
        };

        if !path.exists() {
            if provenance.is_explicit() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents =
            fs::read_to_string(&path).map_err(|err| ConfigLoadError::Io {
                path: path.clone(),
                source: err,
            })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
                path: path.clone(),
                source: err,
            })?;

        Ok((Some(file_config), Some(path)))
    }
}

fn compose_config(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    config_path: Option<PathBuf>,
    env_file_loaded: bool,
) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    if config_path.is_none() {
        warnings.push_with_hint(
            "No aegis.toml detected; using environment variables and defaults",
            "Pass --config or set AEGIS_CONFIG_PATH to load a configuration file",
        );
    }

    let FileConfig {
        server: file_server,
        database: file_database,
        auth: file_auth,
        cookies: file_cookies,
        notifier: file_notifier,
        security: file_security,
        cors: file_cors,
        sessions: file_sessions,
        dev_mode: file_dev_mode,
    } = file_config.unwrap_or_default();

    let server = ServerConfig {
        host: env
            .server_host
            .or(file_server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: env.server_port.or(file_server.port).unwrap_or(DEFAULT_PORT),
        request_timeout: resolve_duration(
            "server.request_timeout",
            env.request_timeout.or(file_server.request_timeout),
            DEFAULT_REQUEST_TIMEOUT,
        )?,
    };

    let database = DatabaseConfig {
        url: env
            .database_url
            .or(file_database.url)
            .filter(|value| !value.trim().is_empty()),
        max_connections: env
            .database_max_connections
            .or(file_database.max_connections)
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
        acquire_timeout: resolve_duration(
            "database.acquire_timeout",
            env.database_acquire_timeout.or(file_database.acquire_timeout),
            DEFAULT_DB_ACQUIRE_TIMEOUT,
        )?,
    };

    let auth = AuthConfig {
        jwt_secret: env.jwt_secret.or(file_auth.jwt_secret).unwrap_or_default(),
        password_pepper: env
            .password_pepper
            .or(file_auth.password_pepper)
            .unwrap_or_else(|| DEFAULT_PASSWORD_PEPPER.to_string()),
        token_key: env
            .token_key
            .or(file_auth.token_key)
            .unwrap_or_else(|| DEFAULT_TOKEN_KEY.to_string()),
        access_token_ttl: resolve_duration(
            "auth.access_token_ttl",
            env.access_token_ttl.or(file_auth.access_token_ttl),
            DEFAULT_ACCESS_TOKEN_TTL,
        )?,
        refresh_token_ttl: resolve_duration(
            "auth.refresh_token_ttl",
            env.refresh_token_ttl.or(file_auth.refresh_token_ttl),
            DEFAULT_REFRESH_TOKEN_TTL,
        )?,
        one_time_token_ttl: resolve_duration(
            "auth.one_time_token_ttl",
            env.one_time_token_ttl.or(file_auth.one_time_token_ttl),
            DEFAULT_ONE_TIME_TOKEN_TTL,
        )?,
        argon2_memory_kib: env
            .argon2_memory_kib
            .or(file_auth.argon2_memory_kib)
            .unwrap_or(DEFAULT_ARGON2_MEMORY_KIB),
        argon2_iterations: env
            .argon2_iterations
            .or(file_auth.argon2_iterations)
            .unwrap_or(DEFAULT_ARGON2_ITERATIONS),
    };

    let dev_mode = env.dev_mode.or(file_dev_mode).unwrap_or(false);

    let cookies = CookieConfig {
        secure: env
            .cookie_secure
            .or(file_cookies.secure)
            .unwrap_or(!dev_mode),
        same_site: match env.cookie_same_site.or(file_cookies.same_site) {
            Some(raw) => raw
                .parse::<SameSite>()
                .map_err(ConfigLoadError::InvalidSameSite)?,
            None => SameSite::default(),
        },
    };

    let site_url = env
        .site_url
        .or(file_notifier.site_url)
        .unwrap_or_else(|| DEFAULT_SITE_URL.to_string());
    let notifier = NotifierConfig {
        site_url: Url::parse(site_url.trim()).map_err(|source| {
            ConfigLoadError::InvalidSiteUrl {
                value: site_url.clone(),
                source,
            }
        })?,
        queue_capacity: env
            .notify_queue_capacity
            .or(file_notifier.queue_capacity)
            .unwrap_or(DEFAULT_NOTIFY_QUEUE_CAPACITY),
    };

    let security = SecurityConfig {
        trust_proxy_headers: env
            .trust_proxy_headers
            .or(file_security.trust_proxy_headers)
            .unwrap_or(false),
    };

    let cors = CorsConfig {
        allowed_origins: env
            .cors_allowed_origins
            .or(file_cors.allowed_origins)
            .unwrap_or_else(default_cors_origins),
        allowed_methods: env
            .cors_allowed_methods
            .or(file_cors.allowed_methods)
            .unwrap_or_else(default_cors_methods),
        allowed_headers: env
            .cors_allowed_headers
            .or(file_cors.allowed_headers)
            .unwrap_or_else(default_cors_headers),
        allow_credentials: env
            .cors_allow_credentials
            .or(file_cors.allow_credentials)
            .unwrap_or(true),
    };

    let sessions = SessionConfig {
        purge_interval: resolve_duration(
            "sessions.purge_interval",
            env.session_purge_interval.or(file_sessions.purge_interval),
            DEFAULT_SESSION_PURGE_INTERVAL,
        )?,
    };

    let config = Config {
        server,
        database,
        auth,
        cookies,
        notifier,
        security,
        cors,
        sessions,
        dev_mode,
        metadata: ConfigMetadata {
            config_path,
            env_file_loaded,
        },
    };

    let guard_warnings = validation::apply_guard_rails(&config)?;
    warnings.extend(guard_warnings);

    Ok((config, warnings))
}

fn resolve_duration(
    field: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    match raw {
        Some(value) => humantime::parse_duration(value.trim()).map_err(|source| {
            ConfigLoadError::InvalidDuration {
                field,
                value,
                source,
            }
        }),
        None => Ok(default),
    }
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:3002".to_string(),
    ]
}

fn default_cors_methods() -> Vec<String> {
    ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_cors_headers() -> Vec<String> {
    ["authorization", "content-type", "accept"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Default)]
struct ConfigPathSource {
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    default: Option<PathBuf>,
}

impl ConfigPathSource {
    fn is_empty(&self) -> bool {
        self.explicit.is_none() && self.env.is_none() && self.default.is_none()
    }

    fn resolved_path(&self) -> Option<(PathBuf, ConfigPathProvenance)> {
        if let Some(path) = &self.explicit {
            return Some((path.clone(), ConfigPathProvenance::Explicit));
        }
        if let Some(path) = &self.env {
            return Some((path.clone(), ConfigPathProvenance::Env));
        }
        if let Some(path) = &self.default {
            return Some((path.clone(), ConfigPathProvenance::Default));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigPathProvenance {
    fn is_explicit(self) -> bool {
        matches!(self, ConfigPathProvenance::Explicit)
    }
}
