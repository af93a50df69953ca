use axum::http::{Method, header::HeaderName};
use std::time::Duration;
use thiserror::Error;

use crate::models::{AuthConfig, Config, CorsConfig, SameSite};

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("AEGIS_JWT_SECRET is required and must not be blank")]
    MissingJwtSecret,
    #[error("authentication secret {field} {reason}")]
    WeakSecret { field: &'static str, reason: String },
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error(
        "access token lifetime ({access:?}) must be shorter than refresh token lifetime ({refresh:?})"
    )]
    TokenLifetimeOrder { access: Duration, refresh: Duration },
    #[error("SameSite=None cookies require AEGIS_COOKIE_SECURE=true")]
    InsecureSameSiteNone,
    #[error("CORS wildcard origins are not allowed when AEGIS_DEV_MODE is false")]
    DangerousCorsWildcard,
    #[error("invalid CORS configuration: {reason}")]
    InvalidCorsConfig { reason: String },
    #[error("notification queue capacity must be greater than zero")]
    ZeroQueueCapacity,
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    /// Emit every warning through `tracing`.
    pub fn log(&self) {
        for warning in &self.items {
            match &warning.hint {
                Some(hint) => tracing::warn!(hint = %hint, "{}", warning.message),
                None => tracing::warn!("{}", warning.message),
            }
        }
    }
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    enforce_auth(&config.auth, config.dev_mode, &mut warnings)?;

    for (field, value) in [
        ("server.request_timeout", config.server.request_timeout),
        ("database.acquire_timeout", config.database.acquire_timeout),
        ("sessions.purge_interval", config.sessions.purge_interval),
    ] {
        if value.is_zero() {
            return Err(ConfigGuardRailError::ZeroDuration { field });
        }
    }

    if config.notifier.queue_capacity == 0 {
        return Err(ConfigGuardRailError::ZeroQueueCapacity);
    }

    if config.cookies.same_site == SameSite::None && !config.cookies.secure {
        return Err(ConfigGuardRailError::InsecureSameSiteNone);
    }

    if !config.dev_mode && config.cors.is_wildcard_included() {
        return Err(ConfigGuardRailError::DangerousCorsWildcard);
    }
    validate_cors(&config.cors)?;

    if !config.dev_mode && !config.cookies.secure {
        warnings.push_with_hint(
            "refresh_token cookie is issued without the Secure attribute",
            "Set AEGIS_COOKIE_SECURE=true when serving over HTTPS",
        );
    }

    if config.database.url.is_none() {
        warnings.push_with_hint(
            "DATABASE_URL not configured; accounts live in process memory and are lost on restart",
            "Set DATABASE_URL to a PostgreSQL connection string",
        );
    }

    if config.cors.allow_credentials && config.cors.is_wildcard_included() {
        warnings.push(
            "CORS credentials allowed alongside wildcard origin; browsers will reject such configuration",
        );
    }

    Ok(warnings)
}

fn enforce_auth(
    auth: &AuthConfig,
    dev_mode: bool,
    warnings: &mut ConfigWarnings,
) -> Result<(), ConfigGuardRailError> {
    const MIN_SECRET_LENGTH: usize = 32;

    if auth.jwt_secret.trim().is_empty() {
        return Err(ConfigGuardRailError::MissingJwtSecret);
    }

    for (field, value) in [
        ("auth.access_token_ttl", auth.access_token_ttl),
        ("auth.refresh_token_ttl", auth.refresh_token_ttl),
        ("auth.one_time_token_ttl", auth.one_time_token_ttl),
    ] {
        if value.is_zero() {
            return Err(ConfigGuardRailError::ZeroDuration { field });
        }
    }

    if auth.access_token_ttl >= auth.refresh_token_ttl {
        return Err(ConfigGuardRailError::TokenLifetimeOrder {
            access: auth.access_token_ttl,
            refresh: auth.refresh_token_ttl,
        });
    }

    if auth.is_default_pepper() {
        warnings.push_with_hint(
            "AEGIS_PASSWORD_PEPPER uses the default placeholder value",
            "Generate a random pepper; changing it later invalidates every stored password",
        );
    }

    if auth.is_default_token_key() {
        warnings.push_with_hint(
            "AEGIS_TOKEN_KEY uses the default placeholder value",
            "Generate a random key; changing it later invalidates outstanding tokens and sessions",
        );
    }

    if !dev_mode && auth.jwt_secret.len() < MIN_SECRET_LENGTH {
        return Err(ConfigGuardRailError::WeakSecret {
            field: "AEGIS_JWT_SECRET",
            reason: format!("must be at least {MIN_SECRET_LENGTH} characters"),
        });
    }

    Ok(())
}

fn validate_cors(cors: &CorsConfig) -> Result<(), ConfigGuardRailError> {
    if cors.allowed_methods.is_empty() {
        return Err(ConfigGuardRailError::InvalidCorsConfig {
            reason: "AEGIS_CORS_ALLOWED_METHODS must include at least one HTTP method"
                .into(),
        });
    }

    for method in &cors.allowed_methods {
        Method::from_bytes(method.as_bytes()).map_err(|_| {
            ConfigGuardRailError::InvalidCorsConfig {
                reason: format!(
                    "invalid HTTP method `{}` in AEGIS_CORS_ALLOWED_METHODS",
                    method
                ),
            }
        })?;
    }

    for header in &cors.allowed_headers {
        HeaderName::from_bytes(header.as_bytes()).map_err(|_| {
            ConfigGuardRailError::InvalidCorsConfig {
                reason: format!(
                    "invalid header name `{}` in AEGIS_CORS_ALLOWED_HEADERS",
                    header
                ),
            }
        })?;
    }

    Ok(())
}
