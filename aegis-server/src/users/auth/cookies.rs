//! `refresh_token` cookie handling.

use aegis_config::{CookieConfig, constants::REFRESH_COOKIE_NAME};
use axum::http::{HeaderMap, HeaderValue, header};
use std::time::Duration;

use crate::infra::errors::AppError;

/// `Set-Cookie` value carrying a freshly issued refresh token.
pub fn refresh_cookie(
    token: &str,
    max_age: Duration,
    settings: &CookieConfig,
) -> Result<HeaderValue, AppError> {
    build(token, max_age.as_secs(), settings)
}

/// `Set-Cookie` value that removes the refresh token from the browser.
pub fn clear_refresh_cookie(settings: &CookieConfig) -> Result<HeaderValue, AppError> {
    build("", 0, settings)
}

fn build(
    value: &str,
    max_age_secs: u64,
    settings: &CookieConfig,
) -> Result<HeaderValue, AppError> {
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={value}; HttpOnly; Path=/; Max-Age={max_age_secs}; SameSite={}",
        settings.same_site.as_str()
    );
    if settings.secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|_| AppError::internal("failed to encode refresh cookie"))
}

/// Value of the `refresh_token` cookie, if the request carries one.
pub fn read_refresh_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == REFRESH_COOKIE_NAME)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
