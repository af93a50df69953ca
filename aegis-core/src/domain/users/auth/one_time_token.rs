use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AuthError, Result};

pub const MIN_TOKEN_LENGTH: usize = 16;
pub const MAX_TOKEN_LENGTH: usize = 128;

static TOKEN_ALPHABET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid token regex"));

/// Trim a caller-supplied verification/reset token and check its shape
/// before it reaches the store.
pub fn normalize_one_time_token(raw: &str) -> Result<&str> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(AuthError::validation("token is required"));
    }
    if !(MIN_TOKEN_LENGTH..=MAX_TOKEN_LENGTH).contains(&token.len())
        || !TOKEN_ALPHABET.is_match(token)
    {
        return Err(AuthError::validation("token is malformed"));
    }
    Ok(token)
}

/// At most the first 8 characters, for log lines.
pub fn token_prefix(token: &str) -> &str {
    match token.char_indices().nth(8) {
        Some((idx, _)) => &token[..idx],
        None => token,
    }
}
