use chrono::{DateTime, Duration, SubsecRound, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind as JwtErrorKind,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AuthError, Result};
use crate::time::{SystemTimeProvider, TimeProvider};

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub user_id: Uuid,
    pub role: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: Uuid,
}

/// Claims carried by a refresh token. There is no role claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub user_id: Uuid,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: Uuid,
}

// Decoding target for refresh validation; `role` only exists to detect an
// access token presented in its place.
#[derive(Deserialize)]
struct RefreshEnvelope {
    user_id: Uuid,
    iat: i64,
    nbf: i64,
    exp: i64,
    jti: Uuid,
    #[serde(default)]
    role: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// An access/refresh pair handed to a client after login or refresh.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish_non_exhaustive()
    }
}

/// Signs and validates HS256 JWTs with one process-wide secret.
///
/// `iat`, `nbf` and `exp` are read from and checked against the injected
/// clock, the same one sessions expire by.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn TimeProvider>,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("algorithms", &self.validation.algorithms)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        Self::with_clock(secret, Arc::new(SystemTimeProvider))
    }

    pub fn with_clock(
        secret: impl AsRef<[u8]>,
        clock: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        let secret = secret.as_ref();
        if secret.iter().all(u8::is_ascii_whitespace) {
            return Err(AuthError::Config("JWT secret must not be empty".into()));
        }

        // Presence of exp/nbf is enforced here; their values are checked
        // against `clock` in `check_window`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.set_required_spec_claims(&["exp", "nbf"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            clock,
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.utc_now()
    }

    // Whole seconds, so `expires_at` equals the `exp` claim exactly.
    fn window(&self, ttl: Duration) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        if ttl <= Duration::zero() {
            return Err(AuthError::Config("token lifetime must be positive".into()));
        }
        let issued_at = self.now().trunc_subsecs(0);
        Ok((issued_at, issued_at + ttl))
    }

    fn check_window(nbf: i64, exp: i64, now: DateTime<Utc>) -> Result<()> {
        let seconds = now.timestamp();
        if seconds < nbf {
            return Err(AuthError::authentication("token is not yet valid"));
        }
        // Same rule as `Session::is_expired`: valid up to and including `exp`.
        if seconds > exp || (seconds == exp && now.timestamp_subsec_nanos() > 0) {
            return Err(AuthError::authentication("token has expired"));
        }
        Ok(())
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|err| {
                AuthError::infrastructure(format!("failed to sign token: {err}"))
            })
    }

    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        role_code: &str,
        ttl: Duration,
    ) -> Result<IssuedToken> {
        let (issued_at, expires_at) = self.window(ttl)?;
        let claims = AccessClaims {
            user_id,
            role: role_code.to_string(),
            iat: issued_at.timestamp(),
            nbf: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
        };
        Ok(IssuedToken {
            token: self.sign(&claims)?,
            expires_at,
        })
    }

    pub fn issue_refresh_token(
        &self,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<IssuedToken> {
        let (issued_at, expires_at) = self.window(ttl)?;
        let claims = RefreshClaims {
            user_id,
            iat: issued_at.timestamp(),
            nbf: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
        };
        Ok(IssuedToken {
            token: self.sign(&claims)?,
            expires_at,
        })
    }

    /// Validate an access token. Refresh tokens fail here because they lack
    /// the `role` claim.
    pub fn validate_access(&self, token: &str) -> Result<AccessClaims> {
        let claims =
            decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
                .map(|data| data.claims)
                .map_err(map_jwt_error)?;
        Self::check_window(claims.nbf, claims.exp, self.now())?;
        Ok(claims)
    }

    /// Validate a refresh token, rejecting access tokens.
    pub fn validate_refresh(&self, token: &str) -> Result<RefreshClaims> {
        self.validate_refresh_at(token, self.now())
    }

    /// [`Self::validate_refresh`] against an instant the caller already
    /// used for its own expiry checks.
    pub fn validate_refresh_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshClaims> {
        let envelope =
            decode::<RefreshEnvelope>(token, &self.decoding_key, &self.validation)
                .map(|data| data.claims)
                .map_err(map_jwt_error)?;
        Self::check_window(envelope.nbf, envelope.exp, now)?;

        if envelope.role.is_some() {
            return Err(AuthError::authentication(
                "access token presented as refresh token",
            ));
        }

        Ok(RefreshClaims {
            user_id: envelope.user_id,
            iat: envelope.iat,
            nbf: envelope.nbf,
            exp: envelope.exp,
            jti: envelope.jti,
        })
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    let message = match err.kind() {
        JwtErrorKind::ExpiredSignature => "token has expired",
        JwtErrorKind::ImmatureSignature => "token is not yet valid",
        JwtErrorKind::InvalidSignature => "token signature is invalid",
        JwtErrorKind::InvalidAlgorithm => "token algorithm is not accepted",
        JwtErrorKind::MissingRequiredClaim(_) => "token is missing a required claim",
        _ => "token is invalid",
    };
    AuthError::authentication(message)
}
