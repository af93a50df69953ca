use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted refresh-token session.
///
/// Rows are not removed when they lapse, so every read must check
/// [`Session::is_expired`] itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Keyed digest of the refresh token.
    pub refresh_token_hash: String,
    pub client_ip: String,
    pub expires_at: DateTime<Utc>,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
