//! Session model - a live refresh-token grant.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

/// One row per outstanding refresh token. Refresh rotates the token material
/// in place (same `session_id`); logout, password reset and cap eviction
/// delete rows.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub refresh_token_hash: String,
    pub ip_address: String,
    pub user_agent: String,
    pub created_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
}

impl Session {
    pub fn new(
        session_id: Uuid,
        user_id: Uuid,
        refresh_token: &str,
        ip_address: String,
        user_agent: String,
        expiry_days: i64,
    ) -> Self {
        Self {
            session_id,
            user_id,
            refresh_token_hash: Self::hash_token(refresh_token),
            ip_address,
            user_agent,
            created_utc: Utc::now(),
            expiry_utc: Utc::now() + Duration::days(expiry_days),
        }
    }

    /// Tokens are stored hashed so a database read never yields a usable
    /// refresh token.
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_live(&self) -> bool {
        self.expiry_utc > Utc::now()
    }
}
