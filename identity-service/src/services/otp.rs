//! One-time-passcode engine.
//!
//! Codes are stored hashed in the TTL store so storage inspection never
//! discloses one. Two independent controls bound abuse: a minimum resend
//! interval (frequency) and a rolling-window issuance cap (volume).

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::config::OtpConfig;
use crate::services::{ServiceError, TtlStore};

/// What the engine keeps per identity while a code is outstanding.
#[derive(Debug, Serialize, Deserialize)]
struct OtpRecord {
    code_hash: String,
    issued_utc: DateTime<Utc>,
}

#[derive(Clone)]
pub struct OtpEngine {
    store: Arc<dyn TtlStore>,
    config: OtpConfig,
}

impl OtpEngine {
    pub fn new(store: Arc<dyn TtlStore>, config: OtpConfig) -> Self {
        Self { store, config }
    }

    fn code_key(identity: &str) -> String {
        format!("otp:code:{}", identity)
    }

    fn rate_key(identity: &str) -> String {
        format!("otp:rate:{}", identity)
    }

    /// Issue a fresh code for `identity`, invalidating any unused prior code.
    /// The plaintext is returned once, for delivery; only its hash is stored.
    pub async fn issue(&self, identity: &str) -> Result<String, ServiceError> {
        let identity = normalize_identity(identity);

        let count = self
            .store
            .incr_ex(&Self::rate_key(&identity), self.config.rate_limit_window_seconds)
            .await?;
        if count > self.config.rate_limit_max {
            let retry_after = self.store.ttl(&Self::rate_key(&identity)).await?;
            tracing::warn!(identity = %identity, count, "OTP issuance rate limit hit");
            return Err(ServiceError::RateLimited { retry_after });
        }

        let code = generate_code(self.config.code_length, self.config.dev_fixed_code.as_deref());
        let record = OtpRecord {
            code_hash: hash_code(&code),
            issued_utc: Utc::now(),
        };
        let payload = serde_json::to_string(&record)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!(e)))?;

        // SET overwrites: at most one usable code per identity at any instant.
        self.store
            .set_ex(&Self::code_key(&identity), &payload, self.config.expiry_seconds)
            .await?;

        Ok(code)
    }

    /// Verify a submitted code. Consumes the record on success; a second
    /// verification with the same code fails with `NotFound`.
    pub async fn verify(&self, identity: &str, submitted: &str) -> Result<(), ServiceError> {
        let identity = normalize_identity(identity);
        let key = Self::code_key(&identity);

        let payload = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| ServiceError::NotFound("No active code. Request a new one.".to_string()))?;
        let record: OtpRecord = serde_json::from_str(&payload)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!(e)))?;

        if record.code_hash != hash_code(submitted.trim()) {
            return Err(ServiceError::Invalid("Incorrect verification code".to_string()));
        }

        self.store.delete(&key).await?;
        Ok(())
    }

    /// Whether enough time has passed since the last issuance to send again.
    /// Separate from the rolling cap, which bounds volume rather than
    /// frequency.
    pub async fn can_resend(&self, identity: &str) -> Result<bool, ServiceError> {
        let identity = normalize_identity(identity);

        let Some(payload) = self.store.get(&Self::code_key(&identity)).await? else {
            return Ok(true);
        };
        let record: OtpRecord = serde_json::from_str(&payload)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!(e)))?;

        Ok(record.issued_utc + Duration::seconds(self.config.resend_interval_seconds) <= Utc::now())
    }
}

pub fn normalize_identity(identity: &str) -> String {
    identity.trim().to_lowercase()
}

/// Random numeric code, or the configured fixed one in dev environments.
pub fn generate_code(length: usize, fixed: Option<&str>) -> String {
    if let Some(fixed) = fixed {
        return fixed.to_string();
    }
    let mut rng = rand::thread_rng();
    (0..length).map(|_| rng.gen_range(0..10).to_string()).collect()
}

pub fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}
