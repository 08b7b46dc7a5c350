//! Credential model - the durable identity record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Account role codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    JobSeeker,
    Employer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::JobSeeker => "job_seeker",
            Role::Employer => "employer",
            Role::Admin => "admin",
        }
    }
}

/// Identity record. Never physically deleted; `is_active` is flipped off on
/// deactivation instead.
#[derive(Debug, Clone, FromRow)]
pub struct Credential {
    pub user_id: Uuid,
    pub email: String,
    pub mobile: Option<String>,
    /// None for social/OTP-only accounts; password login is disabled for them.
    pub password_hash: Option<String>,
    pub role_code: String,
    pub is_email_verified: bool,
    pub is_mobile_verified: bool,
    pub is_active: bool,
    pub two_factor_secret: Option<String>,
    pub two_factor_enabled: bool,
    /// Subject assigned by the external identity provider, when one was
    /// involved in creating this account.
    pub external_id: Option<String>,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        email: String,
        mobile: Option<String>,
        password_hash: Option<String>,
        role: Role,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            email,
            mobile,
            password_hash,
            role_code: role.as_str().to_string(),
            is_email_verified: false,
            is_mobile_verified: false,
            is_active: true,
            two_factor_secret: None,
            two_factor_enabled: false,
            external_id: None,
            last_login_utc: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Canonical form used for lookups and uniqueness: emails are compared
    /// case-insensitively, so they are stored lowercased.
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    pub fn normalize_mobile(mobile: &str) -> String {
        mobile.trim().to_string()
    }

    pub fn sanitized(&self) -> CredentialSummary {
        CredentialSummary {
            user_id: self.user_id,
            email: self.email.clone(),
            mobile: self.mobile.clone(),
            role: self.role_code.clone(),
            is_email_verified: self.is_email_verified,
            is_mobile_verified: self.is_mobile_verified,
            created_utc: self.created_utc,
        }
    }
}

/// Credential fields safe to return to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CredentialSummary {
    pub user_id: Uuid,
    pub email: String,
    pub mobile: Option<String>,
    pub role: String,
    pub is_email_verified: bool,
    pub is_mobile_verified: bool,
    pub created_utc: DateTime<Utc>,
}
