//! Registration session model - the onboarding wizard's working state.
//!
//! Lives in the TTL store under an opaque session token and accumulates
//! fields as the wizard advances. The `step` counter only ever increases;
//! each operation checks the previous step's progress before accepting input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wizard step numbers. A session at step N has completed everything up to
/// and including N's prerequisite.
pub mod steps {
    pub const MOBILE_SENT: u8 = 1;
    pub const MOBILE_VERIFIED: u8 = 2;
    pub const EMAIL_SENT: u8 = 3;
    pub const EMAIL_VERIFIED: u8 = 4;
    pub const DETAILS_SUBMITTED: u8 = 5;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationSession {
    pub step: u8,
    pub mobile: String,
    pub mobile_otp_hash: Option<String>,
    pub mobile_otp_issued_utc: Option<DateTime<Utc>>,
    pub mobile_verified: bool,
    pub email: Option<String>,
    pub email_otp_hash: Option<String>,
    pub email_otp_issued_utc: Option<DateTime<Utc>>,
    pub email_verified: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Held until finalization, when it is hashed into the credential and
    /// forwarded to the identity provider. The surrounding entry is
    /// TTL-bound and deleted on completion.
    pub password: Option<String>,
    pub location: Option<String>,
    pub company_name: Option<String>,
    pub document_key: Option<String>,
}

impl RegistrationSession {
    /// A new session starts at step 1: the mobile code has been issued.
    pub fn new(mobile: String, mobile_otp_hash: String) -> Self {
        Self {
            step: steps::MOBILE_SENT,
            mobile,
            mobile_otp_hash: Some(mobile_otp_hash),
            mobile_otp_issued_utc: Some(Utc::now()),
            mobile_verified: false,
            email: None,
            email_otp_hash: None,
            email_otp_issued_utc: None,
            email_verified: false,
            first_name: None,
            last_name: None,
            password: None,
            location: None,
            company_name: None,
            document_key: None,
        }
    }

    /// Raise `step` to `target` without ever lowering it.
    pub fn advance_to(&mut self, target: u8) {
        self.step = self.step.max(target);
    }
}
