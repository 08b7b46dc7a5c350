//! Employer onboarding wizard.
//!
//! A TTL-bound state machine keyed by an opaque session token. Steps are
//! strictly ordered: mobile code → mobile verify → email code → email verify
//! → basic details → (optional document upload) → finalize. Every successful
//! write refreshes the sliding TTL, so an active user is never timed out
//! mid-flow while an abandoned session is reclaimed by the store.
//!
//! Two concurrent requests advancing the same session race at the storage
//! layer and the last writer wins. The flow is single-user and
//! single-device in practice, so no compare-and-swap guard is applied.

use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{OnboardingConfig, OtpConfig, SessionConfig};
use crate::dtos::auth::AuthResponse;
use crate::dtos::onboarding::{
    DocumentUploadResponse, StartOnboardingResponse, StepResponse, SubmitDetailsRequest,
};
use crate::models::{steps, Company, Credential, RegistrationSession, Role};
use crate::services::auth::establish_session;
use crate::services::otp::{generate_code, hash_code};
use crate::services::provider::ProviderError;
use crate::services::store::{CredentialStore, SessionStore};
use crate::services::{
    CodeNotifier, Destination, IdentityProvider, ObjectStorage, ServiceError, TokenService,
    TtlStore,
};

#[derive(Clone)]
pub struct OnboardingService {
    ttl: Arc<dyn TtlStore>,
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    tokens: TokenService,
    notifier: Arc<dyn CodeNotifier>,
    provider: Arc<dyn IdentityProvider>,
    storage: Arc<dyn ObjectStorage>,
    otp_config: OtpConfig,
    onboarding_config: OnboardingConfig,
    session_config: SessionConfig,
}

impl OnboardingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ttl: Arc<dyn TtlStore>,
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        tokens: TokenService,
        notifier: Arc<dyn CodeNotifier>,
        provider: Arc<dyn IdentityProvider>,
        storage: Arc<dyn ObjectStorage>,
        otp_config: OtpConfig,
        onboarding_config: OnboardingConfig,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            ttl,
            credentials,
            sessions,
            tokens,
            notifier,
            provider,
            storage,
            otp_config,
            onboarding_config,
            session_config,
        }
    }

    fn session_key(token: &str) -> String {
        format!("onboard:sess:{}", token)
    }

    fn rate_key(identity: &str) -> String {
        format!("onboard:rate:{}", identity)
    }

    fn resend_key(identity: &str) -> String {
        format!("onboard:resend:{}", identity)
    }

    fn ttl_seconds(&self) -> u64 {
        self.onboarding_config.session_ttl_seconds
    }

    async fn load(&self, token: &str) -> Result<RegistrationSession, ServiceError> {
        let payload = self
            .ttl
            .get(&Self::session_key(token))
            .await?
            .ok_or(ServiceError::SessionExpired)?;
        serde_json::from_str(&payload).map_err(|e| ServiceError::Internal(anyhow::anyhow!(e)))
    }

    /// Persist the session, refreshing its sliding TTL.
    async fn save(&self, token: &str, session: &RegistrationSession) -> Result<(), ServiceError> {
        let payload =
            serde_json::to_string(session).map_err(|e| ServiceError::Internal(anyhow::anyhow!(e)))?;
        self.ttl
            .set_ex(&Self::session_key(token), &payload, self.ttl_seconds())
            .await
    }

    /// Dual throttle on code issuance for one identity: a resend-interval
    /// marker plus a rolling-window counter, both in the shared TTL store so
    /// they hold across service instances.
    async fn throttle_code(&self, identity: &str) -> Result<(), ServiceError> {
        let resend_key = Self::resend_key(identity);
        if self.ttl.get(&resend_key).await?.is_some() {
            let retry_after = self.ttl.ttl(&resend_key).await?;
            return Err(ServiceError::RateLimited { retry_after });
        }

        let rate_key = Self::rate_key(identity);
        let count = self
            .ttl
            .incr_ex(&rate_key, self.otp_config.rate_limit_window_seconds)
            .await?;
        if count > self.otp_config.rate_limit_max {
            let retry_after = self.ttl.ttl(&rate_key).await?;
            tracing::warn!(identity = %identity, count, "Onboarding code rate limit hit");
            return Err(ServiceError::RateLimited { retry_after });
        }

        if self.otp_config.resend_interval_seconds > 0 {
            self.ttl
                .set_ex(
                    &resend_key,
                    "1",
                    self.otp_config.resend_interval_seconds as u64,
                )
                .await?;
        }
        Ok(())
    }

    fn new_code(&self) -> String {
        generate_code(
            self.otp_config.code_length,
            self.otp_config.dev_fixed_code.as_deref(),
        )
    }

    /// Step 0 → 1: start a session by issuing a mobile verification code.
    pub async fn send_mobile_otp(
        &self,
        mobile: &str,
    ) -> Result<StartOnboardingResponse, ServiceError> {
        let mobile = Credential::normalize_mobile(mobile);
        validate_mobile(&mobile)?;

        if self.credentials.find_by_mobile(&mobile).await?.is_some() {
            return Err(ServiceError::Conflict(
                "Mobile number already registered".to_string(),
            ));
        }

        self.throttle_code(&mobile).await?;

        let code = self.new_code();
        let session = RegistrationSession::new(mobile.clone(), hash_code(&code));
        let token = generate_session_token();
        self.save(&token, &session).await?;

        if !self
            .notifier
            .send_code(&Destination::Mobile(mobile.clone()), &code)
            .await
        {
            tracing::warn!("Mobile code delivery failed; delivery may be delayed");
        }

        Ok(StartOnboardingResponse {
            session_token: token,
            step: session.step,
            expires_in: self.ttl_seconds(),
        })
    }

    /// Step 1 → 2.
    pub async fn verify_mobile_otp(
        &self,
        token: &str,
        code: &str,
    ) -> Result<StepResponse, ServiceError> {
        let mut session = self.load(token).await?;

        // Re-submitting after success is idempotent.
        if session.mobile_verified {
            return Ok(StepResponse {
                step: session.step,
                message: "Mobile already verified".to_string(),
            });
        }

        let expected = session
            .mobile_otp_hash
            .as_deref()
            .ok_or_else(|| no_code_error(steps::MOBILE_SENT))?;
        if expected != hash_code(code.trim()) {
            return Err(ServiceError::Invalid("Incorrect verification code".to_string()));
        }

        session.mobile_verified = true;
        session.mobile_otp_hash = None;
        session.advance_to(steps::MOBILE_VERIFIED);
        self.save(token, &session).await?;

        Ok(StepResponse {
            step: session.step,
            message: "Mobile verified".to_string(),
        })
    }

    /// Step 2 → 3.
    pub async fn send_email_otp(
        &self,
        token: &str,
        email: &str,
    ) -> Result<StepResponse, ServiceError> {
        let mut session = self.load(token).await?;

        if !session.mobile_verified {
            return Err(step_required(steps::MOBILE_VERIFIED, "verify your mobile number"));
        }

        let email = Credential::normalize_email(email);
        if self.credentials.find_by_email(&email).await?.is_some() {
            return Err(ServiceError::Conflict("Email already registered".to_string()));
        }

        self.throttle_code(&email).await?;

        let code = self.new_code();
        // A fresh or changed address must be re-verified.
        session.email = Some(email.clone());
        session.email_otp_hash = Some(hash_code(&code));
        session.email_otp_issued_utc = Some(chrono::Utc::now());
        session.email_verified = false;
        session.advance_to(steps::EMAIL_SENT);
        self.save(token, &session).await?;

        if !self
            .notifier
            .send_code(&Destination::Email(email), &code)
            .await
        {
            tracing::warn!("Email code delivery failed; delivery may be delayed");
        }

        Ok(StepResponse {
            step: session.step,
            message: "Verification code sent to email".to_string(),
        })
    }

    /// Step 3 → 4.
    pub async fn verify_email_otp(
        &self,
        token: &str,
        code: &str,
    ) -> Result<StepResponse, ServiceError> {
        let mut session = self.load(token).await?;

        if session.step < steps::EMAIL_SENT {
            return Err(step_required(steps::EMAIL_SENT, "request an email code"));
        }

        if session.email_verified {
            return Ok(StepResponse {
                step: session.step,
                message: "Email already verified".to_string(),
            });
        }

        let expected = session
            .email_otp_hash
            .as_deref()
            .ok_or_else(|| no_code_error(steps::EMAIL_SENT))?;
        if expected != hash_code(code.trim()) {
            return Err(ServiceError::Invalid("Incorrect verification code".to_string()));
        }

        session.email_verified = true;
        session.email_otp_hash = None;
        session.advance_to(steps::EMAIL_VERIFIED);
        self.save(token, &session).await?;

        Ok(StepResponse {
            step: session.step,
            message: "Email verified".to_string(),
        })
    }

    /// Step 4 → 5.
    pub async fn submit_details(
        &self,
        req: &SubmitDetailsRequest,
    ) -> Result<StepResponse, ServiceError> {
        let mut session = self.load(&req.session_token).await?;

        if !(session.mobile_verified && session.email_verified) {
            return Err(step_required(
                steps::EMAIL_VERIFIED,
                "verify both mobile and email",
            ));
        }

        if req.password != req.confirm_password {
            return Err(ServiceError::Invalid(
                "Password confirmation does not match".to_string(),
            ));
        }

        session.first_name = Some(req.first_name.trim().to_string());
        session.last_name = Some(req.last_name.trim().to_string());
        session.password = Some(req.password.clone());
        session.location = req.location.as_deref().map(|s| s.trim().to_string());
        session.company_name = req.company_name.as_deref().map(|s| s.trim().to_string());
        session.advance_to(steps::DETAILS_SUBMITTED);
        self.save(&req.session_token, &session).await?;

        Ok(StepResponse {
            step: session.step,
            message: "Details saved".to_string(),
        })
    }

    /// Optional side-step: hand out a pre-signed upload for a company
    /// document. Does not advance `step`.
    pub async fn request_document_upload(
        &self,
        token: &str,
        file_name: &str,
        content_type: &str,
    ) -> Result<DocumentUploadResponse, ServiceError> {
        let mut session = self.load(token).await?;

        if session.step < steps::DETAILS_SUBMITTED {
            return Err(step_required(steps::DETAILS_SUBMITTED, "submit basic details"));
        }

        let object_key = format!("onboarding-docs/{}.{}", Uuid::new_v4(), file_ext(file_name));
        let presigned = self.storage.presign_upload(&object_key, content_type).await?;

        session.document_key = Some(presigned.object_key.clone());
        self.save(token, &session).await?;

        Ok(DocumentUploadResponse {
            upload_url: presigned.upload_url,
            object_key: presigned.object_key,
        })
    }

    /// Final transition: materialize the credential and dependent records,
    /// mint a token pair, and destroy the wizard state.
    pub async fn finalize(
        &self,
        token: &str,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<AuthResponse, ServiceError> {
        let session = self.load(token).await?;

        if session.step < steps::DETAILS_SUBMITTED {
            return Err(step_required(steps::DETAILS_SUBMITTED, "submit basic details"));
        }
        let (Some(email), Some(password)) = (session.email.clone(), session.password.clone())
        else {
            return Err(step_required(steps::DETAILS_SUBMITTED, "submit basic details"));
        };

        let mut attrs = HashMap::new();
        if let Some(first_name) = &session.first_name {
            attrs.insert("first_name".to_string(), first_name.clone());
        }
        if let Some(last_name) = &session.last_name {
            attrs.insert("last_name".to_string(), last_name.clone());
        }
        if let Some(company_name) = &session.company_name {
            attrs.insert("company_name".to_string(), company_name.clone());
        }

        // The provider signup is idempotent from our side: an identity that
        // already exists upstream is fetched rather than treated as failure.
        let external_id = match self.provider.sign_up(&email, &password, &attrs).await {
            Ok(id) => id,
            Err(ProviderError::AlreadyExists) => {
                tracing::info!(email = %email, "Identity already exists upstream; fetching it");
                self.provider
                    .find_by_email(&email)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::Provider(
                            "Provider reported an existing identity but returned none".to_string(),
                        )
                    })?
            }
            Err(e) => return Err(e.into()),
        };

        // The document step is optional and its upload happens client-side;
        // a missing object is worth a log line, never a failure.
        if let Some(document_key) = &session.document_key {
            match self.storage.exists(document_key).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(object_key = %document_key, "Onboarding document was never uploaded")
                }
                Err(e) => tracing::warn!(error = %e, "Document existence check failed"),
            }
        }

        let password_hash = crate::utils::hash_password(&crate::utils::Password::new(password))
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e)))?;

        let mut credential = Credential::new(
            email,
            Some(session.mobile.clone()),
            Some(password_hash.into_string()),
            Role::Employer,
        );
        credential.is_email_verified = true;
        credential.is_mobile_verified = true;
        credential.external_id = Some(external_id);

        // A concurrent duplicate registration loses here with `Conflict`.
        self.credentials.insert(&credential).await?;

        if let Some(company_name) = &session.company_name {
            let company = Company::new(
                credential.user_id,
                company_name.clone(),
                session.location.clone(),
            );
            self.credentials.insert_company(&company).await?;
        }

        let tokens = establish_session(
            self.sessions.as_ref(),
            &self.tokens,
            &credential,
            ip_address,
            user_agent,
            self.session_config.max_concurrent,
        )
        .await?;

        // The wizard state is never readable again after completion.
        self.ttl.delete(&Self::session_key(token)).await?;

        tracing::info!(user_id = %credential.user_id, "Onboarding completed");

        Ok(AuthResponse {
            user: credential.sanitized(),
            tokens,
        })
    }
}

fn step_required(step: u8, action: &str) -> ServiceError {
    ServiceError::PreconditionFailed(format!(
        "Step {} not complete: {} first",
        step, action
    ))
}

fn no_code_error(step: u8) -> ServiceError {
    ServiceError::PreconditionFailed(format!("Step {} not complete: request a code first", step))
}

/// Opaque, unguessable session token.
fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn validate_mobile(mobile: &str) -> Result<(), ServiceError> {
    let rest = mobile
        .strip_prefix('+')
        .ok_or_else(|| ServiceError::Invalid("Mobile must be in E.164 format (+1234567890)".to_string()))?;
    if rest.len() < 7 || rest.len() > 15 || !rest.chars().all(|c| c.is_ascii_digit()) {
        return Err(ServiceError::Invalid(
            "Mobile must be in E.164 format (+1234567890)".to_string(),
        ));
    }
    Ok(())
}

fn file_ext(file_name: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_format_is_enforced() {
        assert!(validate_mobile("+911234567890").is_ok());
        assert!(validate_mobile("911234567890").is_err());
        assert!(validate_mobile("+12ab").is_err());
        assert!(validate_mobile("+1").is_err());
    }

    #[test]
    fn file_ext_falls_back_to_bin() {
        assert_eq!(file_ext("certificate.pdf"), "pdf");
        assert_eq!(file_ext("weird name"), "bin");
        assert_eq!(file_ext("trailing."), "bin");
        assert_eq!(file_ext("path.traversal./"), "bin");
    }

    #[test]
    fn session_tokens_are_long_and_unique() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}
