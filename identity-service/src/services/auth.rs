//! Authentication orchestrator.
//!
//! The one component every external entry point calls into. It sequences the
//! credential store, OTP engine, session store and token issuer, and
//! translates domain outcomes into the error taxonomy; it owns no state of
//! its own.

use rand::RngCore;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{OtpConfig, SessionConfig};
use crate::dtos::auth::{
    AuthResponse, ChangePasswordRequest, IntrospectResponse, LoginRequest, LoginResponse,
    PasswordResetConfirmRequest, PasswordResetVerifyResponse, SocialLoginRequest,
    TokenPairResponse, VerificationRequiredResponse,
};
use crate::models::{Credential, Role, Session};
use crate::services::store::{CredentialStore, SessionStore};
use crate::services::{
    AccessTokenVerifier, CodeNotifier, Destination, OtpEngine, ServiceError, SocialTokenVerifier,
    TokenService, TtlStore,
};
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    ttl: Arc<dyn TtlStore>,
    tokens: TokenService,
    verifier: Arc<dyn AccessTokenVerifier>,
    otp: OtpEngine,
    notifier: Arc<dyn CodeNotifier>,
    social: Arc<dyn SocialTokenVerifier>,
    otp_config: OtpConfig,
    session_config: SessionConfig,
}

impl AuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        ttl: Arc<dyn TtlStore>,
        tokens: TokenService,
        verifier: Arc<dyn AccessTokenVerifier>,
        otp: OtpEngine,
        notifier: Arc<dyn CodeNotifier>,
        social: Arc<dyn SocialTokenVerifier>,
        otp_config: OtpConfig,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            credentials,
            sessions,
            ttl,
            tokens,
            verifier,
            otp,
            notifier,
            social,
            otp_config,
            session_config,
        }
    }

    fn reset_key(ticket: &str) -> String {
        format!("otp:reset:{}", ticket)
    }

    pub async fn login(
        &self,
        req: LoginRequest,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<LoginResponse, ServiceError> {
        let email = Credential::normalize_email(&req.email);

        let user = self
            .credentials
            .find_by_email(&email)
            .await?
            .ok_or_else(invalid_credentials)?;

        // Accounts created through social or OTP-only flows carry no hash
        // and can never match a password.
        let hash = user.password_hash.clone().ok_or_else(invalid_credentials)?;
        verify_password(&Password::new(req.password), &PasswordHashString::new(hash))
            .map_err(|_| invalid_credentials())?;

        if !user.is_active {
            return Err(ServiceError::Unauthorized(
                "Account is deactivated".to_string(),
            ));
        }

        if !user.is_email_verified {
            // Named side effect: an unverified login re-triggers code
            // issuance instead of handing out tokens.
            self.send_verification_code(&user.email).await;
            return Ok(LoginResponse::VerificationRequired(
                VerificationRequiredResponse::new(),
            ));
        }

        let tokens = establish_session(
            self.sessions.as_ref(),
            &self.tokens,
            &user,
            ip_address,
            user_agent,
            self.session_config.max_concurrent,
        )
        .await?;

        self.credentials.touch_last_login(user.user_id).await?;

        tracing::info!(user_id = %user.user_id, "User logged in");

        Ok(LoginResponse::Tokens(Box::new(AuthResponse {
            user: user.sanitized(),
            tokens,
        })))
    }

    /// Submit the code issued by the unverified-login side effect (or a
    /// manual resend) and flip the email-verified flag.
    pub async fn verify_email(&self, email: &str, code: &str) -> Result<(), ServiceError> {
        let email = Credential::normalize_email(email);
        self.otp.verify(&email, code).await?;

        let user = self
            .credentials
            .find_by_email(&email)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
        self.credentials.set_email_verified(user.user_id).await?;

        tracing::info!(user_id = %user.user_id, "Email verified");
        Ok(())
    }

    /// Best-effort: issuance and delivery failures are logged, never
    /// surfaced, so login behaviour stays uniform.
    async fn send_verification_code(&self, email: &str) {
        match self.otp.can_resend(email).await {
            Ok(false) => {
                tracing::debug!("Verification code recently sent; not resending");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not check resend interval");
                return;
            }
            Ok(true) => {}
        }

        match self.otp.issue(email).await {
            Ok(code) => {
                if !self
                    .notifier
                    .send_code(&Destination::Email(email.to_string()), &code)
                    .await
                {
                    tracing::warn!("Verification code delivery failed; delivery may be delayed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Verification code issuance failed"),
        }
    }

    pub async fn social_login(
        &self,
        req: SocialLoginRequest,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<AuthResponse, ServiceError> {
        if req.provider != "google" {
            return Err(ServiceError::Invalid(format!(
                "Unsupported provider: {}",
                req.provider
            )));
        }

        let identity = self.social.fetch_identity(&req.access_token).await?;
        if !identity.email_verified {
            return Err(ServiceError::Unauthorized(
                "Email is not verified with the provider".to_string(),
            ));
        }

        let email = Credential::normalize_email(&identity.email);
        let user = match self.credentials.find_by_email(&email).await? {
            Some(user) => {
                if !user.is_active {
                    return Err(ServiceError::Unauthorized(
                        "Account is deactivated".to_string(),
                    ));
                }
                if user.external_id.is_none() {
                    self.credentials
                        .set_external_id(user.user_id, &identity.subject)
                        .await?;
                }
                user
            }
            None => {
                // First social login materializes a passwordless credential.
                let mut credential = Credential::new(email, None, None, Role::JobSeeker);
                credential.is_email_verified = true;
                credential.external_id = Some(identity.subject.clone());
                self.credentials.insert(&credential).await?;
                tracing::info!(user_id = %credential.user_id, "User created via social login");
                credential
            }
        };

        let tokens = establish_session(
            self.sessions.as_ref(),
            &self.tokens,
            &user,
            ip_address,
            user_agent,
            self.session_config.max_concurrent,
        )
        .await?;

        self.credentials.touch_last_login(user.user_id).await?;

        Ok(AuthResponse {
            user: user.sanitized(),
            tokens,
        })
    }

    /// Rotating refresh: a valid exchange always yields a brand-new pair and
    /// replaces the session's token material in place, so the presented
    /// refresh token is never usable twice.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPairResponse, ServiceError> {
        let claims = self.tokens.verify_refresh_token(refresh_token)?;
        let session_id = parse_uuid(&claims.sid)?;
        let user_id = parse_uuid(&claims.sub)?;

        let session = self
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or_else(invalid_token)?;

        if !session.is_live() {
            let _ = self.sessions.delete(session_id).await;
            return Err(invalid_token());
        }

        if session.refresh_token_hash != Session::hash_token(refresh_token) {
            // Signed but superseded: either replay of a rotated-out token or
            // use after a leaked token was already exchanged.
            tracing::warn!(user_id = %claims.sub, "Refresh token hash mismatch");
            return Err(invalid_token());
        }

        let user = self
            .credentials
            .find_by_id(user_id)
            .await?
            .ok_or_else(invalid_token)?;
        if !user.is_active {
            return Err(ServiceError::Unauthorized(
                "Account is deactivated".to_string(),
            ));
        }

        let access_token = self.tokens.issue_access_token(&user, session_id)?;
        let new_refresh_token = self.tokens.issue_refresh_token(user.user_id, session_id)?;
        let new_expiry =
            chrono::Utc::now() + chrono::Duration::days(self.tokens.refresh_expiry_days());

        self.sessions
            .rotate(session_id, &Session::hash_token(&new_refresh_token), new_expiry)
            .await?;

        tracing::info!(user_id = %user.user_id, session_id = %session_id, "Token refreshed");

        Ok(TokenPairResponse::new(
            access_token,
            new_refresh_token,
            self.tokens.access_expiry_seconds(),
        ))
    }

    /// Invalidate the single session behind a refresh token. Idempotent: a
    /// token whose session is already gone logs out successfully.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), ServiceError> {
        let claims = self.tokens.verify_refresh_token(refresh_token)?;
        let session_id = parse_uuid(&claims.sid)?;

        if let Some(session) = self.sessions.find_by_id(session_id).await? {
            if session.user_id.to_string() == claims.sub {
                self.sessions.delete(session_id).await?;
                tracing::info!(user_id = %claims.sub, "User logged out");
            }
        }

        Ok(())
    }

    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let count = self.sessions.delete_all_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, count, "All sessions invalidated");
        Ok(count)
    }

    /// Never reveals whether the email belongs to an account.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ServiceError> {
        let email = Credential::normalize_email(email);

        if let Some(user) = self.credentials.find_by_email(&email).await? {
            if user.is_active {
                self.send_verification_code(&email).await;
                tracing::info!(user_id = %user.user_id, "Password reset requested");
            }
        }

        Ok(())
    }

    /// Exchange a correct reset code for a short-lived single-use ticket.
    pub async fn verify_password_reset(
        &self,
        email: &str,
        code: &str,
    ) -> Result<PasswordResetVerifyResponse, ServiceError> {
        let email = Credential::normalize_email(email);
        self.otp.verify(&email, code).await?;

        let user = self
            .credentials
            .find_by_email(&email)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        let ticket = generate_ticket();
        self.ttl
            .set_ex(
                &Self::reset_key(&ticket),
                &user.user_id.to_string(),
                self.otp_config.reset_ticket_ttl_seconds,
            )
            .await?;

        Ok(PasswordResetVerifyResponse {
            reset_ticket: ticket,
            expires_in: self.otp_config.reset_ticket_ttl_seconds,
        })
    }

    /// Set the new password and unconditionally invalidate every session:
    /// the credential protecting the outstanding refresh tokens has changed.
    pub async fn confirm_password_reset(
        &self,
        req: PasswordResetConfirmRequest,
    ) -> Result<(), ServiceError> {
        if req.new_password != req.confirm_password {
            return Err(ServiceError::Invalid(
                "Password confirmation does not match".to_string(),
            ));
        }

        let key = Self::reset_key(&req.reset_ticket);
        let user_id = self
            .ttl
            .get(&key)
            .await?
            .ok_or_else(|| ServiceError::Invalid("Reset ticket is invalid or has expired".to_string()))?;
        self.ttl.delete(&key).await?;

        let user_id = parse_uuid(&user_id)?;
        let password_hash = hash_password(&Password::new(req.new_password))
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e)))?;

        self.credentials
            .update_password(user_id, password_hash.as_str())
            .await?;
        let revoked = self.sessions.delete_all_for_user(user_id).await?;

        tracing::info!(user_id = %user_id, revoked, "Password reset completed");
        Ok(())
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        req: ChangePasswordRequest,
    ) -> Result<(), ServiceError> {
        let user = self
            .credentials
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        let hash = user.password_hash.ok_or_else(|| {
            ServiceError::Unauthorized("Password login is not enabled for this account".to_string())
        })?;
        verify_password(
            &Password::new(req.current_password),
            &PasswordHashString::new(hash),
        )
        .map_err(|_| ServiceError::Unauthorized("Current password is incorrect".to_string()))?;

        let password_hash = hash_password(&Password::new(req.new_password))
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e)))?;
        self.credentials
            .update_password(user_id, password_hash.as_str())
            .await?;

        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    pub async fn deactivate(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.credentials.soft_deactivate(user_id).await?;
        let revoked = self.sessions.delete_all_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "Account deactivated");
        Ok(())
    }

    /// Token introspection for sibling services: signature + expiry through
    /// the configured verifier, then liveness of the backing session. The
    /// response never says why a token is inactive.
    pub async fn introspect(&self, token: &str) -> IntrospectResponse {
        let claims = match self.verifier.verify(token).await {
            Ok(claims) => claims,
            Err(_) => return IntrospectResponse::inactive(),
        };

        let session_id = match Uuid::parse_str(&claims.sid) {
            Ok(id) => id,
            Err(_) => return IntrospectResponse::inactive(),
        };

        let live = match self.sessions.find_by_id(session_id).await {
            Ok(Some(session)) => session.is_live(),
            Ok(None) => false,
            Err(e) => {
                tracing::error!(error = %e, "Session lookup failed during introspection");
                false
            }
        };

        if !live {
            return IntrospectResponse::inactive();
        }

        IntrospectResponse {
            active: true,
            sub: Some(claims.sub),
            email: Some(claims.email),
            role: Some(claims.role),
            session_id: Some(claims.sid),
            exp: Some(claims.exp),
            iat: Some(claims.iat),
            jti: Some(claims.jti),
        }
    }
}

/// Create a session (evicting over-cap ones) and mint the token pair bound
/// to it. Shared by login, social login and onboarding finalization.
pub(crate) async fn establish_session(
    sessions: &dyn SessionStore,
    tokens: &TokenService,
    user: &Credential,
    ip_address: &str,
    user_agent: &str,
    max_concurrent: u32,
) -> Result<TokenPairResponse, ServiceError> {
    let session_id = Uuid::new_v4();

    let access_token = tokens.issue_access_token(user, session_id)?;
    let refresh_token = tokens.issue_refresh_token(user.user_id, session_id)?;

    let session = Session::new(
        session_id,
        user.user_id,
        &refresh_token,
        ip_address.to_string(),
        user_agent.to_string(),
        tokens.refresh_expiry_days(),
    );
    sessions.create(&session, max_concurrent).await?;

    Ok(TokenPairResponse::new(
        access_token,
        refresh_token,
        tokens.access_expiry_seconds(),
    ))
}

fn invalid_credentials() -> ServiceError {
    ServiceError::Unauthorized("Invalid email or password".to_string())
}

fn invalid_token() -> ServiceError {
    ServiceError::Unauthorized("Invalid or expired token".to_string())
}

fn parse_uuid(value: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(value).map_err(|_| invalid_token())
}

fn generate_ticket() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
