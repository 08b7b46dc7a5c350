use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::CredentialSummary;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenPairResponse {
    pub fn new(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

/// Successful authentication: profile summary plus a token pair.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: CredentialSummary,
    pub tokens: TokenPairResponse,
}

/// The account exists but its email is unverified; a fresh code is on its
/// way and no tokens are issued.
#[derive(Debug, Serialize, ToSchema)]
pub struct VerificationRequiredResponse {
    pub status: String,
    pub message: String,
}

impl VerificationRequiredResponse {
    pub fn new() -> Self {
        Self {
            status: "verification_required".to_string(),
            message: "Email not verified. A verification code has been sent.".to_string(),
        }
    }
}

impl Default for VerificationRequiredResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Login either yields tokens or a distinguishable verification-required
/// signal; the two shapes share no fields.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Tokens(Box<AuthResponse>),
    VerificationRequired(VerificationRequiredResponse),
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SocialLoginRequest {
    #[validate(length(min = 1))]
    pub provider: String,
    #[validate(length(min = 1))]
    pub access_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IntrospectRequest {
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IntrospectResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl IntrospectResponse {
    pub fn inactive() -> Self {
        Self {
            active: false,
            sub: None,
            email: None,
            role: None,
            session_id: None,
            exp: None,
            iat: None,
            jti: None,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyEmailOtpRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 4, max = 10))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetVerifyRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 4, max = 10))]
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PasswordResetVerifyResponse {
    pub reset_ticket: String,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetConfirmRequest {
    #[validate(length(min = 1))]
    pub reset_ticket: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
    #[validate(length(min = 8, max = 128))]
    pub confirm_password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}
