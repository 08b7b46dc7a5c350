use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct StartOnboardingRequest {
    /// E.164-style mobile number; format is checked by the wizard.
    #[validate(length(min = 8, max = 16))]
    pub mobile: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StartOnboardingResponse {
    pub session_token: String,
    pub step: u8,
    /// Sliding session lifetime in seconds; refreshed on every step.
    pub expires_in: u64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyMobileRequest {
    #[validate(length(min = 1))]
    pub session_token: String,
    #[validate(length(min = 4, max = 10))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SendEmailOtpRequest {
    #[validate(length(min = 1))]
    pub session_token: String,
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyEmailRequest {
    #[validate(length(min = 1))]
    pub session_token: String,
    #[validate(length(min = 4, max = 10))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SubmitDetailsRequest {
    #[validate(length(min = 1))]
    pub session_token: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 8, max = 128))]
    pub confirm_password: String,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub company_name: Option<String>,
}

/// Progress acknowledgement returned by every intermediate step.
#[derive(Debug, Serialize, ToSchema)]
pub struct StepResponse {
    pub step: u8,
    pub message: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DocumentUploadRequest {
    #[validate(length(min = 1))]
    pub session_token: String,
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    #[validate(length(min = 1, max = 100))]
    pub content_type: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentUploadResponse {
    pub upload_url: String,
    pub object_key: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CompleteOnboardingRequest {
    #[validate(length(min = 1))]
    pub session_token: String,
}
