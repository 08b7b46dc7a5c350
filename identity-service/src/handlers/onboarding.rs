use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use std::net::SocketAddr;

use crate::{
    dtos::onboarding::{
        CompleteOnboardingRequest, DocumentUploadRequest, SendEmailOtpRequest,
        StartOnboardingRequest, SubmitDetailsRequest, VerifyEmailRequest, VerifyMobileRequest,
    },
    handlers::user_agent_of,
    utils::ValidatedJson,
    AppState,
};

/// Start employer onboarding: send a mobile verification code
#[utoipa::path(
    post,
    path = "/onboarding/mobile/send",
    request_body = StartOnboardingRequest,
    responses(
        (status = 200, description = "Session created, code sent", body = StartOnboardingResponse),
        (status = 409, description = "Mobile already registered", body = ErrorResponse),
        (status = 429, description = "Too many codes requested", body = ErrorResponse)
    ),
    tag = "Onboarding"
)]
pub async fn send_mobile_otp(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<StartOnboardingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.onboarding.send_mobile_otp(&req.mobile).await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Verify the mobile code
#[utoipa::path(
    post,
    path = "/onboarding/mobile/verify",
    request_body = VerifyMobileRequest,
    responses(
        (status = 200, description = "Mobile verified", body = StepResponse),
        (status = 400, description = "Incorrect code", body = ErrorResponse),
        (status = 410, description = "Session expired", body = ErrorResponse)
    ),
    tag = "Onboarding"
)]
pub async fn verify_mobile_otp(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<VerifyMobileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state
        .onboarding
        .verify_mobile_otp(&req.session_token, &req.code)
        .await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Send an email verification code
#[utoipa::path(
    post,
    path = "/onboarding/email/send",
    request_body = SendEmailOtpRequest,
    responses(
        (status = 200, description = "Code sent", body = StepResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 412, description = "Mobile not verified yet", body = ErrorResponse),
        (status = 410, description = "Session expired", body = ErrorResponse)
    ),
    tag = "Onboarding"
)]
pub async fn send_email_otp(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SendEmailOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state
        .onboarding
        .send_email_otp(&req.session_token, &req.email)
        .await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Verify the email code
#[utoipa::path(
    post,
    path = "/onboarding/email/verify",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = StepResponse),
        (status = 400, description = "Incorrect code", body = ErrorResponse),
        (status = 412, description = "Email code not requested yet", body = ErrorResponse),
        (status = 410, description = "Session expired", body = ErrorResponse)
    ),
    tag = "Onboarding"
)]
pub async fn verify_email_otp(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<VerifyEmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state
        .onboarding
        .verify_email_otp(&req.session_token, &req.code)
        .await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Submit name, password and company details
#[utoipa::path(
    post,
    path = "/onboarding/details",
    request_body = SubmitDetailsRequest,
    responses(
        (status = 200, description = "Details saved", body = StepResponse),
        (status = 400, description = "Password confirmation mismatch", body = ErrorResponse),
        (status = 412, description = "Verification steps incomplete", body = ErrorResponse),
        (status = 410, description = "Session expired", body = ErrorResponse)
    ),
    tag = "Onboarding"
)]
pub async fn submit_details(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SubmitDetailsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.onboarding.submit_details(&req).await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Request a pre-signed upload for a company document (optional step)
#[utoipa::path(
    post,
    path = "/onboarding/documents",
    request_body = DocumentUploadRequest,
    responses(
        (status = 200, description = "Pre-signed upload issued", body = DocumentUploadResponse),
        (status = 412, description = "Details not submitted yet", body = ErrorResponse),
        (status = 410, description = "Session expired", body = ErrorResponse)
    ),
    tag = "Onboarding"
)]
pub async fn request_document_upload(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<DocumentUploadRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state
        .onboarding
        .request_document_upload(&req.session_token, &req.file_name, &req.content_type)
        .await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Finalize onboarding: materialize the account and mint tokens
#[utoipa::path(
    post,
    path = "/onboarding/complete",
    request_body = CompleteOnboardingRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 409, description = "Concurrent registration won", body = ErrorResponse),
        (status = 412, description = "Earlier steps incomplete", body = ErrorResponse),
        (status = 410, description = "Session expired", body = ErrorResponse)
    ),
    tag = "Onboarding"
)]
pub async fn complete(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<CompleteOnboardingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state
        .onboarding
        .finalize(
            &req.session_token,
            &addr.ip().to_string(),
            &user_agent_of(&headers),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(res)))
}
