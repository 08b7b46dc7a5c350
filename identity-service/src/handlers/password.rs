use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::auth::{
        MessageResponse, PasswordResetConfirmRequest, PasswordResetRequest,
        PasswordResetVerifyRequest,
    },
    utils::ValidatedJson,
    AppState,
};

/// Request a password reset code
#[utoipa::path(
    post,
    path = "/auth/password-reset/request",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Request received", body = MessageResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.request_password_reset(&req.email).await?;

    // The same answer whether or not the account exists.
    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "If your email is registered, you will receive a reset code shortly."
                .to_string(),
        }),
    ))
}

/// Exchange a reset code for a reset ticket
#[utoipa::path(
    post,
    path = "/auth/password-reset/verify",
    request_body = PasswordResetVerifyRequest,
    responses(
        (status = 200, description = "Reset ticket issued", body = PasswordResetVerifyResponse),
        (status = 400, description = "Incorrect code", body = ErrorResponse),
        (status = 404, description = "No active code", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn verify_password_reset(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PasswordResetVerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth.verify_password_reset(&req.email, &req.code).await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Set a new password using a reset ticket
#[utoipa::path(
    post,
    path = "/auth/password-reset/confirm",
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 200, description = "Password reset; all sessions invalidated", body = MessageResponse),
        (status = 400, description = "Invalid or expired ticket", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PasswordResetConfirmRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.confirm_password_reset(req).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Password reset successful. You can now login with your new password."
                .to_string(),
        }),
    ))
}
