use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::auth::{ChangePasswordRequest, MessageResponse},
    middleware::AuthUser,
    utils::ValidatedJson,
    AppState,
};

/// Change the authenticated user's password
#[utoipa::path(
    post,
    path = "/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 401, description = "Current password incorrect", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Account",
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user.user_id()?;
    state.auth.change_password(user_id, req).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Password changed successfully".to_string(),
        }),
    ))
}

/// Soft-deactivate the authenticated user's account
#[utoipa::path(
    post,
    path = "/auth/deactivate",
    responses(
        (status = 200, description = "Account deactivated", body = MessageResponse),
        (status = 401, description = "Invalid token", body = ErrorResponse)
    ),
    tag = "Account",
    security(("bearer_auth" = []))
)]
pub async fn deactivate(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user.user_id()?;
    state.auth.deactivate(user_id).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Account deactivated".to_string(),
        }),
    ))
}
