use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use std::net::SocketAddr;

use crate::{
    dtos::auth::{
        IntrospectRequest, LoginRequest, LogoutRequest, MessageResponse, RefreshRequest,
        SocialLoginRequest, VerifyEmailOtpRequest,
    },
    handlers::user_agent_of,
    middleware::AuthUser,
    utils::ValidatedJson,
    AppState,
};

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair, or a verification-required signal", body = AuthResponse),
        (status = 401, description = "Invalid credentials or deactivated account", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state
        .auth
        .login(req, &addr.ip().to_string(), &user_agent_of(&headers))
        .await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Login with a social provider access token
#[utoipa::path(
    post,
    path = "/auth/social",
    request_body = SocialLoginRequest,
    responses(
        (status = 200, description = "Token pair", body = AuthResponse),
        (status = 400, description = "Unsupported provider", body = ErrorResponse),
        (status = 401, description = "Provider rejected the token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn social_login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<SocialLoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state
        .auth
        .social_login(req, &addr.ip().to_string(), &user_agent_of(&headers))
        .await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Verify an email address with a previously issued code
#[utoipa::path(
    post,
    path = "/auth/verify-email",
    request_body = VerifyEmailOtpRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Incorrect code", body = ErrorResponse),
        (status = 404, description = "No active code", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn verify_email(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<VerifyEmailOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.verify_email(&req.email, &req.code).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Email verified successfully".to_string(),
        }),
    ))
}

/// Exchange a refresh token for a rotated token pair
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Rotated token pair", body = TokenPairResponse),
        (status = 401, description = "Invalid or expired refresh token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth.refresh(&req.refresh_token).await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Invalidate the session behind one refresh token
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logged out"),
        (status = 401, description = "Invalid token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    Json(req): Json<LogoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.logout(&req.refresh_token).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "Logged out successfully"
        })),
    ))
}

/// Invalidate every session of the authenticated user
#[utoipa::path(
    post,
    path = "/auth/logout-all",
    responses(
        (status = 200, description = "All sessions invalidated"),
        (status = 401, description = "Invalid token", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn logout_all(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user.user_id()?;
    let count = state.auth.logout_all(user_id).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "All sessions invalidated",
            "revoked": count
        })),
    ))
}

/// Introspect an access token
#[utoipa::path(
    post,
    path = "/auth/introspect",
    request_body = IntrospectRequest,
    responses(
        (status = 200, description = "Token status", body = IntrospectResponse)
    ),
    tag = "Authentication"
)]
pub async fn introspect(
    State(state): State<AppState>,
    Json(req): Json<IntrospectRequest>,
) -> impl IntoResponse {
    let res = state.auth.introspect(&req.token).await;
    Json(res)
}
