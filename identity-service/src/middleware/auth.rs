use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    dtos::ErrorResponse,
    services::{AccessClaims, AccessTokenVerifier, SessionStore},
    AppState,
};

/// Require a bearer access token whose backing session is still live.
///
/// Revocation is session-backed: logout or password reset deletes the
/// session row, which immediately invalidates every access token bound to it
/// regardless of remaining JWT lifetime.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let token = match token {
        Some(token) => token,
        None => {
            return Err(unauthorized("Missing or invalid Authorization header"));
        }
    };

    let claims = match state.verifier.verify(token).await {
        Ok(claims) => claims,
        Err(_) => return Err(unauthorized("Invalid or expired token")),
    };

    let session_id = match Uuid::parse_str(&claims.sid) {
        Ok(id) => id,
        Err(_) => return Err(unauthorized("Invalid or expired token")),
    };

    match state.sessions.find_by_id(session_id).await {
        Ok(Some(session)) if session.is_live() => {}
        Ok(_) => return Err(unauthorized("Session has been revoked")),
        Err(e) => {
            tracing::error!(error = %e, "Session lookup failed in auth middleware");
            // Fail closed: an unreadable session store must not admit tokens.
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal server error".to_string(),
                }),
            ));
        }
    }

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

fn unauthorized(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

/// Extractor handing handlers the verified claims.
pub struct AuthUser(pub AccessClaims);

impl AuthUser {
    pub fn user_id(&self) -> Result<Uuid, service_core::error::AppError> {
        Uuid::parse_str(&self.0.sub).map_err(|_| {
            service_core::error::AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
        })
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AccessClaims>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| unauthorized("Missing authentication"))
    }
}
