pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::ip_rate_limit_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::IdentityConfig;
use crate::services::{
    AccessTokenVerifier, AuthService, CredentialStore, OnboardingService, SessionStore,
    TokenService, TtlStore,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::session::login,
        handlers::session::social_login,
        handlers::session::verify_email,
        handlers::session::refresh,
        handlers::session::logout,
        handlers::session::logout_all,
        handlers::session::introspect,
        handlers::password::request_password_reset,
        handlers::password::verify_password_reset,
        handlers::password::confirm_password_reset,
        handlers::account::change_password,
        handlers::account::deactivate,
        handlers::onboarding::send_mobile_otp,
        handlers::onboarding::verify_mobile_otp,
        handlers::onboarding::send_email_otp,
        handlers::onboarding::verify_email_otp,
        handlers::onboarding::submit_details,
        handlers::onboarding::request_document_upload,
        handlers::onboarding::complete,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::LoginRequest,
            dtos::auth::SocialLoginRequest,
            dtos::auth::TokenPairResponse,
            dtos::auth::AuthResponse,
            dtos::auth::VerificationRequiredResponse,
            dtos::auth::RefreshRequest,
            dtos::auth::LogoutRequest,
            dtos::auth::IntrospectRequest,
            dtos::auth::IntrospectResponse,
            dtos::auth::VerifyEmailOtpRequest,
            dtos::auth::PasswordResetRequest,
            dtos::auth::PasswordResetVerifyRequest,
            dtos::auth::PasswordResetVerifyResponse,
            dtos::auth::PasswordResetConfirmRequest,
            dtos::auth::ChangePasswordRequest,
            dtos::auth::MessageResponse,
            dtos::onboarding::StartOnboardingRequest,
            dtos::onboarding::StartOnboardingResponse,
            dtos::onboarding::VerifyMobileRequest,
            dtos::onboarding::SendEmailOtpRequest,
            dtos::onboarding::VerifyEmailRequest,
            dtos::onboarding::SubmitDetailsRequest,
            dtos::onboarding::StepResponse,
            dtos::onboarding::DocumentUploadRequest,
            dtos::onboarding::DocumentUploadResponse,
            dtos::onboarding::CompleteOnboardingRequest,
            models::CredentialSummary,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Login, refresh, logout and password recovery"),
        (name = "Onboarding", description = "Multi-step employer registration"),
        (name = "Account", description = "Authenticated account management"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub credentials: Arc<dyn CredentialStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub ttl: Arc<dyn TtlStore>,
    pub tokens: TokenService,
    pub verifier: Arc<dyn AccessTokenVerifier>,
    pub auth: AuthService,
    pub onboarding: OnboardingService,
    pub login_rate_limiter: service_core::middleware::rate_limit::IpRateLimiter,
    pub onboarding_rate_limiter: service_core::middleware::rate_limit::IpRateLimiter,
    pub password_reset_rate_limiter: service_core::middleware::rate_limit::IpRateLimiter,
    pub ip_rate_limiter: service_core::middleware::rate_limit::IpRateLimiter,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Credential-guessing surfaces get their own IP limiters on top of the
    // global one.
    let login_route = Router::new()
        .route("/auth/login", post(handlers::session::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let code_send_routes = Router::new()
        .route(
            "/onboarding/mobile/send",
            post(handlers::onboarding::send_mobile_otp),
        )
        .route(
            "/onboarding/email/send",
            post(handlers::onboarding::send_email_otp),
        )
        .layer(from_fn_with_state(
            state.onboarding_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let reset_request_route = Router::new()
        .route(
            "/auth/password-reset/request",
            post(handlers::password::request_password_reset),
        )
        .layer(from_fn_with_state(
            state.password_reset_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let authenticated_routes = Router::new()
        .route("/auth/logout-all", post(handlers::session::logout_all))
        .route("/auth/password", post(handlers::account::change_password))
        .route("/auth/deactivate", post(handlers::account::deactivate))
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    let mut app = Router::new().route("/health", get(health_check));

    let swagger_enabled = match state.config.environment {
        config::Environment::Dev => true,
        config::Environment::Prod => state.config.swagger.enabled == config::SwaggerMode::Public,
    };

    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        // Keep the OpenAPI JSON available for programmatic consumers.
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        );
    }

    let app = app
        .route("/auth/social", post(handlers::session::social_login))
        .route("/auth/verify-email", post(handlers::session::verify_email))
        .route("/auth/refresh", post(handlers::session::refresh))
        .route("/auth/logout", post(handlers::session::logout))
        .route("/auth/introspect", post(handlers::session::introspect))
        .route(
            "/auth/password-reset/verify",
            post(handlers::password::verify_password_reset),
        )
        .route(
            "/auth/password-reset/confirm",
            post(handlers::password::confirm_password_reset),
        )
        .route(
            "/onboarding/mobile/verify",
            post(handlers::onboarding::verify_mobile_otp),
        )
        .route(
            "/onboarding/email/verify",
            post(handlers::onboarding::verify_email_otp),
        )
        .route(
            "/onboarding/details",
            post(handlers::onboarding::submit_details),
        )
        .route(
            "/onboarding/documents",
            post(handlers::onboarding::request_document_upload),
        )
        .route(
            "/onboarding/complete",
            post(handlers::onboarding::complete),
        )
        .merge(login_route)
        .merge(code_send_routes)
        .merge(reset_request_route)
        .merge(authenticated_routes)
        .with_state(state.clone())
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .filter_map(|o| match o.parse::<axum::http::HeaderValue>() {
                            Ok(v) => Some(v),
                            Err(e) => {
                                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                                None
                            }
                        })
                        .collect::<Vec<axum::http::HeaderValue>>(),
                )
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                ]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "A dependency is down")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, AppError> {
    state.credentials.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        AppError::from(e)
    })?;

    state.ttl.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Cache health check failed");
        AppError::from(e)
    })?;

    Ok(axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "database": "up",
            "cache": "up"
        }
    })))
}
