//! Shared harness for router-level integration tests.
//!
//! Everything runs in process: in-memory durable and TTL stores, recording
//! notifier, seeded identity provider and storage doubles. Requests go
//! through the real router via `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::util::ServiceExt;

use identity_service::{
    build_router,
    config::{
        DatabaseConfig, DeliveryConfig, Environment, IdentityConfig, JwtConfig, OnboardingConfig,
        OtpConfig, ProviderConfig, RateLimitConfig, RedisConfig, SecurityConfig, SessionConfig,
        StorageConfig, SwaggerConfig, SwaggerMode, VerifierKind,
    },
    models::{Credential, Role},
    services::{
        AuthService, CredentialStore, LocalVerifier, MemoryStore, MemoryTtlStore,
        MockIdentityProvider, MockNotifier, MockObjectStorage, MockSocialVerifier, OnboardingService,
        OtpEngine, TokenService,
    },
    AppState,
};
use service_core::middleware::rate_limit::create_ip_rate_limiter;

pub fn test_config() -> IdentityConfig {
    IdentityConfig {
        common: service_core::config::Config { port: 8080 },
        environment: Environment::Dev,
        service_name: "identity-service-test".to_string(),
        service_version: "0.0.0-test".to_string(),
        log_level: "debug".to_string(),
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://unused".to_string(),
        },
        jwt: JwtConfig {
            access_secret: "test-access-secret-0123456789abcdef".to_string(),
            refresh_secret: "test-refresh-secret-0123456789abcdef".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
            verifier: VerifierKind::Local,
            jwks_url: None,
        },
        otp: OtpConfig {
            code_length: 6,
            expiry_seconds: 60,
            // No resend throttling by default so tests can issue freely.
            resend_interval_seconds: 0,
            rate_limit_max: 100,
            rate_limit_window_seconds: 900,
            reset_ticket_ttl_seconds: 600,
            dev_fixed_code: None,
        },
        sessions: SessionConfig {
            max_concurrent: 5,
            sweep_interval_seconds: 86400,
        },
        onboarding: OnboardingConfig {
            session_ttl_seconds: 1800,
        },
        delivery: DeliveryConfig {
            smtp_host: "localhost".to_string(),
            smtp_user: "noreply@localhost".to_string(),
            smtp_password: String::new(),
            from_email: "noreply@localhost".to_string(),
            sms_gateway_url: None,
        },
        provider: ProviderConfig {
            base_url: "http://unused".to_string(),
            api_key: "unused".to_string(),
        },
        storage: StorageConfig {
            base_url: "http://unused".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 1000,
            login_window_seconds: 60,
            onboarding_attempts: 1000,
            onboarding_window_seconds: 60,
            password_reset_attempts: 1000,
            password_reset_window_seconds: 60,
            global_ip_limit: 10000,
            global_ip_window_seconds: 60,
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub ttl: Arc<MemoryTtlStore>,
    pub notifier: Arc<MockNotifier>,
    pub provider: Arc<MockIdentityProvider>,
    pub storage: Arc<MockObjectStorage>,
    pub social: Arc<MockSocialVerifier>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_with(tweak: impl FnOnce(&mut IdentityConfig)) -> Self {
        let mut config = test_config();
        tweak(&mut config);

        let store = Arc::new(MemoryStore::new());
        let ttl = Arc::new(MemoryTtlStore::new());
        let notifier = Arc::new(MockNotifier::new());
        let provider = Arc::new(MockIdentityProvider::new());
        let storage = Arc::new(MockObjectStorage::new());
        let social = Arc::new(MockSocialVerifier::new());

        let tokens = TokenService::new(&config.jwt);
        let verifier = Arc::new(LocalVerifier::new(tokens.clone()));
        let otp = OtpEngine::new(ttl.clone(), config.otp.clone());

        let auth = AuthService::new(
            store.clone(),
            store.clone(),
            ttl.clone(),
            tokens.clone(),
            verifier.clone(),
            otp,
            notifier.clone(),
            social.clone(),
            config.otp.clone(),
            config.sessions.clone(),
        );
        let onboarding = OnboardingService::new(
            ttl.clone(),
            store.clone(),
            store.clone(),
            tokens.clone(),
            notifier.clone(),
            provider.clone(),
            storage.clone(),
            config.otp.clone(),
            config.onboarding.clone(),
            config.sessions.clone(),
        );

        let state = AppState {
            config: config.clone(),
            credentials: store.clone(),
            sessions: store.clone(),
            ttl: ttl.clone(),
            tokens,
            verifier,
            auth,
            onboarding,
            login_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.login_attempts,
                config.rate_limit.login_window_seconds,
            ),
            onboarding_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.onboarding_attempts,
                config.rate_limit.onboarding_window_seconds,
            ),
            password_reset_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.password_reset_attempts,
                config.rate_limit.password_reset_window_seconds,
            ),
            ip_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.global_ip_limit,
                config.rate_limit.global_ip_window_seconds,
            ),
        };

        let router = build_router(state.clone())
            .await
            .expect("Failed to build router");

        Self {
            router,
            state,
            store,
            ttl,
            notifier,
            provider,
            storage,
            social,
        }
    }

    /// POST a JSON body and return (status, parsed body).
    pub async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        self.request(path, body, None).await
    }

    /// Same, with a bearer token attached.
    pub async fn post_json_auth(
        &self,
        path: &str,
        body: serde_json::Value,
        bearer: &str,
    ) -> (StatusCode, serde_json::Value) {
        self.request(path, body, Some(bearer)).await
    }

    async fn request(
        &self,
        path: &str,
        body: serde_json::Value,
        bearer: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, "integration-tests")
            // oneshot bypasses the TCP accept path, so supply the peer
            // address the handlers would otherwise extract.
            .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));

        if let Some(bearer) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", bearer));
        }

        let request = builder
            .body(Body::from(body.to_string()))
            .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };

        (status, json)
    }

    /// Seed a verified, active credential with the given password.
    pub async fn seed_user(&self, email: &str, password: &str) -> Credential {
        self.seed_user_with(email, password, |_| {}).await
    }

    pub async fn seed_user_with(
        &self,
        email: &str,
        password: &str,
        tweak: impl FnOnce(&mut Credential),
    ) -> Credential {
        let hash = identity_service::utils::hash_password(
            &identity_service::utils::Password::new(password.to_string()),
        )
        .expect("Failed to hash password");

        let mut credential = Credential::new(
            email.to_string(),
            None,
            Some(hash.into_string()),
            Role::JobSeeker,
        );
        credential.is_email_verified = true;
        tweak(&mut credential);

        self.store
            .insert(&credential)
            .await
            .expect("Failed to seed user");
        credential
    }
}
