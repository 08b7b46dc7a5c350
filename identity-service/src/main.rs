use identity_service::{
    build_router,
    config::{IdentityConfig, VerifierKind},
    db,
    services::{
        AccessTokenVerifier, AuthService, CodeNotifier, CredentialStore, Database,
        DeliveryService, GoogleVerifier, HttpIdentityProvider, HttpObjectStorage, IdentityProvider,
        JwksVerifier, LocalVerifier, ObjectStorage, OnboardingService, OtpEngine, RedisTtlStore,
        SessionStore, SocialTokenVerifier, TokenService, TtlStore,
    },
    AppState,
};
use service_core::error::AppError;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = IdentityConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    // Durable stores
    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
    let database = Database::new(pool);
    let credentials: Arc<dyn CredentialStore> = Arc::new(database.clone());
    let sessions: Arc<dyn SessionStore> = Arc::new(database.clone());

    // Ephemeral TTL store
    let ttl: Arc<dyn TtlStore> = Arc::new(RedisTtlStore::connect(&config.redis.url).await?);
    tracing::info!("TTL store initialized");

    // Token issuer and the verifier strategy picked once at startup
    let tokens = TokenService::new(&config.jwt);
    let verifier: Arc<dyn AccessTokenVerifier> = match config.jwt.verifier {
        VerifierKind::Local => Arc::new(LocalVerifier::new(tokens.clone())),
        VerifierKind::Jwks => {
            let url = config.jwt.jwks_url.as_ref().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("JWKS_URL missing for jwks verifier"))
            })?;
            let http = reqwest::Client::new();
            Arc::new(JwksVerifier::from_url(&http, url).await?)
        }
    };
    tracing::info!(verifier = ?config.jwt.verifier, "Token services initialized");

    // External collaborators
    let notifier: Arc<dyn CodeNotifier> = Arc::new(DeliveryService::new(&config.delivery)?);
    let provider: Arc<dyn IdentityProvider> = Arc::new(HttpIdentityProvider::new(&config.provider));
    let storage: Arc<dyn ObjectStorage> = Arc::new(HttpObjectStorage::new(&config.storage));
    let social: Arc<dyn SocialTokenVerifier> = Arc::new(GoogleVerifier::new());

    // Domain services
    let otp = OtpEngine::new(ttl.clone(), config.otp.clone());
    let auth = AuthService::new(
        credentials.clone(),
        sessions.clone(),
        ttl.clone(),
        tokens.clone(),
        verifier.clone(),
        otp,
        notifier.clone(),
        social,
        config.otp.clone(),
        config.sessions.clone(),
    );
    let onboarding = OnboardingService::new(
        ttl.clone(),
        credentials.clone(),
        sessions.clone(),
        tokens.clone(),
        notifier,
        provider,
        storage,
        config.otp.clone(),
        config.onboarding.clone(),
        config.sessions.clone(),
    );

    // Transport-level IP rate limiters
    let login_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.login_attempts,
        config.rate_limit.login_window_seconds,
    );
    let onboarding_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.onboarding_attempts,
        config.rate_limit.onboarding_window_seconds,
    );
    let password_reset_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.password_reset_attempts,
        config.rate_limit.password_reset_window_seconds,
    );
    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );

    let state = AppState {
        config: config.clone(),
        credentials,
        sessions,
        ttl,
        tokens,
        verifier,
        auth,
        onboarding,
        login_rate_limiter,
        onboarding_rate_limiter,
        password_reset_rate_limiter,
        ip_rate_limiter,
    };

    // Periodic sweep of expired session rows. OTP and wizard entries expire
    // natively in the TTL store.
    {
        let sessions = state.sessions.clone();
        let period = config.sessions.sweep_interval_seconds.max(60);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(period));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match sessions.delete_expired().await {
                    Ok(0) => {}
                    Ok(swept) => tracing::info!(swept, "Expired sessions removed"),
                    Err(e) => tracing::warn!(error = %e, "Session sweep failed"),
                }
            }
        });
    }

    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
