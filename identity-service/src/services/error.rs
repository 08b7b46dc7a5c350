use service_core::error::AppError;
use thiserror::Error;

/// Domain error taxonomy. Every operation surfaces one of these; the handler
/// boundary converts them into `AppError` (and thus an HTTP status) without
/// swallowing anything.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    /// A wizard step was invoked out of order. The message names the step
    /// the caller still has to complete.
    #[error("{0}")]
    PreconditionFailed(String),

    /// The registration session's TTL has lapsed (or the token never
    /// existed). The caller should start registration again.
    #[error("Registration session expired. Please start registration again.")]
    SessionExpired,

    #[error("Too many codes requested. Please try again later.")]
    RateLimited { retry_after: Option<u64> },

    #[error("{0}")]
    NotFound(String),

    /// Bad input that is not an authentication failure: OTP mismatch,
    /// password confirmation mismatch, malformed ticket.
    #[error("{0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Upstream provider error: {0}")]
    Provider(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            ServiceError::Unauthorized(msg) => AppError::Unauthorized(anyhow::anyhow!(msg)),
            ServiceError::PreconditionFailed(msg) => AppError::PreconditionFailed(msg),
            ServiceError::SessionExpired => {
                AppError::Gone("Registration session expired. Please start registration again.".to_string())
            }
            ServiceError::RateLimited { retry_after } => AppError::TooManyRequests(
                "Too many codes requested. Please try again later.".to_string(),
                retry_after,
            ),
            ServiceError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            ServiceError::Invalid(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::anyhow!(e)),
            ServiceError::Cache(msg) => AppError::InternalError(anyhow::anyhow!(msg)),
            ServiceError::Provider(msg) => AppError::InternalError(anyhow::anyhow!(msg)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
