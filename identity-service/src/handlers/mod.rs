//! HTTP handlers: thin adapters over the services layer.

pub mod account;
pub mod onboarding;
pub mod password;
pub mod session;

use axum::http::HeaderMap;

/// User agent as reported by the client, bounded for storage.
pub(crate) fn user_agent_of(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .chars()
        .take(255)
        .collect()
}
