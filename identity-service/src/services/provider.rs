//! External identity collaborators: the hosted identity provider used for
//! employer signup, and the social-login userinfo verifier.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::ProviderConfig;
use crate::services::ServiceError;

/// Outcome of provider calls. `AlreadyExists` is a first-class condition the
/// wizard resolves by fetching the existing identity instead of failing.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("identity already exists")]
    AlreadyExists,
    #[error("{0}")]
    Other(String),
}

impl From<ProviderError> for ServiceError {
    fn from(e: ProviderError) -> Self {
        ServiceError::Provider(e.to_string())
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register an identity upstream and return its external id.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attrs: &HashMap<String, String>,
    ) -> Result<String, ProviderError>;

    /// Look up an existing identity's external id.
    async fn find_by_email(&self, email: &str) -> Result<Option<String>, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: String,
}

/// HTTP identity provider client.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpIdentityProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attrs: &HashMap<String, String>,
    ) -> Result<String, ProviderError> {
        let resp = self
            .client
            .post(format!("{}/users", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "attributes": attrs,
            }))
            .send()
            .await
            .map_err(|e| ProviderError::Other(format!("signup request failed: {}", e)))?;

        if resp.status() == reqwest::StatusCode::CONFLICT {
            return Err(ProviderError::AlreadyExists);
        }
        if !resp.status().is_success() {
            return Err(ProviderError::Other(format!(
                "signup rejected with status {}",
                resp.status()
            )));
        }

        let user: ProviderUser = resp
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("malformed signup response: {}", e)))?;
        Ok(user.id)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<String>, ProviderError> {
        let resp = self
            .client
            .get(format!("{}/users", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&[("email", email)])
            .send()
            .await
            .map_err(|e| ProviderError::Other(format!("lookup request failed: {}", e)))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(ProviderError::Other(format!(
                "lookup rejected with status {}",
                resp.status()
            )));
        }

        let user: ProviderUser = resp
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("malformed lookup response: {}", e)))?;
        Ok(Some(user.id))
    }
}

/// In-memory identity provider for tests.
#[derive(Default)]
pub struct MockIdentityProvider {
    pub users: Mutex<HashMap<String, String>>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed an existing upstream identity, for exercising the
    /// already-exists path.
    pub fn seed(&self, email: &str, external_id: &str) {
        self.users
            .lock()
            .expect("provider mutex poisoned")
            .insert(email.to_string(), external_id.to_string());
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn sign_up(
        &self,
        email: &str,
        _password: &str,
        _attrs: &HashMap<String, String>,
    ) -> Result<String, ProviderError> {
        let mut users = self.users.lock().expect("provider mutex poisoned");
        if users.contains_key(email) {
            return Err(ProviderError::AlreadyExists);
        }
        let id = format!("ext-{}", uuid::Uuid::new_v4());
        users.insert(email.to_string(), id.clone());
        Ok(id)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<String>, ProviderError> {
        Ok(self
            .users
            .lock()
            .expect("provider mutex poisoned")
            .get(email)
            .cloned())
    }
}

/// Identity asserted by a social provider for a bearer token.
#[derive(Debug, Clone, Deserialize)]
pub struct SocialIdentity {
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
}

#[async_trait]
pub trait SocialTokenVerifier: Send + Sync {
    /// Resolve a provider access token into the identity it was issued for.
    async fn fetch_identity(&self, access_token: &str) -> Result<SocialIdentity, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: String,
    verified_email: bool,
    name: Option<String>,
}

/// Validates Google access tokens by asking Google who they belong to.
pub struct GoogleVerifier {
    client: reqwest::Client,
}

impl GoogleVerifier {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for GoogleVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SocialTokenVerifier for GoogleVerifier {
    async fn fetch_identity(&self, access_token: &str) -> Result<SocialIdentity, ServiceError> {
        let resp = self
            .client
            .get("https://www.googleapis.com/oauth2/v2/userinfo")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to reach Google userinfo");
                ServiceError::Unauthorized("Social login failed".to_string())
            })?;

        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), "Google rejected the access token");
            return Err(ServiceError::Unauthorized("Social login failed".to_string()));
        }

        let info: GoogleUserInfo = resp.json().await.map_err(|e| {
            tracing::error!(error = %e, "Malformed Google userinfo response");
            ServiceError::Unauthorized("Social login failed".to_string())
        })?;

        Ok(SocialIdentity {
            subject: info.id,
            email: info.email,
            email_verified: info.verified_email,
            name: info.name,
        })
    }
}

/// Hands back a fixed identity for any token; tests configure it directly.
#[derive(Default)]
pub struct MockSocialVerifier {
    pub identity: Mutex<Option<SocialIdentity>>,
}

impl MockSocialVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_identity(&self, identity: SocialIdentity) {
        *self.identity.lock().expect("verifier mutex poisoned") = Some(identity);
    }
}

#[async_trait]
impl SocialTokenVerifier for MockSocialVerifier {
    async fn fetch_identity(&self, _access_token: &str) -> Result<SocialIdentity, ServiceError> {
        self.identity
            .lock()
            .expect("verifier mutex poisoned")
            .clone()
            .ok_or_else(|| ServiceError::Unauthorized("Social login failed".to_string()))
    }
}
