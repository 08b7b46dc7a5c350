//! Token issuance and verification.
//!
//! Access and refresh tokens are HS256 JWTs signed with *distinct* secrets,
//! each carrying a `typ` discriminator so a token of one kind presented where
//! the other is expected is rejected twice over: first by the signature,
//! then by the claim check.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::Credential;
use crate::services::ServiceError;

const TYP_ACCESS: &str = "access";
const TYP_REFRESH: &str = "refresh";

/// Claims for access tokens (short-lived).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id).
    pub sub: String,
    pub email: String,
    pub role: String,
    /// Session id binding this token to a server-side session record.
    pub sid: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub typ: String,
}

/// Claims for refresh tokens (long-lived).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub sid: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub typ: String,
}

#[derive(Clone)]
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_expiry_minutes: i64,
    refresh_expiry_days: i64,
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_expiry_minutes: config.access_token_expiry_minutes,
            refresh_expiry_days: config.refresh_token_expiry_days,
        }
    }

    pub fn issue_access_token(
        &self,
        user: &Credential,
        session_id: Uuid,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user.user_id.to_string(),
            email: user.email.clone(),
            role: user.role_code.clone(),
            sid: session_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.access_expiry_minutes)).timestamp(),
            typ: TYP_ACCESS.to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode access token: {}", e)))
    }

    pub fn issue_refresh_token(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::days(self.refresh_expiry_days)).timestamp(),
            typ: TYP_REFRESH.to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode refresh token: {}", e)))
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, ServiceError> {
        let data = decode::<AccessClaims>(token, &self.access_decoding, &hs256_validation())
            .map_err(map_jwt_error)?;
        if data.claims.typ != TYP_ACCESS {
            return Err(ServiceError::Unauthorized("Invalid token".to_string()));
        }
        Ok(data.claims)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, ServiceError> {
        let data = decode::<RefreshClaims>(token, &self.refresh_decoding, &hs256_validation())
            .map_err(map_jwt_error)?;
        if data.claims.typ != TYP_REFRESH {
            return Err(ServiceError::Unauthorized("Invalid token".to_string()));
        }
        Ok(data.claims)
    }

    /// Access token lifetime in seconds, reported to clients.
    pub fn access_expiry_seconds(&self) -> i64 {
        self.access_expiry_minutes * 60
    }

    pub fn refresh_expiry_days(&self) -> i64 {
        self.refresh_expiry_days
    }
}

fn hs256_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation
}

/// All verification failures collapse into one of two user-facing messages so
/// callers cannot probe which part of the scheme rejected the token.
fn map_jwt_error(e: jsonwebtoken::errors::Error) -> ServiceError {
    match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            ServiceError::Unauthorized("Token expired".to_string())
        }
        _ => ServiceError::Unauthorized("Invalid token".to_string()),
    }
}

/// Verifies access tokens presented by callers. Two implementations exist:
/// the local shared-secret verifier and a JWKS-backed verifier for
/// deployments where a hosted issuer signs access tokens. One is selected at
/// startup from configuration; there is no per-request branching.
#[async_trait]
pub trait AccessTokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AccessClaims, ServiceError>;
}

#[derive(Clone)]
pub struct LocalVerifier {
    tokens: TokenService,
}

impl LocalVerifier {
    pub fn new(tokens: TokenService) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl AccessTokenVerifier for LocalVerifier {
    async fn verify(&self, token: &str) -> Result<AccessClaims, ServiceError> {
        self.tokens.verify_access_token(token)
    }
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kty: String,
    kid: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

/// RS256 verifier fed from a hosted issuer's JWKS document, fetched once at
/// startup. Key rotation requires a restart.
pub struct JwksVerifier {
    keys: HashMap<String, DecodingKey>,
}

impl JwksVerifier {
    pub async fn from_url(client: &reqwest::Client, url: &str) -> Result<Self, ServiceError> {
        tracing::info!(url = %url, "Fetching JWKS document");
        let doc: JwksDocument = client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ServiceError::Provider(format!("Failed to fetch JWKS: {}", e)))?
            .json()
            .await
            .map_err(|e| ServiceError::Provider(format!("Malformed JWKS document: {}", e)))?;

        let mut keys = HashMap::new();
        for jwk in doc.keys {
            if jwk.kty != "RSA" {
                continue;
            }
            let (Some(kid), Some(n), Some(e)) = (jwk.kid, jwk.n, jwk.e) else {
                continue;
            };
            let key = DecodingKey::from_rsa_components(&n, &e)
                .map_err(|e| ServiceError::Provider(format!("Invalid JWK: {}", e)))?;
            keys.insert(kid, key);
        }

        if keys.is_empty() {
            return Err(ServiceError::Provider(
                "JWKS document contains no usable RSA keys".to_string(),
            ));
        }

        tracing::info!(key_count = keys.len(), "JWKS verifier initialized");
        Ok(Self { keys })
    }
}

#[async_trait]
impl AccessTokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<AccessClaims, ServiceError> {
        let header = decode_header(token).map_err(map_jwt_error)?;
        let kid = header
            .kid
            .ok_or_else(|| ServiceError::Unauthorized("Invalid token".to_string()))?;
        let key = self
            .keys
            .get(&kid)
            .ok_or_else(|| ServiceError::Unauthorized("Invalid token".to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;

        let data = decode::<AccessClaims>(token, key, &validation).map_err(map_jwt_error)?;
        if data.claims.typ != TYP_ACCESS {
            return Err(ServiceError::Unauthorized("Invalid token".to_string()));
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn test_config() -> JwtConfig {
        JwtConfig {
            access_secret: "test-access-secret-0123456789abcdef".to_string(),
            refresh_secret: "test-refresh-secret-0123456789abcdef".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
            verifier: crate::config::VerifierKind::Local,
            jwks_url: None,
        }
    }

    fn test_user() -> Credential {
        Credential::new(
            "worker@example.com".into(),
            Some("+911234567890".into()),
            None,
            Role::JobSeeker,
        )
    }

    #[test]
    fn access_token_round_trips() {
        let service = TokenService::new(&test_config());
        let user = test_user();
        let sid = Uuid::new_v4();

        let token = service.issue_access_token(&user, sid).unwrap();
        let claims = service.verify_access_token(&token).unwrap();

        assert_eq!(claims.sub, user.user_id.to_string());
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.sid, sid.to_string());
        assert_eq!(claims.typ, "access");
    }

    #[test]
    fn refresh_token_round_trips() {
        let service = TokenService::new(&test_config());
        let user_id = Uuid::new_v4();
        let sid = Uuid::new_v4();

        let token = service.issue_refresh_token(user_id, sid).unwrap();
        let claims = service.verify_refresh_token(&token).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.sid, sid.to_string());
        assert_eq!(claims.typ, "refresh");
    }

    #[test]
    fn refresh_token_is_rejected_as_access_token() {
        let service = TokenService::new(&test_config());
        let token = service
            .issue_refresh_token(Uuid::new_v4(), Uuid::new_v4())
            .unwrap();
        assert!(matches!(
            service.verify_access_token(&token),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn access_token_is_rejected_as_refresh_token() {
        let service = TokenService::new(&test_config());
        let token = service
            .issue_access_token(&test_user(), Uuid::new_v4())
            .unwrap();
        assert!(matches!(
            service.verify_refresh_token(&token),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn expired_access_token_is_rejected() {
        let mut config = test_config();
        // Far enough in the past to clear the default validation leeway.
        config.access_token_expiry_minutes = -5;
        let service = TokenService::new(&config);

        let token = service
            .issue_access_token(&test_user(), Uuid::new_v4())
            .unwrap();
        let err = service.verify_access_token(&token).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(msg) if msg.contains("expired")));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let service = TokenService::new(&test_config());
        let token = service
            .issue_access_token(&test_user(), Uuid::new_v4())
            .unwrap();
        let mut tampered = token.clone();
        tampered.pop();
        assert!(service.verify_access_token(&tampered).is_err());
    }
}
