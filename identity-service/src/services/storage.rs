//! Object storage collaborator.
//!
//! Used only by the optional document-upload step of the onboarding wizard.
//! The core treats it as a black box that hands out pre-signed upload URLs
//! and answers existence checks.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Mutex;

use crate::config::StorageConfig;
use crate::services::ServiceError;

#[derive(Debug, Clone)]
pub struct PresignedUpload {
    pub upload_url: String,
    pub object_key: String,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn presign_upload(
        &self,
        object_key: &str,
        content_type: &str,
    ) -> Result<PresignedUpload, ServiceError>;

    async fn exists(&self, object_key: &str) -> Result<bool, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct PresignResponse {
    url: String,
}

/// Storage gateway client.
pub struct HttpObjectStorage {
    client: reqwest::Client,
    base_url: String,
}

impl HttpObjectStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn presign_upload(
        &self,
        object_key: &str,
        content_type: &str,
    ) -> Result<PresignedUpload, ServiceError> {
        let resp = self
            .client
            .post(format!("{}/presign", self.base_url))
            .json(&serde_json::json!({
                "key": object_key,
                "content_type": content_type,
            }))
            .send()
            .await
            .map_err(|e| ServiceError::Provider(format!("presign request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(ServiceError::Provider(format!(
                "presign rejected with status {}",
                resp.status()
            )));
        }

        let body: PresignResponse = resp
            .json()
            .await
            .map_err(|e| ServiceError::Provider(format!("malformed presign response: {}", e)))?;

        Ok(PresignedUpload {
            upload_url: body.url,
            object_key: object_key.to_string(),
        })
    }

    async fn exists(&self, object_key: &str) -> Result<bool, ServiceError> {
        let resp = self
            .client
            .head(format!("{}/objects/{}", self.base_url, object_key))
            .send()
            .await
            .map_err(|e| ServiceError::Provider(format!("existence check failed: {}", e)))?;

        Ok(resp.status().is_success())
    }
}

/// In-memory storage for tests: every presign "uploads" the object.
#[derive(Default)]
pub struct MockObjectStorage {
    pub objects: Mutex<HashSet<String>>,
}

impl MockObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStorage for MockObjectStorage {
    async fn presign_upload(
        &self,
        object_key: &str,
        _content_type: &str,
    ) -> Result<PresignedUpload, ServiceError> {
        self.objects
            .lock()
            .expect("storage mutex poisoned")
            .insert(object_key.to_string());
        Ok(PresignedUpload {
            upload_url: format!("https://storage.test/upload/{}", object_key),
            object_key: object_key.to_string(),
        })
    }

    async fn exists(&self, object_key: &str) -> Result<bool, ServiceError> {
        Ok(self
            .objects
            .lock()
            .expect("storage mutex poisoned")
            .contains(object_key))
    }
}
