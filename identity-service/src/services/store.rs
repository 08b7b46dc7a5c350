//! Durable store contracts.
//!
//! The orchestrator and wizard only ever talk to these traits; `Database`
//! implements both against PostgreSQL, `MemoryStore` against process memory
//! for tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{Company, Credential, Session};
use crate::services::ServiceError;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn health_check(&self) -> Result<(), ServiceError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, ServiceError>;
    async fn find_by_mobile(&self, mobile: &str) -> Result<Option<Credential>, ServiceError>;
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<Credential>, ServiceError>;
    /// Fails with `Conflict` on a duplicate email or mobile.
    async fn insert(&self, credential: &Credential) -> Result<(), ServiceError>;
    async fn update_password(&self, user_id: Uuid, password_hash: &str)
        -> Result<(), ServiceError>;
    async fn set_email_verified(&self, user_id: Uuid) -> Result<(), ServiceError>;
    async fn set_mobile_verified(&self, user_id: Uuid) -> Result<(), ServiceError>;
    async fn set_external_id(&self, user_id: Uuid, external_id: &str) -> Result<(), ServiceError>;
    async fn touch_last_login(&self, user_id: Uuid) -> Result<(), ServiceError>;
    async fn soft_deactivate(&self, user_id: Uuid) -> Result<(), ServiceError>;
    async fn insert_company(&self, company: &Company) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a session, first evicting the user's oldest live sessions when
    /// the concurrent cap is reached. The cap is soft: login never fails
    /// because of it, and the read-evict-insert sequence is not wrapped in a
    /// transaction, so brief overshoot under heavily concurrent login is
    /// tolerated.
    async fn create(&self, session: &Session, max_concurrent: u32) -> Result<(), ServiceError>;
    async fn find_by_id(&self, session_id: Uuid) -> Result<Option<Session>, ServiceError>;
    /// Replace token material and expiry in place. The session id survives
    /// rotation; the previous refresh token does not.
    async fn rotate(
        &self,
        session_id: Uuid,
        refresh_token_hash: &str,
        expiry_utc: DateTime<Utc>,
    ) -> Result<(), ServiceError>;
    /// Returns whether a row was actually removed.
    async fn delete(&self, session_id: Uuid) -> Result<bool, ServiceError>;
    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64, ServiceError>;
    async fn count_live_for_user(&self, user_id: Uuid) -> Result<i64, ServiceError>;
    /// Sweep expired rows. Idempotent and safe to run alongside live traffic.
    async fn delete_expired(&self) -> Result<u64, ServiceError>;
}

/// In-memory implementation of both stores.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<Uuid, Credential>>,
    companies: Mutex<Vec<Company>>,
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn companies_for(&self, user_id: Uuid) -> Vec<Company> {
        self.companies
            .lock()
            .expect("store mutex poisoned")
            .iter()
            .filter(|c| c.owner_user_id == user_id)
            .cloned()
            .collect()
    }

    fn with_user<T>(
        &self,
        user_id: Uuid,
        f: impl FnOnce(&mut Credential) -> T,
    ) -> Result<T, ServiceError> {
        let mut users = self.users.lock().expect("store mutex poisoned");
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
        let out = f(user);
        user.updated_utc = Utc::now();
        Ok(out)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, ServiceError> {
        Ok(self
            .users
            .lock()
            .expect("store mutex poisoned")
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_mobile(&self, mobile: &str) -> Result<Option<Credential>, ServiceError> {
        Ok(self
            .users
            .lock()
            .expect("store mutex poisoned")
            .values()
            .find(|u| u.mobile.as_deref() == Some(mobile))
            .cloned())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<Credential>, ServiceError> {
        Ok(self
            .users
            .lock()
            .expect("store mutex poisoned")
            .get(&user_id)
            .cloned())
    }

    async fn insert(&self, credential: &Credential) -> Result<(), ServiceError> {
        let mut users = self.users.lock().expect("store mutex poisoned");
        if users.values().any(|u| u.email == credential.email) {
            return Err(ServiceError::Conflict("Email already registered".to_string()));
        }
        if let Some(mobile) = &credential.mobile {
            if users.values().any(|u| u.mobile.as_ref() == Some(mobile)) {
                return Err(ServiceError::Conflict(
                    "Mobile number already registered".to_string(),
                ));
            }
        }
        users.insert(credential.user_id, credential.clone());
        Ok(())
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        self.with_user(user_id, |u| u.password_hash = Some(password_hash.to_string()))
    }

    async fn set_email_verified(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.with_user(user_id, |u| u.is_email_verified = true)
    }

    async fn set_mobile_verified(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.with_user(user_id, |u| u.is_mobile_verified = true)
    }

    async fn set_external_id(&self, user_id: Uuid, external_id: &str) -> Result<(), ServiceError> {
        self.with_user(user_id, |u| u.external_id = Some(external_id.to_string()))
    }

    async fn touch_last_login(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.with_user(user_id, |u| u.last_login_utc = Some(Utc::now()))
    }

    async fn soft_deactivate(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.with_user(user_id, |u| u.is_active = false)
    }

    async fn insert_company(&self, company: &Company) -> Result<(), ServiceError> {
        self.companies
            .lock()
            .expect("store mutex poisoned")
            .push(company.clone());
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, session: &Session, max_concurrent: u32) -> Result<(), ServiceError> {
        let mut sessions = self.sessions.lock().expect("store mutex poisoned");

        let mut live: Vec<(Uuid, DateTime<Utc>)> = sessions
            .values()
            .filter(|s| s.user_id == session.user_id && s.is_live())
            .map(|s| (s.session_id, s.created_utc))
            .collect();
        live.sort_by_key(|(_, created)| *created);

        let overflow = (live.len() + 1).saturating_sub(max_concurrent as usize);
        for (id, _) in live.into_iter().take(overflow) {
            sessions.remove(&id);
            tracing::debug!(session_id = %id, "Evicted oldest session to honor the cap");
        }

        sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    async fn find_by_id(&self, session_id: Uuid) -> Result<Option<Session>, ServiceError> {
        Ok(self
            .sessions
            .lock()
            .expect("store mutex poisoned")
            .get(&session_id)
            .cloned())
    }

    async fn rotate(
        &self,
        session_id: Uuid,
        refresh_token_hash: &str,
        expiry_utc: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let mut sessions = self.sessions.lock().expect("store mutex poisoned");
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| ServiceError::NotFound("Session not found".to_string()))?;
        session.refresh_token_hash = refresh_token_hash.to_string();
        session.expiry_utc = expiry_utc;
        Ok(())
    }

    async fn delete(&self, session_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self
            .sessions
            .lock()
            .expect("store mutex poisoned")
            .remove(&session_id)
            .is_some())
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let mut sessions = self.sessions.lock().expect("store mutex poisoned");
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn count_live_for_user(&self, user_id: Uuid) -> Result<i64, ServiceError> {
        Ok(self
            .sessions
            .lock()
            .expect("store mutex poisoned")
            .values()
            .filter(|s| s.user_id == user_id && s.is_live())
            .count() as i64)
    }

    async fn delete_expired(&self) -> Result<u64, ServiceError> {
        let mut sessions = self.sessions.lock().expect("store mutex poisoned");
        let before = sessions.len();
        sessions.retain(|_, s| s.is_live());
        Ok((before - sessions.len()) as u64)
    }
}
