//! PostgreSQL implementation of the durable stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{Company, Credential, Session};
use crate::services::store::{CredentialStore, SessionStore};
use crate::services::ServiceError;

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Translate a unique-constraint violation into the domain `Conflict`.
fn map_insert_error(e: sqlx::Error, what: &str) -> ServiceError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return ServiceError::Conflict(format!("{} already registered", what));
        }
    }
    ServiceError::Database(e)
}

#[async_trait]
impl CredentialStore for Database {
    async fn health_check(&self) -> Result<(), ServiceError> {
        Database::health_check(self).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, ServiceError> {
        let user = sqlx::query_as::<_, Credential>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_mobile(&self, mobile: &str) -> Result<Option<Credential>, ServiceError> {
        let user = sqlx::query_as::<_, Credential>("SELECT * FROM users WHERE mobile = $1")
            .bind(mobile)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<Credential>, ServiceError> {
        let user = sqlx::query_as::<_, Credential>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn insert(&self, credential: &Credential) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                user_id, email, mobile, password_hash, role_code,
                is_email_verified, is_mobile_verified, is_active,
                two_factor_secret, two_factor_enabled, external_id,
                last_login_utc, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(credential.user_id)
        .bind(&credential.email)
        .bind(&credential.mobile)
        .bind(&credential.password_hash)
        .bind(&credential.role_code)
        .bind(credential.is_email_verified)
        .bind(credential.is_mobile_verified)
        .bind(credential.is_active)
        .bind(&credential.two_factor_secret)
        .bind(credential.two_factor_enabled)
        .bind(&credential.external_id)
        .bind(credential.last_login_utc)
        .bind(credential.created_utc)
        .bind(credential.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "Email or mobile"))?;
        Ok(())
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $1, updated_utc = NOW() WHERE user_id = $2")
                .bind(password_hash)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    async fn set_email_verified(&self, user_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE users SET is_email_verified = TRUE, updated_utc = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_mobile_verified(&self, user_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE users SET is_mobile_verified = TRUE, updated_utc = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_external_id(&self, user_id: Uuid, external_id: &str) -> Result<(), ServiceError> {
        sqlx::query("UPDATE users SET external_id = $1, updated_utc = NOW() WHERE user_id = $2")
            .bind(external_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch_last_login(&self, user_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query("UPDATE users SET last_login_utc = NOW() WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn soft_deactivate(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let result =
            sqlx::query("UPDATE users SET is_active = FALSE, updated_utc = NOW() WHERE user_id = $1")
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    async fn insert_company(&self, company: &Company) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO companies (company_id, owner_user_id, company_name, location, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(company.company_id)
        .bind(company.owner_user_id)
        .bind(&company.company_name)
        .bind(&company.location)
        .bind(company.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for Database {
    async fn create(&self, session: &Session, max_concurrent: u32) -> Result<(), ServiceError> {
        // Soft cap: read the live sessions, evict the oldest overflow, then
        // insert. Not transactional; see the trait contract.
        let live: Vec<Session> = sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE user_id = $1 AND expiry_utc > NOW() ORDER BY created_utc ASC",
        )
        .bind(session.user_id)
        .fetch_all(&self.pool)
        .await?;

        let overflow = (live.len() + 1).saturating_sub(max_concurrent as usize);
        for evicted in live.iter().take(overflow) {
            sqlx::query("DELETE FROM sessions WHERE session_id = $1")
                .bind(evicted.session_id)
                .execute(&self.pool)
                .await?;
            tracing::debug!(
                session_id = %evicted.session_id,
                user_id = %session.user_id,
                "Evicted oldest session to honor the cap"
            );
        }

        sqlx::query(
            r#"
            INSERT INTO sessions (
                session_id, user_id, refresh_token_hash, ip_address,
                user_agent, created_utc, expiry_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(session.session_id)
        .bind(session.user_id)
        .bind(&session.refresh_token_hash)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.created_utc)
        .bind(session.expiry_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, session_id: Uuid) -> Result<Option<Session>, ServiceError> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn rotate(
        &self,
        session_id: Uuid,
        refresh_token_hash: &str,
        expiry_utc: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let result = sqlx::query(
            "UPDATE sessions SET refresh_token_hash = $1, expiry_utc = $2 WHERE session_id = $3",
        )
        .bind(refresh_token_hash)
        .bind(expiry_utc)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Session not found".to_string()));
        }
        Ok(())
    }

    async fn delete(&self, session_id: Uuid) -> Result<bool, ServiceError> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_live_for_user(&self, user_id: Uuid) -> Result<i64, ServiceError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sessions WHERE user_id = $1 AND expiry_utc > NOW()",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    async fn delete_expired(&self) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expiry_utc <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
