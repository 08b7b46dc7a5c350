//! Company model - the dependent business record created when an employer
//! completes onboarding.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct Company {
    pub company_id: Uuid,
    pub owner_user_id: Uuid,
    pub company_name: String,
    pub location: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl Company {
    pub fn new(owner_user_id: Uuid, company_name: String, location: Option<String>) -> Self {
        Self {
            company_id: Uuid::new_v4(),
            owner_user_id,
            company_name,
            location,
            created_utc: Utc::now(),
        }
    }
}
