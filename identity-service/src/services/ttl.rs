//! Ephemeral TTL-bound key-value store.
//!
//! Backs everything short-lived: OTP records, registration sessions,
//! resend markers, rolling-window counters and password-reset tickets.
//! Each consumer owns a disjoint key namespace (`otp:`, `onboard:`, ...).

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::services::ServiceError;

#[async_trait]
pub trait TtlStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError>;
    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), ServiceError>;
    async fn delete(&self, key: &str) -> Result<(), ServiceError>;
    /// Increment a counter, starting its TTL window on first increment.
    /// Returns the post-increment count.
    async fn incr_ex(&self, key: &str, ttl_seconds: u64) -> Result<i64, ServiceError>;
    /// Remaining lifetime of a key in seconds, None when absent.
    async fn ttl(&self, key: &str) -> Result<Option<u64>, ServiceError>;
    async fn health_check(&self) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct RedisTtlStore {
    manager: ConnectionManager,
}

impl RedisTtlStore {
    pub async fn connect(url: &str) -> Result<Self, ServiceError> {
        tracing::info!(url = %url, "Connecting to Redis");
        let client = Client::open(url).map_err(cache_err)?;

        // ConnectionManager reconnects automatically on broken connections.
        let manager = client.get_connection_manager().await.map_err(cache_err)?;

        tracing::info!("Successfully connected to Redis");
        Ok(Self { manager })
    }
}

fn cache_err(e: redis::RedisError) -> ServiceError {
    ServiceError::Cache(e.to_string())
}

#[async_trait]
impl TtlStore for RedisTtlStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(cache_err)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(cache_err)
    }

    async fn delete(&self, key: &str) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(cache_err)
    }

    async fn incr_ex(&self, key: &str, ttl_seconds: u64) -> Result<i64, ServiceError> {
        let mut conn = self.manager.clone();
        let count: i64 = redis::cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(cache_err)?;

        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(key)
                .arg(ttl_seconds)
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(cache_err)?;
        }

        Ok(count)
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, ServiceError> {
        let mut conn = self.manager.clone();
        let ttl: i64 = redis::cmd("TTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(cache_err)?;

        // -2 = missing key, -1 = no expiry set.
        Ok(if ttl >= 0 { Some(ttl as u64) } else { None })
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(cache_err)
    }
}

/// In-process implementation used by tests and local development. Expiry is
/// enforced lazily on read.
#[derive(Default)]
pub struct MemoryTtlStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryTtlStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_entry(&self, key: &str) -> Option<(String, Instant)> {
        let mut entries = self.entries.lock().expect("ttl store mutex poisoned");
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => {
                Some((value.clone(), *expires_at))
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl TtlStore for MemoryTtlStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        Ok(self.live_entry(key).map(|(v, _)| v))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), ServiceError> {
        self.entries
            .lock()
            .expect("ttl store mutex poisoned")
            .insert(
                key.to_string(),
                (
                    value.to_string(),
                    Instant::now() + Duration::from_secs(ttl_seconds),
                ),
            );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ServiceError> {
        self.entries
            .lock()
            .expect("ttl store mutex poisoned")
            .remove(key);
        Ok(())
    }

    async fn incr_ex(&self, key: &str, ttl_seconds: u64) -> Result<i64, ServiceError> {
        let current = self
            .live_entry(key)
            .and_then(|(v, _)| v.parse::<i64>().ok());

        let mut entries = self.entries.lock().expect("ttl store mutex poisoned");
        match current {
            Some(count) => {
                let expires_at = entries
                    .get(key)
                    .map(|(_, e)| *e)
                    .unwrap_or_else(|| Instant::now() + Duration::from_secs(ttl_seconds));
                entries.insert(key.to_string(), ((count + 1).to_string(), expires_at));
                Ok(count + 1)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    (
                        "1".to_string(),
                        Instant::now() + Duration::from_secs(ttl_seconds),
                    ),
                );
                Ok(1)
            }
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, ServiceError> {
        Ok(self
            .live_entry(key)
            .map(|(_, expires_at)| expires_at.saturating_duration_since(Instant::now()).as_secs()))
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete_round_trip() {
        let store = MemoryTtlStore::new();
        store.set_ex("k", "v", 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let store = MemoryTtlStore::new();
        store.set_ex("k", "v", 0).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn counter_increments_within_window() {
        let store = MemoryTtlStore::new();
        assert_eq!(store.incr_ex("c", 60).await.unwrap(), 1);
        assert_eq!(store.incr_ex("c", 60).await.unwrap(), 2);
        assert_eq!(store.incr_ex("c", 60).await.unwrap(), 3);
    }
}
