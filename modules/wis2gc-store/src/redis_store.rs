use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use wis2gc_common::Wis2Error;

use crate::traits::DedupStore;

const STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis-backed implementation of [`DedupStore`], reached over the standard
/// Redis wire protocol (`redis://host:6379`).
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(connection_string: &str) -> Result<Self, Wis2Error> {
        let client = redis::Client::open(connection_string)
            .map_err(|e| Wis2Error::StoreUnavailable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| Wis2Error::StoreUnavailable(e.to_string()))?;
        Ok(Self { conn })
    }
}

async fn with_timeout<T>(
    fut: impl std::future::Future<Output = redis::RedisResult<T>>,
) -> Result<T, Wis2Error> {
    tokio::time::timeout(STORE_TIMEOUT, fut)
        .await
        .map_err(|_| Wis2Error::StoreUnavailable("timed out".to_string()))?
        .map_err(|e| Wis2Error::StoreUnavailable(e.to_string()))
}

#[async_trait]
impl DedupStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Wis2Error> {
        let mut conn = self.conn.clone();
        with_timeout(conn.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Wis2Error> {
        let mut conn = self.conn.clone();
        with_timeout(conn.set_ex(key, value, ttl.as_secs().max(1))).await
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, Wis2Error> {
        let mut conn = self.conn.clone();
        with_timeout(conn.incr(key, delta)).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, Wis2Error> {
        let mut conn = self.conn.clone();
        let opts = redis::SetOptions::default()
            .conditional_set(redis::ExistenceCheck::NX)
            .with_expiration(redis::SetExpiry::EX(ttl.as_secs().max(1) as usize));
        let result: Option<String> = with_timeout(conn.set_options(key, value, opts)).await?;
        Ok(result.is_some())
    }
}
