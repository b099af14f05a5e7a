use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use tracing::debug;

use super::{ExecutionState, SuspensionStore, suspension_key};
use crate::error::StoreError;

/// Stores suspensions as JSON strings with `SET key value EX ttl`, so other
/// services sharing the Redis instance see the same `flow_state:*` keys.
#[derive(Clone)]
pub struct RedisSuspensionStore {
    pool: Pool,
}

impl fmt::Debug for RedisSuspensionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisSuspensionStore")
            .field("status", &self.pool.status())
            .finish()
    }
}

impl RedisSuspensionStore {
    pub fn new(redis_url: &str) -> Result<Self, StoreError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn get_connection(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

/// `EX` takes whole seconds and rejects zero.
fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl SuspensionStore for RedisSuspensionStore {
    async fn get(&self, tenant_id: &str, user_id: &str) -> Result<Option<ExecutionState>, StoreError> {
        let mut conn = self.get_connection().await?;
        let raw: Option<String> = conn
            .get(suspension_key(tenant_id, user_id))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        tenant_id: &str,
        user_id: &str,
        state: &ExecutionState,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let key = suspension_key(tenant_id, user_id);
        let json = serde_json::to_string(state)?;
        let secs = expiry_secs(ttl);

        let mut conn = self.get_connection().await?;
        let _: () = conn
            .set_ex(&key, json, secs)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        debug!("Stored suspension: key={}, ttl={}s", key, secs);
        Ok(())
    }

    async fn delete(&self, tenant_id: &str, user_id: &str) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let _: () = conn
            .del(suspension_key(tenant_id, user_id))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
