use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use tracing::debug;

use super::{ExecutionState, SuspensionStore, suspension_key};
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct Entry {
    state: ExecutionState,
    ttl: Duration,
}

/// Each entry expires after the ttl it was written with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Process-local store backed by a moka cache.
#[derive(Clone, Debug)]
pub struct InMemorySuspensionStore {
    cache: Cache<String, Entry>, // flow_state:{tenant}:{user} → paused position
}

impl InMemorySuspensionStore {
    pub fn new() -> Arc<Self> {
        let cache = Cache::builder()
            .expire_after(PerEntryTtl)
            .eviction_listener(|key: Arc<String>, _value: Entry, cause| {
                debug!("Suspension removed: key={}, cause={:?}", key, cause);
            })
            .build();
        Arc::new(Self { cache })
    }

    pub fn contains(&self, tenant_id: &str, user_id: &str) -> bool {
        self.cache.contains_key(&suspension_key(tenant_id, user_id))
    }
}

#[async_trait]
impl SuspensionStore for InMemorySuspensionStore {
    async fn get(&self, tenant_id: &str, user_id: &str) -> Result<Option<ExecutionState>, StoreError> {
        Ok(self
            .cache
            .get(&suspension_key(tenant_id, user_id))
            .await
            .map(|entry| entry.state))
    }

    async fn set(
        &self,
        tenant_id: &str,
        user_id: &str,
        state: &ExecutionState,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let entry = Entry {
            state: state.clone(),
            ttl,
        };
        self.cache.insert(suspension_key(tenant_id, user_id), entry).await;
        Ok(())
    }

    async fn delete(&self, tenant_id: &str, user_id: &str) -> Result<(), StoreError> {
        self.cache.invalidate(&suspension_key(tenant_id, user_id)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = InMemorySuspensionStore::new();
        let state = ExecutionState::new("f1", "w1", "t1", "u1");

        assert!(store.get("t1", "u1").await.unwrap().is_none());
        store.set("t1", "u1", &state, Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("t1", "u1").await.unwrap(), Some(state));
        assert!(store.get("t2", "u1").await.unwrap().is_none());

        store.delete("t1", "u1").await.unwrap();
        assert!(store.get("t1", "u1").await.unwrap().is_none());
        // deleting twice is fine
        store.delete("t1", "u1").await.unwrap();
    }

    #[tokio::test]
    async fn test_overwrite_keeps_one_entry_per_user() {
        let store = InMemorySuspensionStore::new();
        let first = ExecutionState::new("f1", "w1", "t1", "u1");
        let second = ExecutionState::new("f2", "w9", "t1", "u1");

        store.set("t1", "u1", &first, Duration::from_secs(60)).await.unwrap();
        store.set("t1", "u1", &second, Duration::from_secs(60)).await.unwrap();

        let got = store.get("t1", "u1").await.unwrap().unwrap();
        assert_eq!(got.flow_id, "f2");
        assert_eq!(got.current_node_id, "w9");
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let store = InMemorySuspensionStore::new();
        let state = ExecutionState::new("f1", "w1", "t1", "u1");
        store.set("t1", "u1", &state, Duration::from_millis(50)).await.unwrap();
        assert!(store.contains("t1", "u1"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.get("t1", "u1").await.unwrap().is_none());
    }
}
