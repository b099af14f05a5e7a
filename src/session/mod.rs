//! Suspension state: where a paused flow is waiting for the user's next
//! message.
//!
//! One entry per `(tenant, user)` lives in an injected [`SuspensionStore`]
//! under the key produced by [`suspension_key`]. Entries are single-use: the
//! engine deletes them as soon as they are read back for a resume.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::InMemorySuspensionStore;
#[cfg(feature = "redis")]
pub use redis::RedisSuspensionStore;

/// Default lifetime of a suspension, one hour.
pub const DEFAULT_SUSPENSION_TTL: Duration = Duration::from_secs(3600);

pub type SuspensionStoreRef = Arc<dyn SuspensionStore>;

/// Paused position inside a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub flow_id: String,
    /// The `wait_for_input` node the flow is parked on.
    pub current_node_id: String,
    pub tenant_id: String,
    pub user_id: String,
    #[serde(default = "Utc::now")]
    pub suspended_at: DateTime<Utc>,
}

impl ExecutionState {
    pub fn new(
        flow_id: impl Into<String>,
        current_node_id: impl Into<String>,
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            flow_id: flow_id.into(),
            current_node_id: current_node_id.into(),
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            suspended_at: Utc::now(),
        }
    }
}

/// Storage key shared with other services reading the same backend.
pub fn suspension_key(tenant_id: &str, user_id: &str) -> String {
    format!("flow_state:{}:{}", tenant_id, user_id)
}

#[async_trait]
pub trait SuspensionStore: Send + Sync + Debug {
    async fn get(&self, tenant_id: &str, user_id: &str)
    -> Result<Option<ExecutionState>, StoreError>;

    /// Stores `state`, replacing any previous entry for the pair.
    async fn set(
        &self,
        tenant_id: &str,
        user_id: &str,
        state: &ExecutionState,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Removes the entry. Deleting a missing entry is not an error.
    async fn delete(&self, tenant_id: &str, user_id: &str) -> Result<(), StoreError>;
}
