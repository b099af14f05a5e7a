use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::model::FlowData;
use crate::context::ExecutionContext;
use crate::engine::{ExecutionOutcome, ExecutionReport, FlowEngine, find_trigger};
use crate::error::{EngineError, FlowError};
use crate::session::suspension_key;

/// Registry of loaded flows that routes inbound messages to them.
///
/// The engine assumes at most one in-flight call per `(tenant, user)`;
/// [`FlowManager::process_message`] enforces that with a keyed async mutex.
pub struct FlowManager {
    flows: DashMap<String, Arc<FlowData>>,
    engine: Arc<FlowEngine>,
    /// Held or awaited per-user locks, keyed like suspensions.
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FlowManager {
    pub fn new(engine: Arc<FlowEngine>) -> Arc<Self> {
        Arc::new(FlowManager {
            flows: DashMap::new(),
            engine,
            user_locks: DashMap::new(),
        })
    }

    pub fn engine(&self) -> &Arc<FlowEngine> {
        &self.engine
    }

    /// Adds or replaces a flow by id.
    pub fn register_flow(&self, flow: FlowData) {
        let id = flow.id.clone();
        if self.flows.insert(id.clone(), Arc::new(flow)).is_some() {
            info!("Replaced flow: {}", id);
        } else {
            info!("Registered flow: {}", id);
        }
    }

    pub fn remove_flow(&self, id: &str) -> Option<Arc<FlowData>> {
        let removed = self.flows.remove(id).map(|(_, flow)| flow);
        if removed.is_some() {
            info!("Removed flow: {}", id);
        }
        removed
    }

    pub fn flow(&self, id: &str) -> Option<Arc<FlowData>> {
        self.flows.get(id).map(|f| f.clone())
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Active flows of a tenant, ordered by id so routing is deterministic.
    pub fn flows_for_tenant(&self, tenant_id: &str) -> Vec<Arc<FlowData>> {
        let mut flows: Vec<Arc<FlowData>> = self
            .flows
            .iter()
            .filter(|f| f.is_active && f.tenant_id == tenant_id)
            .map(|f| f.clone())
            .collect();
        flows.sort_by(|a, b| a.id.cmp(&b.id));
        flows
    }

    /// Tenants with at least one registered flow, sorted.
    pub fn tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self.flows.iter().map(|f| f.tenant_id.clone()).collect();
        tenants.sort();
        tenants.dedup();
        tenants
    }

    pub fn load_flow_from_file(path: &Path) -> Result<FlowData, FlowError> {
        let contents = fs::read_to_string(path)?;
        match extension(path).as_str() {
            "json" => Ok(serde_json::from_str(&contents)?),
            "yaml" | "yml" => Ok(serde_yaml_bw::from_str(&contents)?),
            other => Err(FlowError::UnsupportedExtension(other.to_string())),
        }
    }

    pub fn save_flow_to_file(path: &Path, flow: &FlowData) -> Result<(), FlowError> {
        let contents = match extension(path).as_str() {
            "json" => serde_json::to_string_pretty(flow)?,
            "yaml" | "yml" => serde_yaml_bw::to_string(flow)?,
            other => return Err(FlowError::UnsupportedExtension(other.to_string())),
        };
        fs::write(path, contents)?;
        Ok(())
    }

    /// Registers every flow file in `dir`. Files that fail to parse are
    /// logged and skipped. Returns how many flows were registered.
    pub async fn load_all_flows_from_dir(&self, dir: &Path) -> anyhow::Result<usize> {
        let entries = fs::read_dir(dir).with_context(|| format!("could not read flow directory {}", dir.display()))?;
        let mut loaded = 0;
        for entry in entries {
            let path = entry?.path();
            if !matches!(extension(&path).as_str(), "json" | "yaml" | "yml") {
                continue;
            }
            match Self::load_flow_from_file(&path) {
                Ok(flow) => {
                    self.register_flow(flow);
                    loaded += 1;
                }
                Err(e) => error!("Failed to load {}: {}", path.display(), e),
            }
        }
        Ok(loaded)
    }

    /// Hands the message to the flow that should see it: the one the sender
    /// is suspended in, otherwise the first active flow of the tenant whose
    /// trigger matches. Returns `None` when no flow engaged.
    #[tracing::instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, user_id = %ctx.sender.jid))]
    pub async fn process_message(&self, ctx: &ExecutionContext) -> Option<ExecutionReport> {
        let key = suspension_key(&ctx.tenant_id, ctx.user_id());
        let lock = self.user_locks.entry(key.clone()).or_default().clone();
        let report = {
            let _guard = lock.lock().await;
            self.route(ctx).await
        };
        // map + ours: nobody else holds or waits on it
        self.user_locks.remove_if(&key, |_, l| Arc::strong_count(l) == 2);
        report
    }

    async fn route(&self, ctx: &ExecutionContext) -> Option<ExecutionReport> {
        let flows = self.flows_for_tenant(&ctx.tenant_id);
        let store = self.engine.store();

        match store.get(&ctx.tenant_id, ctx.user_id()).await {
            Ok(Some(state)) => match flows.iter().find(|f| f.id == state.flow_id) {
                Some(flow) => {
                    let report = self.engine.execute_flow_with_report(flow, ctx).await;
                    if report.outcome != ExecutionOutcome::NotEngaged {
                        return Some(report);
                    }
                }
                None => {
                    warn!(flow_id = %state.flow_id, "suspended flow is not loaded or inactive, discarding state");
                    if let Err(e) = store.delete(&ctx.tenant_id, ctx.user_id()).await {
                        warn!("{}", EngineError::CacheWrite(e));
                    }
                }
            },
            Ok(None) => {}
            Err(e) => warn!("{}", EngineError::CacheRead(e)),
        }

        let flow = flows.iter().find(|f| find_trigger(f, &ctx.body).is_some())?;
        debug!(flow_id = %flow.id, "trigger matched");
        Some(self.engine.execute_flow_with_report(flow, ctx).await)
    }

    pub fn shutdown_all(&self) {
        let count = self.flows.len();
        self.flows.clear();
        self.user_locks.clear();
        info!("Shut down {} flows", count);
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|os| os.to_str())
        .unwrap_or_default()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::EngineConfig;
    use crate::context::Sender;
    use crate::flow::{Edge, Node};
    use crate::session::InMemorySuspensionStore;
    use crate::testing::RecordingReplier;
    use tempfile::tempdir;

    fn manager() -> Arc<FlowManager> {
        let engine = FlowEngine::new(InMemorySuspensionStore::new(), EngineConfig::default());
        FlowManager::new(Arc::new(engine))
    }

    fn sample() -> FlowData {
        FlowData::new("welcome", "Welcome", "t1")
            .add_node(Node::trigger("n1", "hello"))
            .add_node(Node::action("n2", "Hi there!"))
            .add_edge(Edge::new("e1", "n1", "n2"))
    }

    #[test]
    fn test_file_roundtrip_json_and_yaml() {
        let dir = tempdir().unwrap();
        let flow = sample();
        for name in ["welcome.json", "welcome.yaml", "welcome.yml"] {
            let path = dir.path().join(name);
            FlowManager::save_flow_to_file(&path, &flow).unwrap();
            let loaded = FlowManager::load_flow_from_file(&path).unwrap();
            assert_eq!(loaded, flow, "{name}");
        }
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("welcome.toml");
        let err = FlowManager::save_flow_to_file(&path, &sample()).unwrap_err();
        assert!(matches!(err, FlowError::UnsupportedExtension(ext) if ext == "toml"));
    }

    #[tokio::test]
    async fn test_load_dir_skips_broken_and_foreign_files() {
        let dir = tempdir().unwrap();
        FlowManager::save_flow_to_file(&dir.path().join("a.json"), &sample()).unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let mgr = manager();
        let loaded = mgr.load_all_flows_from_dir(dir.path()).await.unwrap();
        assert_eq!(loaded, 1);
        assert!(mgr.flow("welcome").is_some());
    }

    #[tokio::test]
    async fn test_user_lock_lives_while_held() {
        let mgr = manager();
        mgr.register_flow(sample());
        let key = suspension_key("t1", "u1");
        let ctx = ExecutionContext::new("t1", Sender::new("u1"), "hello", RecordingReplier::new());

        let held = mgr.user_locks.entry(key.clone()).or_default().clone();
        let guard = held.lock().await;
        let pending = tokio::spawn({
            let mgr = mgr.clone();
            let ctx = ctx.clone();
            async move { mgr.process_message(&ctx).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());
        assert!(mgr.user_locks.contains_key(&key));

        drop(guard);
        drop(held);
        let report = pending.await.unwrap().unwrap();
        assert_eq!(report.flow_id, "welcome");
        assert!(mgr.user_locks.is_empty());

        mgr.process_message(&ctx).await;
        assert!(mgr.user_locks.is_empty());
    }

    #[test]
    fn test_flows_for_tenant_filters_inactive_and_other_tenants() {
        let mgr = manager();
        mgr.register_flow(FlowData::new("b", "b", "t1"));
        mgr.register_flow(FlowData::new("a", "a", "t1"));
        mgr.register_flow(FlowData::new("c", "c", "t1").with_active(false));
        mgr.register_flow(FlowData::new("d", "d", "t2"));

        let ids: Vec<String> = mgr.flows_for_tenant("t1").iter().map(|f| f.id.clone()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(mgr.len(), 4);
        assert_eq!(mgr.tenants(), vec!["t1", "t2"]);

        assert!(mgr.remove_flow("a").is_some());
        assert!(mgr.remove_flow("a").is_none());
        mgr.shutdown_all();
        assert!(mgr.is_empty());
    }
}
