use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use super::handlers::{self, HandlerResult};
use super::report::{NodeRecord, NodeStatus};
use crate::config::EngineConfig;
use crate::context::{ExecutionContext, Replier, ReplyReceipt};
use crate::error::{EngineError, ReplyError};
use crate::flow::{Edge, FlowData, FlowIndex, LOGIC_FALSE, LOGIC_TRUE, Node, NodeKind};
use crate::session::{ExecutionState, SuspensionStore};

/// Counts delivered replies for the execution report.
#[derive(Debug)]
struct CountingReplier {
    inner: Arc<dyn Replier>,
    sent: AtomicUsize,
}

#[async_trait]
impl Replier for CountingReplier {
    async fn reply(&self, text: &str) -> Result<ReplyReceipt, ReplyError> {
        let receipt = self.inner.reply(text).await?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(receipt)
    }
}

/// Depth-first traversal of one flow for one inbound message.
pub(crate) struct GraphWalker<'a> {
    flow: &'a FlowData,
    index: FlowIndex<'a>,
    ctx: ExecutionContext,
    replies: Arc<CountingReplier>,
    store: &'a dyn SuspensionStore,
    config: &'a EngineConfig,
    visited: HashSet<String>,
    records: Vec<NodeRecord>,
    suspended_at: Option<String>,
}

impl<'a> GraphWalker<'a> {
    pub fn new(
        flow: &'a FlowData,
        ctx: &ExecutionContext,
        store: &'a dyn SuspensionStore,
        config: &'a EngineConfig,
    ) -> Self {
        let replies = Arc::new(CountingReplier {
            inner: ctx.replier.clone(),
            sent: AtomicUsize::new(0),
        });
        let mut ctx = ctx.clone();
        ctx.replier = replies.clone();
        Self {
            flow,
            index: FlowIndex::new(flow),
            ctx,
            replies,
            store,
            config,
            visited: HashSet::new(),
            records: Vec::new(),
            suspended_at: None,
        }
    }

    /// Runs the trigger's handler, then everything reachable from it.
    pub async fn start(&mut self, trigger: &'a Node) -> Result<(), EngineError> {
        self.visited.insert(trigger.id.clone());
        if self.run_node(trigger).await? == HandlerResult::Suspend {
            self.suspend(trigger).await;
            return Ok(());
        }
        self.walk(trigger).await
    }

    /// Continues after a suspended node without running it again.
    pub async fn resume(&mut self, from: &'a Node) -> Result<(), EngineError> {
        self.visited.insert(from.id.clone());
        self.walk(from).await
    }

    pub fn into_records(self) -> Vec<NodeRecord> {
        self.records
    }

    pub fn replies(&self) -> usize {
        self.replies.sent.load(Ordering::Relaxed)
    }

    /// The last node a branch suspended on, if any.
    pub fn suspended_at(&self) -> Option<&str> {
        self.suspended_at.as_deref()
    }

    fn walk<'s>(&'s mut self, node: &'a Node) -> BoxFuture<'s, Result<(), EngineError>> {
        async move {
            let edges = self.select_edges(node).await;
            for edge in edges {
                let Some(target) = self.index.node(&edge.target) else {
                    let err = EngineError::NodeReference {
                        edge_id: edge.id.clone(),
                        node_id: edge.target.clone(),
                    };
                    warn!(flow_id = %self.flow.id, "{}", err);
                    continue;
                };
                // a wait node ends its branch, so re-asking on a loop back is safe
                let waits = matches!(target.kind, NodeKind::WaitForInput);
                if !self.visited.insert(target.id.clone()) && !waits {
                    let err = EngineError::CycleDetected(target.id.clone());
                    warn!(flow_id = %self.flow.id, edge_id = %edge.id, "{}", err);
                    continue;
                }

                match self.run_node(target).await? {
                    HandlerResult::Suspend => self.suspend(target).await,
                    HandlerResult::Continue => self.walk(target).await?,
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Outbound edges to follow from `node`, in edge-array order.
    async fn select_edges(&self, node: &'a Node) -> Vec<&'a Edge> {
        let outgoing = self.index.outgoing(&node.id);
        match &node.kind {
            NodeKind::Logic(data) => {
                let outcome = handlers::evaluate_condition(data, &self.ctx, self.config);
                let wanted = if outcome { LOGIC_TRUE } else { LOGIC_FALSE };
                debug!(node_id = %node.id, condition = ?data.condition, outcome, "logic evaluated");
                outgoing
                    .iter()
                    .copied()
                    .filter(|e| e.effective_label().is_some_and(|l| handlers::labels_match(l, wanted)))
                    .collect()
            }
            NodeKind::AiRouter(data) => match handlers::classify(node, data, &self.ctx).await {
                Some(label) => {
                    debug!(node_id = %node.id, label = %label, "router classified");
                    outgoing
                        .iter()
                        .copied()
                        .filter(|e| e.effective_label().is_some_and(|l| handlers::labels_match(l, &label)))
                        .collect()
                }
                None => Vec::new(),
            },
            _ => outgoing.to_vec(),
        }
    }

    async fn run_node(&mut self, node: &'a Node) -> Result<HandlerResult, EngineError> {
        let started_at = Utc::now();
        let result = handlers::dispatch(node, &self.ctx).await;
        let status = match &result {
            Ok(HandlerResult::Continue) => NodeStatus::Continued,
            Ok(HandlerResult::Suspend) => NodeStatus::Suspended,
            Err(_) => NodeStatus::Failed,
        };
        self.records.push(NodeRecord {
            node_id: node.id.clone(),
            node_type: node.node_type(),
            started_at,
            finished_at: Utc::now(),
            status,
        });
        result
    }

    /// Persists the pause point. A failed write is logged and the walk still
    /// counts as engaged.
    async fn suspend(&mut self, node: &'a Node) {
        let state = ExecutionState::new(
            self.flow.id.clone(),
            node.id.clone(),
            self.ctx.tenant_id.clone(),
            self.ctx.user_id(),
        );
        match self
            .store
            .set(&self.ctx.tenant_id, self.ctx.user_id(), &state, self.config.suspension_ttl)
            .await
        {
            Ok(()) => info!(flow_id = %self.flow.id, node_id = %node.id, "flow suspended"),
            Err(e) => warn!(flow_id = %self.flow.id, node_id = %node.id, "{}", EngineError::CacheWrite(e)),
        }
        self.suspended_at = Some(node.id.clone());
    }
}
