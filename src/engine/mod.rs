//! The flow interpreter.
//!
//! [`FlowEngine::execute_flow`] takes one inbound message and one flow and
//! either resumes a suspended run of that flow, starts it from a matching
//! trigger, or does nothing. Traversal is depth-first and sequential; a
//! `wait_for_input` node parks the run in the [`SuspensionStore`] until the
//! user's next message.
//!
//! [`SuspensionStore`]: crate::session::SuspensionStore

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::error::EngineError;
use crate::flow::{FlowData, Node};
use crate::session::SuspensionStoreRef;

pub mod handlers;
pub mod report;
pub mod trigger;
mod walker;

pub use handlers::HandlerResult;
pub use report::{ExecutionOutcome, ExecutionReport, NodeRecord, NodeStatus};
pub use trigger::find_trigger;

use walker::GraphWalker;

/// Target of the per-invocation JSON event.
pub const FLOW_EVENT_TARGET: &str = "flow_event";

#[derive(Debug, Clone)]
pub struct FlowEngine {
    store: SuspensionStoreRef,
    config: EngineConfig,
}

impl FlowEngine {
    pub fn new(store: SuspensionStoreRef, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &SuspensionStoreRef {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns whether the flow engaged on this message. Never fails: errors
    /// are logged and reported as `false`.
    pub async fn execute_flow(&self, flow: &FlowData, ctx: &ExecutionContext) -> bool {
        self.execute_flow_with_report(flow, ctx).await.engaged()
    }

    #[tracing::instrument(
        name = "execute_flow",
        skip(self, flow, ctx),
        fields(flow_id = %flow.id, tenant_id = %ctx.tenant_id, user_id = %ctx.sender.jid)
    )]
    pub async fn execute_flow_with_report(&self, flow: &FlowData, ctx: &ExecutionContext) -> ExecutionReport {
        let start = Instant::now();

        let (entry, resumed) = match self.resume_point(flow, ctx).await {
            Some(node) => (node, true),
            None => match find_trigger(flow, &ctx.body) {
                Some(node) => (node, false),
                None => {
                    debug!("no trigger matched");
                    return ExecutionReport::not_engaged(&flow.id, elapsed_ms(start));
                }
            },
        };
        info!(node_id = %entry.id, resumed, "flow engaged");

        let mut walker = GraphWalker::new(flow, ctx, self.store.as_ref(), &self.config);
        let result = if resumed {
            walker.resume(entry).await
        } else {
            walker.start(entry).await
        };

        let outcome = match result {
            Ok(()) => match walker.suspended_at() {
                Some(node_id) => ExecutionOutcome::Suspended {
                    node_id: node_id.to_string(),
                },
                None => ExecutionOutcome::Completed,
            },
            Err(e) => {
                warn!("flow execution failed: {}", e);
                ExecutionOutcome::Failed { reason: e.to_string() }
            }
        };
        let replies = walker.replies();
        let report = ExecutionReport {
            flow_id: flow.id.clone(),
            outcome,
            resumed,
            records: walker.into_records(),
            replies,
            elapsed_ms: elapsed_ms(start),
        };

        tracing::event!(
            target: FLOW_EVENT_TARGET,
            tracing::Level::INFO,
            flow_id = %report.flow_id,
            tenant_id = %ctx.tenant_id,
            outcome = report.outcome.label(),
            resumed = report.resumed,
            nodes = report.records.len(),
            replies = report.replies,
            elapsed_ms = report.elapsed_ms,
        );
        report
    }

    /// The node to continue from if the sender has a suspended run of
    /// `flow`. A state found here is consumed.
    async fn resume_point<'a>(&self, flow: &'a FlowData, ctx: &ExecutionContext) -> Option<&'a Node> {
        let user_id = ctx.user_id();
        let state = match self.store.get(&ctx.tenant_id, user_id).await {
            Ok(Some(state)) => state,
            Ok(None) => return None,
            Err(e) => {
                warn!("{}", EngineError::CacheRead(e));
                return None;
            }
        };

        if state.flow_id != flow.id {
            debug!(suspended_flow = %state.flow_id, "sender is suspended in another flow");
            return None;
        }

        if let Err(e) = self.store.delete(&ctx.tenant_id, user_id).await {
            warn!("{}", EngineError::CacheWrite(e));
        }

        let node = flow.node(&state.current_node_id);
        if node.is_none() {
            warn!(node_id = %state.current_node_id, "discarding stale suspension, node no longer exists");
        }
        node
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
