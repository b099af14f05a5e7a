use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::NodeType;

/// Terminal state of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// No resume and no trigger matched. Nothing happened.
    NotEngaged,
    Completed,
    /// Paused on a `wait_for_input` node.
    Suspended { node_id: String },
    /// Traversal stopped on an error that could not be absorbed.
    Failed { reason: String },
}

impl ExecutionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionOutcome::NotEngaged => "not_engaged",
            ExecutionOutcome::Completed => "completed",
            ExecutionOutcome::Suspended { .. } => "suspended",
            ExecutionOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Continued,
    Suspended,
    Failed,
}

/// One handler invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub node_id: String,
    pub node_type: NodeType,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: NodeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub flow_id: String,
    pub outcome: ExecutionOutcome,
    /// Whether traversal continued a suspended run.
    pub resumed: bool,
    pub records: Vec<NodeRecord>,
    pub replies: usize,
    pub elapsed_ms: u64,
}

impl ExecutionReport {
    pub fn not_engaged(flow_id: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            flow_id: flow_id.into(),
            outcome: ExecutionOutcome::NotEngaged,
            resumed: false,
            records: Vec::new(),
            replies: 0,
            elapsed_ms,
        }
    }

    /// True once traversal started and no reply failed.
    pub fn engaged(&self) -> bool {
        matches!(
            self.outcome,
            ExecutionOutcome::Completed | ExecutionOutcome::Suspended { .. }
        )
    }

    /// Node ids in the order their handlers ran.
    pub fn visited(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.node_id.as_str()).collect()
    }
}
