//! Static checks of a flow graph. The engine tolerates every issue reported
//! here at runtime; validation exists so authors find them before users do.

use std::collections::{HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde::Serialize;
use thiserror::Error;

use super::model::{FlowData, LOGIC_FALSE, LOGIC_TRUE, NodeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    #[error("node id `{node_id}` is used more than once")]
    DuplicateNodeId { node_id: String },

    #[error("edge `{edge_id}` references missing node `{node_id}`")]
    DanglingEdge { edge_id: String, node_id: String },

    #[error("flow has no trigger node and can never start")]
    NoTrigger,

    #[error("trigger `{node_id}` has an empty keyword")]
    EmptyTriggerKeyword { node_id: String },

    #[error("edge `{edge_id}` leaves logic node `{node_id}` with label {label:?}, expected \"true\" or \"false\"")]
    InvalidLogicLabel {
        edge_id: String,
        node_id: String,
        label: Option<String>,
    },

    #[error("edge `{edge_id}` leaves router `{node_id}` with label {label:?} that is not one of its options")]
    UnknownRouterLabel {
        edge_id: String,
        node_id: String,
        label: Option<String>,
    },

    #[error("router `{node_id}` has no options")]
    RouterWithoutOptions { node_id: String },

    #[error("nodes {node_ids:?} form a cycle")]
    Cycle { node_ids: Vec<String> },

    #[error("node `{node_id}` cannot be reached from any trigger")]
    Unreachable { node_id: String },
}

impl ValidationIssue {
    pub fn severity(&self) -> Severity {
        match self {
            ValidationIssue::DuplicateNodeId { .. }
            | ValidationIssue::DanglingEdge { .. }
            | ValidationIssue::NoTrigger => Severity::Error,
            _ => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity() == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity() == Severity::Warning)
    }
}

pub fn validate(flow: &FlowData) -> ValidationReport {
    let mut issues = Vec::new();

    let mut graph: DiGraph<&str, &str> = DiGraph::new();
    let mut indices: HashMap<&str, NodeIndex> = HashMap::new();
    for node in &flow.nodes {
        if indices.contains_key(node.id.as_str()) {
            issues.push(ValidationIssue::DuplicateNodeId {
                node_id: node.id.clone(),
            });
            continue;
        }
        indices.insert(node.id.as_str(), graph.add_node(node.id.as_str()));
    }

    let triggers: Vec<&str> = flow.triggers().map(|n| n.id.as_str()).collect();
    for node in &flow.nodes {
        match &node.kind {
            NodeKind::Trigger(data) if data.keyword.trim().is_empty() => {
                issues.push(ValidationIssue::EmptyTriggerKeyword {
                    node_id: node.id.clone(),
                });
            }
            NodeKind::AiRouter(data) if data.options.is_empty() => {
                issues.push(ValidationIssue::RouterWithoutOptions {
                    node_id: node.id.clone(),
                });
            }
            _ => {}
        }
    }
    if triggers.is_empty() {
        issues.push(ValidationIssue::NoTrigger);
    }

    for edge in &flow.edges {
        let (Some(&from), Some(&to)) = (indices.get(edge.source.as_str()), indices.get(edge.target.as_str())) else {
            for end in [&edge.source, &edge.target] {
                if !indices.contains_key(end.as_str()) {
                    issues.push(ValidationIssue::DanglingEdge {
                        edge_id: edge.id.clone(),
                        node_id: end.clone(),
                    });
                }
            }
            continue;
        };
        graph.add_edge(from, to, edge.id.as_str());

        let label = edge.effective_label().map(|l| l.trim().to_lowercase());
        match flow.node(&edge.source).map(|n| &n.kind) {
            Some(NodeKind::Logic(_)) => {
                if !matches!(label.as_deref(), Some(LOGIC_TRUE) | Some(LOGIC_FALSE)) {
                    issues.push(ValidationIssue::InvalidLogicLabel {
                        edge_id: edge.id.clone(),
                        node_id: edge.source.clone(),
                        label: edge.effective_label().map(str::to_string),
                    });
                }
            }
            Some(NodeKind::AiRouter(data)) => {
                let known = label.as_deref().is_some_and(|l| {
                    data.options.iter().any(|o| o.label.trim().to_lowercase() == l)
                });
                if !known {
                    issues.push(ValidationIssue::UnknownRouterLabel {
                        edge_id: edge.id.clone(),
                        node_id: edge.source.clone(),
                        label: edge.effective_label().map(str::to_string),
                    });
                }
            }
            _ => {}
        }
    }

    for component in tarjan_scc(&graph) {
        let is_cycle = component.len() > 1
            || component
                .first()
                .is_some_and(|&n| graph.contains_edge(n, n));
        // a loop through a wait node pauses each time round, e.g. a retry prompt
        let waits = component
            .iter()
            .any(|&n| flow.node(graph[n]).is_some_and(|node| matches!(node.kind, NodeKind::WaitForInput)));
        if is_cycle && !waits {
            let mut node_ids: Vec<String> = component.iter().map(|&n| graph[n].to_string()).collect();
            node_ids.sort();
            issues.push(ValidationIssue::Cycle { node_ids });
        }
    }

    if !triggers.is_empty() {
        let mut reachable: HashSet<NodeIndex> = HashSet::new();
        for trigger in &triggers {
            if let Some(&start) = indices.get(trigger) {
                let mut dfs = Dfs::new(&graph, start);
                while let Some(n) = dfs.next(&graph) {
                    reachable.insert(n);
                }
            }
        }
        for idx in graph.node_indices() {
            if !reachable.contains(&idx) {
                issues.push(ValidationIssue::Unreachable {
                    node_id: graph[idx].to_string(),
                });
            }
        }
    }

    ValidationReport { issues }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{Edge, Node, RouterOption};

    fn kinds(report: &ValidationReport) -> Vec<String> {
        report
            .issues
            .iter()
            .map(|i| serde_json::to_value(i).unwrap()["kind"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_valid_flow_is_clean() {
        let flow = FlowData::new("f", "support", "t1")
            .add_node(Node::trigger("t", "help"))
            .add_node(Node::logic("l", "is_premium"))
            .add_node(Node::action("vip", "Priority line"))
            .add_node(Node::ai_router("r", vec![RouterOption::new("sales"), RouterOption::new("support")]))
            .add_node(Node::action("s", "Sales team"))
            .add_edge(Edge::new("e1", "t", "l"))
            .add_edge(Edge::labeled("e2", "l", "vip", "true"))
            .add_edge(Edge::labeled("e3", "l", "r", "False"))
            .add_edge(Edge::labeled("e4", "r", "s", "sales"));
        let report = validate(&flow);
        assert!(report.is_clean(), "{:?}", report.issues);
    }

    #[test]
    fn test_reports_structural_errors() {
        let flow = FlowData::new("f", "broken", "t1")
            .add_node(Node::action("a", "hi"))
            .add_node(Node::action("a", "again"))
            .add_edge(Edge::new("e1", "a", "ghost"));
        let report = validate(&flow);
        assert!(report.has_errors());
        let kinds = kinds(&report);
        assert!(kinds.contains(&"duplicate_node_id".to_string()));
        assert!(kinds.contains(&"dangling_edge".to_string()));
        assert!(kinds.contains(&"no_trigger".to_string()));
        // without a trigger reachability is not reported
        assert!(!kinds.contains(&"unreachable".to_string()));
    }

    #[test]
    fn test_reports_branch_labels() {
        let flow = FlowData::new("f", "labels", "t1")
            .add_node(Node::trigger("t", "go"))
            .add_node(Node::logic("l", "has_tag"))
            .add_node(Node::ai_router("r", vec![RouterOption::new("sales")]))
            .add_node(Node::action("a", "x"))
            .add_edge(Edge::new("e1", "t", "l"))
            .add_edge(Edge::labeled("e2", "l", "r", "yes"))
            .add_edge(Edge::new("e3", "l", "a"))
            .add_edge(Edge::labeled("e4", "r", "a", "refunds"));
        let report = validate(&flow);
        assert!(!report.has_errors());
        assert_eq!(
            kinds(&report),
            vec!["invalid_logic_label", "invalid_logic_label", "unknown_router_label"]
        );
    }

    #[test]
    fn test_reports_cycles_and_unreachable() {
        let flow = FlowData::new("f", "loops", "t1")
            .add_node(Node::trigger("t", "go"))
            .add_node(Node::action("a", "1"))
            .add_node(Node::action("b", "2"))
            .add_node(Node::action("orphan", "never"))
            .add_node(Node::trigger("t2", ""))
            .add_edge(Edge::new("e1", "t", "a"))
            .add_edge(Edge::new("e2", "a", "b"))
            .add_edge(Edge::new("e3", "b", "a"));
        let report = validate(&flow);
        assert!(report.issues.contains(&ValidationIssue::Cycle {
            node_ids: vec!["a".into(), "b".into()]
        }));
        assert!(report.issues.contains(&ValidationIssue::Unreachable {
            node_id: "orphan".into()
        }));
        assert!(report.issues.contains(&ValidationIssue::EmptyTriggerKeyword {
            node_id: "t2".into()
        }));
        assert_eq!(report.warnings().count(), report.issues.len());
    }

    #[test]
    fn test_loop_through_wait_node_is_not_a_cycle() {
        let flow = FlowData::new("f", "retry", "t1")
            .add_node(Node::trigger("t", "code"))
            .add_node(Node::wait_for_input("w"))
            .add_node(Node::logic("l", "is_premium"))
            .add_node(Node::action("retry", "Wrong, try again"))
            .add_node(Node::action("ok", "Welcome in"))
            .add_edge(Edge::new("e1", "t", "w"))
            .add_edge(Edge::new("e2", "w", "l"))
            .add_edge(Edge::labeled("e3", "l", "retry", "false"))
            .add_edge(Edge::labeled("e4", "l", "ok", "true"))
            .add_edge(Edge::new("e5", "retry", "w"));
        let report = validate(&flow);
        assert!(report.is_clean(), "{:?}", report.issues);
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let flow = FlowData::new("f", "self", "t1")
            .add_node(Node::trigger("t", "go"))
            .add_edge(Edge::new("e1", "t", "t"));
        let report = validate(&flow);
        assert_eq!(
            report.issues,
            vec![ValidationIssue::Cycle { node_ids: vec!["t".into()] }]
        );
    }
}
