use std::collections::HashMap;

use super::model::{Edge, FlowData, Node};

/// Lookup tables over a borrowed flow.
///
/// Outgoing edges keep the order they have in `flow.edges`. When two nodes
/// share an id the first one wins, matching [`FlowData::node`].
#[derive(Debug)]
pub struct FlowIndex<'a> {
    nodes: HashMap<&'a str, &'a Node>,
    outgoing: HashMap<&'a str, Vec<&'a Edge>>,
}

impl<'a> FlowIndex<'a> {
    pub fn new(flow: &'a FlowData) -> Self {
        let mut nodes = HashMap::with_capacity(flow.nodes.len());
        for node in &flow.nodes {
            nodes.entry(node.id.as_str()).or_insert(node);
        }
        let mut outgoing: HashMap<&'a str, Vec<&'a Edge>> = HashMap::new();
        for edge in &flow.edges {
            outgoing.entry(edge.source.as_str()).or_default().push(edge);
        }
        Self { nodes, outgoing }
    }

    pub fn node(&self, id: &str) -> Option<&'a Node> {
        self.nodes.get(id).copied()
    }

    pub fn outgoing(&self, id: &str) -> &[&'a Edge] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}
