use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FlowError;

/// A tenant-authored flow as stored by the builder.
///
/// The engine never mutates a flow; one `FlowData` is shared read-only by
/// every invocation that runs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlowData {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub tenant_id: String,
    #[schemars(with = "Vec<RawNode>")]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl FlowData {
    /// Create an empty, active flow.
    pub fn new(id: impl Into<String>, name: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            is_active: true,
            tenant_id: tenant_id.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn add_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn triggers(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.node_type() == NodeType::Trigger)
    }
}

/// Edge labels consumed by logic nodes.
pub const LOGIC_TRUE: &str = "true";
pub const LOGIC_FALSE: &str = "false";

/// The six node types a flow can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Trigger,
    Action,
    Logic,
    Ai,
    AiRouter,
    WaitForInput,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Trigger => "trigger",
            NodeType::Action => "action",
            NodeType::Logic => "logic",
            NodeType::Ai => "ai",
            NodeType::AiRouter => "ai_router",
            NodeType::WaitForInput => "wait_for_input",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of the flow graph. `kind` carries the type-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Trigger(TriggerData),
    Action(ActionData),
    Logic(LogicData),
    Ai(AiData),
    AiRouter(AiRouterData),
    WaitForInput,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerData {
    pub keyword: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionData {
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogicData {
    pub condition: LogicCondition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Named conditions understood by logic nodes. Anything else is kept
/// verbatim and evaluates to `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogicCondition {
    #[default]
    IsPremium,
    HasTag,
    Unknown(String),
}

impl From<String> for LogicCondition {
    fn from(name: String) -> Self {
        match name.trim().to_lowercase().as_str() {
            "is_premium" => LogicCondition::IsPremium,
            "has_tag" => LogicCondition::HasTag,
            _ => LogicCondition::Unknown(name),
        }
    }
}

impl From<LogicCondition> for String {
    fn from(condition: LogicCondition) -> Self {
        match condition {
            LogicCondition::IsPremium => "is_premium".to_string(),
            LogicCondition::HasTag => "has_tag".to_string(),
            LogicCondition::Unknown(name) => name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiData {
    pub prompt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiRouterData {
    pub options: Vec<RouterOption>,
    /// Extra instructions prepended to the classification prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterOption {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RouterOption {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self { id: id.into(), kind }
    }

    pub fn trigger(id: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Trigger(TriggerData { keyword: keyword.into() }))
    }

    pub fn action(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Action(ActionData { message: message.into() }))
    }

    pub fn logic(id: impl Into<String>, condition: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::Logic(LogicData {
                condition: LogicCondition::from(condition.into()),
                tag: None,
            }),
        )
    }

    pub fn has_tag(id: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::Logic(LogicData {
                condition: LogicCondition::HasTag,
                tag: Some(tag.into()),
            }),
        )
    }

    pub fn ai(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Ai(AiData { prompt: prompt.into() }))
    }

    pub fn ai_router(id: impl Into<String>, options: Vec<RouterOption>) -> Self {
        Self::new(id, NodeKind::AiRouter(AiRouterData { options, prompt: None }))
    }

    pub fn wait_for_input(id: impl Into<String>) -> Self {
        Self::new(id, NodeKind::WaitForInput)
    }

    pub fn node_type(&self) -> NodeType {
        match self.kind {
            NodeKind::Trigger(_) => NodeType::Trigger,
            NodeKind::Action(_) => NodeType::Action,
            NodeKind::Logic(_) => NodeType::Logic,
            NodeKind::Ai(_) => NodeType::Ai,
            NodeKind::AiRouter(_) => NodeType::AiRouter,
            NodeKind::WaitForInput => NodeType::WaitForInput,
        }
    }
}

/// Wire shape of a node: `{ "id", "type", "data" }`. The builder stores UI
/// state (`label`, `executing`, ...) inside `data`, which is ignored here.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RawNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub data: Value,
}

fn payload<T: serde::de::DeserializeOwned>(node_id: &str, data: Value) -> Result<T, FlowError> {
    let data = if data.is_null() {
        Value::Object(Default::default())
    } else {
        data
    };
    serde_json::from_value(data).map_err(|e| FlowError::InvalidNode {
        node_id: node_id.to_string(),
        reason: e.to_string(),
    })
}

impl TryFrom<RawNode> for Node {
    type Error = FlowError;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        let id = raw.id;
        let kind = match raw.node_type {
            NodeType::Trigger => NodeKind::Trigger(payload(&id, raw.data)?),
            NodeType::Action => NodeKind::Action(payload(&id, raw.data)?),
            NodeType::Logic => NodeKind::Logic(payload(&id, raw.data)?),
            NodeType::Ai => NodeKind::Ai(payload(&id, raw.data)?),
            NodeType::AiRouter => NodeKind::AiRouter(payload(&id, raw.data)?),
            NodeType::WaitForInput => NodeKind::WaitForInput,
        };
        Ok(Node { id, kind })
    }
}

impl From<Node> for RawNode {
    fn from(node: Node) -> Self {
        let node_type = node.node_type();
        let data = match node.kind {
            NodeKind::Trigger(d) => serde_json::to_value(d),
            NodeKind::Action(d) => serde_json::to_value(d),
            NodeKind::Logic(d) => serde_json::to_value(d),
            NodeKind::Ai(d) => serde_json::to_value(d),
            NodeKind::AiRouter(d) => serde_json::to_value(d),
            NodeKind::WaitForInput => Ok(Value::Object(Default::default())),
        }
        .unwrap_or_default();
        RawNode {
            id: node.id,
            node_type,
            data,
        }
    }
}

/// A directed connection. Labels only matter when the source is a branching
/// node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Handle id set by the visual builder; used when `label` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            label: None,
            source_handle: None,
        }
    }

    pub fn labeled(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::new(id, source, target)
        }
    }

    pub fn effective_label(&self) -> Option<&str> {
        self.label
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .or(self.source_handle.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_builder_flow() {
        let flow: FlowData = serde_json::from_value(json!({
            "id": "flow1",
            "name": "Welcome Flow",
            "isActive": true,
            "tenantId": "tenant1",
            "nodes": [
                { "id": "n1", "type": "trigger", "data": { "keyword": "hello", "executing": false } },
                { "id": "n2", "type": "action", "data": { "message": "Hi there!" } },
                { "id": "n3", "type": "logic", "data": { "condition": "has_tag", "tag": "vip" } },
                { "id": "n4", "type": "ai_router", "data": { "options": [{ "label": "sales" }, { "label": "support", "description": "help" }] } },
                { "id": "n5", "type": "wait_for_input" }
            ],
            "edges": [
                { "id": "e1", "source": "n1", "target": "n2" },
                { "id": "e2", "source": "n3", "target": "n2", "sourceHandle": "true" }
            ]
        }))
        .unwrap();

        assert_eq!(flow.nodes.len(), 5);
        assert_eq!(flow.nodes[0].kind, NodeKind::Trigger(TriggerData { keyword: "hello".into() }));
        assert_eq!(flow.nodes[4].node_type(), NodeType::WaitForInput);
        match &flow.nodes[2].kind {
            NodeKind::Logic(data) => {
                assert_eq!(data.condition, LogicCondition::HasTag);
                assert_eq!(data.tag.as_deref(), Some("vip"));
            }
            other => panic!("unexpected kind {other:?}"),
        }
        match &flow.nodes[3].kind {
            NodeKind::AiRouter(data) => {
                assert_eq!(data.options.len(), 2);
                assert_eq!(data.options[1].description.as_deref(), Some("help"));
            }
            other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(flow.edges[0].effective_label(), None);
        assert_eq!(flow.edges[1].effective_label(), Some("true"));
    }

    #[test]
    fn test_logic_defaults_to_is_premium() {
        let node: Node = serde_json::from_value(json!({ "id": "l", "type": "logic", "data": { "label": "logic node" } })).unwrap();
        assert_eq!(
            node.kind,
            NodeKind::Logic(LogicData { condition: LogicCondition::IsPremium, tag: None })
        );
    }

    #[test]
    fn test_blank_label_falls_back_to_source_handle() {
        let edge: Edge = serde_json::from_value(json!({
            "id": "e1", "source": "l", "target": "a", "label": "  ", "sourceHandle": "false"
        }))
        .unwrap();
        assert_eq!(edge.effective_label(), Some("false"));
        assert_eq!(Edge::labeled("e2", "l", "a", "").effective_label(), None);
        assert_eq!(Edge::labeled("e3", "l", "a", "true").effective_label(), Some("true"));
    }

    #[test]
    fn test_unknown_condition_is_preserved() {
        let node = Node::logic("l", "is_weekend");
        let raw = RawNode::from(node);
        assert_eq!(raw.data["condition"], json!("is_weekend"));
    }

    #[test]
    fn test_invalid_payload_is_rejected() {
        let res: Result<Node, _> = serde_json::from_value(json!({ "id": "a", "type": "action", "data": { "message": 42 } }));
        let err = res.unwrap_err().to_string();
        assert!(err.contains("invalid node `a`"), "{err}");
    }

    #[test]
    fn test_unknown_node_type_is_rejected() {
        let res: Result<Node, _> = serde_json::from_value(json!({ "id": "x", "type": "http_call", "data": {} }));
        assert!(res.is_err());
    }

    #[test]
    fn test_node_roundtrip_keeps_shape() {
        let node = Node::ai_router("r", vec![RouterOption::new("sales").with_description("buying")]);
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], json!("ai_router"));
        assert_eq!(value["data"]["options"][0]["label"], json!("sales"));
        let back: Node = serde_json::from_value(value).unwrap();
        assert_eq!(back, node);
    }
}
