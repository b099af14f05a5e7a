use crate::flow::{FlowData, Node, NodeKind};

/// Keyword comparison form: surrounding whitespace dropped, lower-cased.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// First trigger, in node-array order, whose keyword equals the message.
///
/// Matching is exact after [`normalize`]; a trigger with a blank keyword
/// never matches.
pub fn find_trigger<'a>(flow: &'a FlowData, body: &str) -> Option<&'a Node> {
    let body = normalize(body);
    flow.nodes.iter().find(|node| match &node.kind {
        NodeKind::Trigger(data) => {
            let keyword = normalize(&data.keyword);
            !keyword.is_empty() && keyword == body
        }
        _ => false,
    })
}
