//! Per-type node behavior and branch selection helpers.

use regex::RegexSet;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::error::{AiError, EngineError};
use crate::flow::{AiData, AiRouterData, LogicCondition, LogicData, Node, NodeKind, RouterOption};

/// What the walker does after a node's handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResult {
    Continue,
    Suspend,
}

/// Runs the side effect of `node`.
///
/// Only a failed reply is returned as an error. AI failures are logged and
/// the node continues without output.
pub async fn dispatch(node: &Node, ctx: &ExecutionContext) -> Result<HandlerResult, EngineError> {
    match &node.kind {
        NodeKind::Trigger(_) | NodeKind::Logic(_) | NodeKind::AiRouter(_) => Ok(HandlerResult::Continue),
        NodeKind::Action(data) => {
            if data.message.is_empty() {
                debug!(node_id = %node.id, "action without message, nothing to send");
            } else {
                ctx.replier.reply(&data.message).await?;
            }
            Ok(HandlerResult::Continue)
        }
        NodeKind::Ai(data) => {
            run_ai(node, data, ctx).await?;
            Ok(HandlerResult::Continue)
        }
        NodeKind::WaitForInput => Ok(HandlerResult::Suspend),
    }
}

async fn run_ai(node: &Node, data: &AiData, ctx: &ExecutionContext) -> Result<(), EngineError> {
    let Some(ai) = &ctx.unified_ai else {
        let err = EngineError::Ai(AiError::NotConfigured);
        warn!(node_id = %node.id, "{}", err);
        return Ok(());
    };

    let prompt = ai_prompt(data, &ctx.body);
    match ai
        .responder
        .process_omnichannel_message(&prompt, &ctx.responder_context())
        .await
    {
        Ok(reply) => match reply.non_empty_text() {
            Some(text) => {
                ctx.replier.reply(text).await?;
            }
            None => debug!(node_id = %node.id, "ai responder returned no text"),
        },
        Err(e) => {
            let err = EngineError::Ai(e);
            warn!(node_id = %node.id, "{}", err);
        }
    }
    Ok(())
}

pub fn ai_prompt(data: &AiData, body: &str) -> String {
    format!("{}\n\nUser message: {}", data.prompt, body)
}

/// Evaluates a logic node's named condition.
pub fn evaluate_condition(data: &LogicData, ctx: &ExecutionContext, config: &EngineConfig) -> bool {
    match &data.condition {
        LogicCondition::IsPremium => ctx.plan_tier().is_some_and(|tier| config.is_premium(tier)),
        LogicCondition::HasTag => data.tag.as_deref().is_some_and(|tag| ctx.sender.has_tag(tag)),
        LogicCondition::Unknown(name) => {
            debug!(condition = %name, "unknown logic condition evaluates to false");
            false
        }
    }
}

/// Asks the classifier which option the message belongs to.
///
/// Returns `None` when no AI is configured, the call fails, or the answer
/// does not name exactly one option.
pub async fn classify(node: &Node, data: &AiRouterData, ctx: &ExecutionContext) -> Option<String> {
    let Some(ai) = &ctx.unified_ai else {
        warn!(node_id = %node.id, "{}", EngineError::Classifier(AiError::NotConfigured));
        return None;
    };
    if data.options.is_empty() {
        warn!(node_id = %node.id, "ai_router has no options");
        return None;
    }

    let prompt = classification_prompt(data, &ctx.body);
    match ai.classifier.get_chat_completion(&prompt).await {
        Ok(answer) => {
            let label = parse_classification(&answer, &data.options);
            if label.is_none() {
                warn!(node_id = %node.id, answer = %answer, "classifier answer matches no option");
            }
            label
        }
        Err(e) => {
            warn!(node_id = %node.id, "{}", EngineError::Classifier(e));
            None
        }
    }
}

pub fn classification_prompt(data: &AiRouterData, body: &str) -> String {
    let mut prompt = String::new();
    if let Some(extra) = data.prompt.as_deref().filter(|p| !p.trim().is_empty()) {
        prompt.push_str(extra.trim());
        prompt.push_str("\n\n");
    }
    prompt.push_str(
        "Classify the user message into exactly one of the categories below. \
         Answer with the category label only.\n\nCategories:\n",
    );
    for option in &data.options {
        match option.description.as_deref().filter(|d| !d.trim().is_empty()) {
            Some(description) => prompt.push_str(&format!("- {}: {}\n", option.label, description)),
            None => prompt.push_str(&format!("- {}\n", option.label)),
        }
    }
    prompt.push_str(&format!("\nUser message: {}", body));
    prompt
}

/// Maps a free-form classifier answer onto one of the option labels.
pub fn parse_classification(answer: &str, options: &[RouterOption]) -> Option<String> {
    let cleaned = answer.trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation());
    if cleaned.is_empty() {
        return None;
    }

    if let Some(option) = options
        .iter()
        .find(|o| !o.label.trim().is_empty() && labels_match(&o.label, cleaned))
    {
        return Some(option.label.clone());
    }

    let candidates: Vec<&RouterOption> = options.iter().filter(|o| !o.label.trim().is_empty()).collect();
    let mentioned: Vec<&RouterOption> = match mention_patterns(&candidates) {
        Ok(set) => set.matches(answer).into_iter().map(|i| candidates[i]).collect(),
        Err(e) => {
            warn!("could not build label patterns: {}", e);
            Vec::new()
        }
    };
    match mentioned.as_slice() {
        [only] => Some(only.label.clone()),
        _ => None,
    }
}

/// One pattern per label. A label counts as mentioned when it is not glued
/// to a letter, digit or underscore on either side, so `c++` and `q&a?`
/// match as well as plain words.
fn mention_patterns(options: &[&RouterOption]) -> Result<RegexSet, regex::Error> {
    RegexSet::new(
        options
            .iter()
            .map(|o| format!(r"(?i)(?:^|[^\w]){}(?:[^\w]|$)", regex::escape(o.label.trim()))),
    )
}

/// Label comparison used for both logic and router edges.
pub fn labels_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}
