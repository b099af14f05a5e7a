//! Call contracts for the AI collaborators used by `ai` and `ai_router`
//! nodes. Both are single-shot text in, text out.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AiError;

pub mod ollama;

pub use ollama::OllamaAi;

/// Free-form completion used to pick a branch label.
#[async_trait]
pub trait AiClassifier: Send + Sync + Debug {
    async fn get_chat_completion(&self, prompt: &str) -> Result<String, AiError>;
}

/// Tenant-aware reply generation.
#[async_trait]
pub trait AiResponder: Send + Sync + Debug {
    async fn process_omnichannel_message(
        &self,
        prompt: &str,
        context: &ResponderContext,
    ) -> Result<AiReply, AiError>;
}

/// Who the responder is answering for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponderContext {
    pub tenant_id: String,
    pub sender_jid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_tier: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiReply {
    pub content: AiContent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl AiReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: AiContent {
                text: Some(text.into()),
            },
        }
    }

    /// Reply text, if present and not blank.
    pub fn non_empty_text(&self) -> Option<&str> {
        self.content
            .text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}

/// The pair of AI collaborators handed to the engine with each message.
#[derive(Debug, Clone)]
pub struct UnifiedAi {
    pub responder: Arc<dyn AiResponder>,
    pub classifier: Arc<dyn AiClassifier>,
}

impl UnifiedAi {
    pub fn new(responder: Arc<dyn AiResponder>, classifier: Arc<dyn AiClassifier>) -> Self {
        Self {
            responder,
            classifier,
        }
    }

    /// Uses one provider for both roles.
    pub fn single<T>(provider: Arc<T>) -> Self
    where
        T: AiResponder + AiClassifier + 'static,
    {
        Self {
            responder: provider.clone(),
            classifier: provider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_text() {
        assert_eq!(AiReply::text("hi").non_empty_text(), Some("hi"));
        assert_eq!(AiReply::text("  ").non_empty_text(), None);
        assert_eq!(AiReply::default().non_empty_text(), None);
    }
}
