//! Per-message input to the engine.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ai::{ResponderContext, UnifiedAi};
use crate::error::ReplyError;

/// Sends text back on the channel the inbound message came from.
#[async_trait]
pub trait Replier: Send + Sync + Debug {
    async fn reply(&self, text: &str) -> Result<ReplyReceipt, ReplyError>;
}

/// Acknowledgement from the channel. The engine never inspects it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplyReceipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    /// Stable user identifier on the channel; doubles as the user id of
    /// suspension keys.
    pub jid: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Sender {
    pub fn new(jid: impl Into<String>) -> Self {
        Self {
            jid: jid.into(),
            tags: Vec::new(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim();
        !tag.is_empty() && self.tags.iter().any(|t| t.trim().eq_ignore_ascii_case(tag))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_tier: Option<String>,
}

impl TenantInfo {
    pub fn with_plan(plan_tier: impl Into<String>) -> Self {
        Self {
            plan_tier: Some(plan_tier.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// The inbound message text, untouched.
    pub body: String,
    pub sender: Sender,
    pub tenant_id: String,
    pub tenant: Option<TenantInfo>,
    pub replier: Arc<dyn Replier>,
    pub unified_ai: Option<UnifiedAi>,
}

impl ExecutionContext {
    pub fn new(
        tenant_id: impl Into<String>,
        sender: Sender,
        body: impl Into<String>,
        replier: Arc<dyn Replier>,
    ) -> Self {
        Self {
            body: body.into(),
            sender,
            tenant_id: tenant_id.into(),
            tenant: None,
            replier,
            unified_ai: None,
        }
    }

    pub fn with_tenant(mut self, tenant: TenantInfo) -> Self {
        self.tenant = Some(tenant);
        self
    }

    pub fn with_ai(mut self, ai: UnifiedAi) -> Self {
        self.unified_ai = Some(ai);
        self
    }

    pub fn user_id(&self) -> &str {
        &self.sender.jid
    }

    pub fn plan_tier(&self) -> Option<&str> {
        self.tenant.as_ref().and_then(|t| t.plan_tier.as_deref())
    }

    pub fn responder_context(&self) -> ResponderContext {
        ResponderContext {
            tenant_id: self.tenant_id.clone(),
            sender_jid: self.sender.jid.clone(),
            plan_tier: self.plan_tier().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_tags_are_case_insensitive() {
        let sender = Sender {
            jid: "u1".into(),
            tags: vec!["VIP".into(), " beta ".into()],
        };
        assert!(sender.has_tag("vip"));
        assert!(sender.has_tag("Beta"));
        assert!(!sender.has_tag("gold"));
        assert!(!sender.has_tag(""));
    }
}
