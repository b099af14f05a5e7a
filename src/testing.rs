//! In-memory collaborators for exercising the engine without a channel, an
//! AI provider or a real store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::ai::{AiClassifier, AiReply, AiResponder, ResponderContext, UnifiedAi};
use crate::context::{Replier, ReplyReceipt};
use crate::error::{AiError, ReplyError, StoreError};
use crate::session::{ExecutionState, InMemorySuspensionStore, SuspensionStore};

/// Collects every reply; optionally refuses to deliver.
#[derive(Debug, Default)]
pub struct RecordingReplier {
    sent: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingReplier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn take(&self) -> Vec<String> {
        self.sent.lock().map(|mut s| std::mem::take(&mut *s)).unwrap_or_default()
    }
}

#[async_trait]
impl Replier for RecordingReplier {
    async fn reply(&self, text: &str) -> Result<ReplyReceipt, ReplyError> {
        if self.fail {
            return Err(ReplyError("channel closed".to_string()));
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|e| ReplyError(e.to_string()))?;
        sent.push(text.to_string());
        Ok(ReplyReceipt {
            message_id: Some(format!("msg-{}", sent.len())),
        })
    }
}

/// Answers every classification with the same text.
#[derive(Debug)]
pub struct StaticClassifier {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl StaticClassifier {
    pub fn new(answer: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.into(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AiClassifier for StaticClassifier {
    async fn get_chat_completion(&self, prompt: &str) -> Result<String, AiError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        Ok(self.answer.clone())
    }
}

/// Answers every prompt with the same reply text.
#[derive(Debug)]
pub struct StaticResponder {
    text: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl StaticResponder {
    pub fn new(text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            text: Some(text.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Succeeds without any text.
    pub fn silent() -> Arc<Self> {
        Arc::new(Self {
            text: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AiResponder for StaticResponder {
    async fn process_omnichannel_message(
        &self,
        prompt: &str,
        _context: &ResponderContext,
    ) -> Result<AiReply, AiError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        Ok(match &self.text {
            Some(text) => AiReply::text(text.clone()),
            None => AiReply::default(),
        })
    }
}

/// Provider that is always down.
#[derive(Debug, Default)]
pub struct FailingAi;

impl FailingAi {
    pub fn unified() -> UnifiedAi {
        UnifiedAi::single(Arc::new(FailingAi))
    }
}

#[async_trait]
impl AiClassifier for FailingAi {
    async fn get_chat_completion(&self, _prompt: &str) -> Result<String, AiError> {
        Err(AiError::Provider("connection refused".to_string()))
    }
}

#[async_trait]
impl AiResponder for FailingAi {
    async fn process_omnichannel_message(
        &self,
        _prompt: &str,
        _context: &ResponderContext,
    ) -> Result<AiReply, AiError> {
        Err(AiError::Provider("connection refused".to_string()))
    }
}

/// Wraps an in-memory store and fails the selected operations.
#[derive(Debug)]
pub struct FailingStore {
    inner: Arc<InMemorySuspensionStore>,
    fail_get: bool,
    fail_set: bool,
    fail_delete: bool,
}

impl FailingStore {
    pub fn reads() -> Arc<Self> {
        Self::build(true, false, false)
    }

    pub fn writes() -> Arc<Self> {
        Self::build(false, true, true)
    }

    pub fn all() -> Arc<Self> {
        Self::build(true, true, true)
    }

    fn build(fail_get: bool, fail_set: bool, fail_delete: bool) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemorySuspensionStore::new(),
            fail_get,
            fail_set,
            fail_delete,
        })
    }

    /// The backing store, for seeding and inspecting state.
    pub fn inner(&self) -> &Arc<InMemorySuspensionStore> {
        &self.inner
    }
}

fn down() -> StoreError {
    StoreError::Unavailable("connection reset".to_string())
}

#[async_trait]
impl SuspensionStore for FailingStore {
    async fn get(&self, tenant_id: &str, user_id: &str) -> Result<Option<ExecutionState>, StoreError> {
        if self.fail_get {
            return Err(down());
        }
        self.inner.get(tenant_id, user_id).await
    }

    async fn set(
        &self,
        tenant_id: &str,
        user_id: &str,
        state: &ExecutionState,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        if self.fail_set {
            return Err(down());
        }
        self.inner.set(tenant_id, user_id, state, ttl).await
    }

    async fn delete(&self, tenant_id: &str, user_id: &str) -> Result<(), StoreError> {
        if self.fail_delete {
            return Err(down());
        }
        self.inner.delete(tenant_id, user_id).await
    }
}
