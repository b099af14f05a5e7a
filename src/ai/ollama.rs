use std::fmt;

use async_trait::async_trait;
use ollama_rs::Ollama;
use ollama_rs::generation::completion::request::GenerationRequest;
use tracing::{debug, error};
use url::Url;

use super::{AiClassifier, AiReply, AiResponder, ResponderContext};
use crate::error::AiError;

pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";
const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Reference adapter talking to an Ollama server.
/// Without a url the client targets `http://localhost:11434`.
pub struct OllamaAi {
    client: Ollama,
    model: String,
}

impl fmt::Debug for OllamaAi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OllamaAi").field("model", &self.model).finish()
    }
}

impl OllamaAi {
    pub fn new(url: Option<Url>, model: Option<String>) -> Self {
        let client = match url {
            Some(url) => {
                let port = url.port().unwrap_or(DEFAULT_OLLAMA_PORT);
                Ollama::new(url, port)
            }
            None => Ollama::default(),
        };
        Self {
            client,
            model: model.unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: String, system: Option<String>) -> Result<String, AiError> {
        let mut req = GenerationRequest::new(self.model.clone(), prompt);
        if let Some(system) = system {
            req = req.system(system);
        }
        let resp = self.client.generate(req).await.map_err(|e| {
            error!("Ollama generate error: {}", e);
            AiError::Provider(e.to_string())
        })?;
        debug!("Ollama answered {} chars", resp.response.len());
        if resp.response.trim().is_empty() {
            return Err(AiError::EmptyResponse);
        }
        Ok(resp.response)
    }
}

#[async_trait]
impl AiClassifier for OllamaAi {
    async fn get_chat_completion(&self, prompt: &str) -> Result<String, AiError> {
        self.generate(prompt.to_string(), None).await
    }
}

#[async_trait]
impl AiResponder for OllamaAi {
    async fn process_omnichannel_message(
        &self,
        prompt: &str,
        context: &ResponderContext,
    ) -> Result<AiReply, AiError> {
        let system = format!(
            "You are a helpful assistant replying to a chat user on behalf of tenant {}. Keep answers short.",
            context.tenant_id
        );
        let text = self.generate(prompt.to_string(), Some(system)).await?;
        Ok(AiReply::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model() {
        let ai = OllamaAi::new(None, None);
        assert_eq!(ai.model(), DEFAULT_OLLAMA_MODEL);

        let url = Url::parse("http://ollama.internal:8080").unwrap();
        let ai = OllamaAi::new(Some(url), Some("qwen2.5".into()));
        assert_eq!(ai.model(), "qwen2.5");
    }
}
