use async_trait::async_trait;
use brochure_common::Result;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Lazily produced text fragments of a streamed reply. Finite, not restartable.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub model: Option<String>,
    pub tokens_used: Option<u32>,
}

/// Sampling knobs forwarded to the provider when set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a conversation and wait for the complete reply.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<LlmResponse>;

    /// Send a conversation and receive the reply as incremental fragments.
    async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<TextStream>;

    /// Check if the LLM service is available
    async fn health_check(&self) -> Result<bool>;

    /// Get the model name being used
    fn model_name(&self) -> &str;

    /// System instruction plus one user message, answered in one piece.
    async fn ask(&self, system_prompt: &str, prompt: &str) -> Result<LlmResponse> {
        let messages = [ChatMessage::system(system_prompt), ChatMessage::user(prompt)];
        tracing::debug!(
            model = self.model_name(),
            prompt_chars = prompt.chars().count(),
            "llm.ask"
        );
        self.chat(&messages).await
    }

    /// Streaming counterpart of [`LlmClient::ask`].
    async fn ask_stream(&self, system_prompt: &str, prompt: &str) -> Result<TextStream> {
        let messages = [ChatMessage::system(system_prompt), ChatMessage::user(prompt)];
        tracing::debug!(
            model = self.model_name(),
            prompt_chars = prompt.chars().count(),
            "llm.ask_stream"
        );
        self.chat_stream(&messages).await
    }
}
