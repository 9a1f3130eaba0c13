use crate::error::Result;
use crate::llm::models::LlmMessage;
use async_trait::async_trait;

/// Abstract interface for chat completion providers
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Send the ordered messages to the endpoint and return the assistant reply.
    ///
    /// Implementations make at most one remote call and never retry.
    async fn complete(&self, model: &str, messages: &[LlmMessage]) -> Result<LlmMessage>;
}
