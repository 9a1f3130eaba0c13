//! OpenAI Gateway for chat completions.
//!
//! Sends the transcript to `{base_url}/chat/completions` and turns the first
//! choice into an assistant [`LlmMessage`]. Network, auth, quota and malformed
//! response failures all surface as errors; there is no retry.

use crate::error::{ChatError, Result};
use crate::llm::gateway::LlmGateway;
use crate::llm::models::LlmMessage;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for connecting to OpenAI API.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Option<Duration>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
        }
    }
}

/// Gateway for OpenAI LLM service.
pub struct OpenAIGateway {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIGateway {
    /// Create a new OpenAI gateway with custom configuration.
    pub fn with_config(config: OpenAIConfig) -> Result<Self> {
        let mut client_builder = Client::builder();

        if let Some(timeout) = config.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        let client = client_builder.build()?;

        Ok(Self { client, config })
    }

    /// Create gateway with custom API key and base URL.
    pub fn with_api_key_and_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        Self::with_config(OpenAIConfig {
            api_key: api_key.into(),
            base_url: base_url.into(),
            ..Default::default()
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmGateway for OpenAIGateway {
    async fn complete(&self, model: &str, messages: &[LlmMessage]) -> Result<LlmMessage> {
        info!("Delegating to OpenAI for completion");
        debug!("Model: {}, Message count: {}", model, messages.len());

        if self.config.api_key.is_empty() {
            warn!("No API key configured, request will likely be rejected");
        }

        let body = serde_json::json!({
            "model": model,
            "messages": messages,
        });

        let response = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ChatError::RemoteCall(format!(
                "OpenAI API error: {} - {}",
                status, error_text
            )));
        }

        let response_body: Value = response.json().await?;
        parse_completion(&response_body)
    }
}

/// Extract the assistant message from a chat completion response body.
fn parse_completion(body: &Value) -> Result<LlmMessage> {
    let message = &body["choices"][0]["message"];
    if message.is_null() {
        return Err(ChatError::RemoteCall("No choices in response".to_string()));
    }

    // Content may be null for refusals or empty completions.
    let content = message["content"].as_str().unwrap_or_default();
    Ok(LlmMessage::assistant(content))
}
