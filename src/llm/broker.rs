use crate::error::Result;
use crate::llm::gateway::LlmGateway;
use crate::llm::gateways::TokenizerGateway;
use crate::llm::models::{LlmMessage, Transcript};
use crate::llm::transcript::{trim_with, TrimPolicy};
use std::sync::Arc;
use tracing::{info, warn};

/// Token budgets for known model families, longest prefix first.
const MODEL_BUDGETS: &[(&str, usize)] = &[
    ("gpt-4o", 120_000),
    ("gpt-4-turbo", 120_000),
    ("gpt-4-32k", 30_720),
    ("gpt-4", 6_144),
    ("gpt-3.5-turbo-16k", 14_336),
    ("gpt-3.5-turbo", 3_072),
];

const FALLBACK_BUDGET: usize = 3_072;

/// Fixed transcript budget for a model, leaving headroom for the reply.
pub fn default_token_budget(model: &str) -> usize {
    MODEL_BUDGETS
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, budget)| *budget)
        .unwrap_or(FALLBACK_BUDGET)
}

/// Drives single completions against a gateway, keeping the transcript in budget.
pub struct LlmBroker {
    model: String,
    gateway: Arc<dyn LlmGateway>,
    tokenizer: TokenizerGateway,
    max_tokens: usize,
    trim_policy: TrimPolicy,
}

impl LlmBroker {
    /// Create a new LLM broker
    ///
    /// Fails with `UnsupportedModel` when no token encoding is known for `model`.
    pub fn new(model: impl Into<String>, gateway: Arc<dyn LlmGateway>) -> Result<Self> {
        let model = model.into();
        let tokenizer = TokenizerGateway::for_model(&model)?;
        let max_tokens = default_token_budget(&model);

        Ok(Self {
            model,
            gateway,
            tokenizer,
            max_tokens,
            trim_policy: TrimPolicy::default(),
        })
    }

    /// Override the per-model token budget
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_trim_policy(mut self, policy: TrimPolicy) -> Self {
        self.trim_policy = policy;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Total tokens the transcript would occupy for this broker's model.
    pub fn count_tokens(&self, transcript: &[LlmMessage]) -> usize {
        self.tokenizer.count_messages(transcript)
    }

    /// Trim the transcript, request one completion and append the reply.
    ///
    /// On success the transcript is replaced by its trimmed form plus the
    /// assistant reply, which is also returned. On failure the transcript is
    /// left exactly as it was.
    pub async fn complete(&self, transcript: &mut Transcript) -> Result<LlmMessage> {
        let mut trimmed =
            trim_with(&self.tokenizer, self.max_tokens, transcript.clone(), self.trim_policy);
        if trimmed.is_empty() && !transcript.is_empty() {
            warn!(max_tokens = self.max_tokens, "Token budget left nothing to send");
        }

        let reply = self.gateway.complete(&self.model, &trimmed).await?;
        info!(model = %self.model, sent = trimmed.len(), "Completion received");

        trimmed.push(reply.clone());
        *transcript = trimmed;
        Ok(reply)
    }

    /// One-shot question without a system prompt or command handling.
    pub async fn ask(&self, query: &str) -> Result<String> {
        let mut transcript = vec![LlmMessage::user(query)];
        let reply = self.complete(&mut transcript).await?;
        Ok(reply.content)
    }
}
