//! Token-budget trimming for conversation transcripts.
//!
//! Trimming only ever removes messages, oldest first, until the transcript's
//! token count fits the budget or nothing is left. Order of the surviving
//! messages is never changed.

use crate::error::Result;
use crate::llm::gateways::TokenizerGateway;
use crate::llm::models::LlmMessage;
use tracing::debug;

/// Which messages are evicted first when a transcript is over budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrimPolicy {
    /// Evict the oldest non-system message first. The system message goes
    /// only once it is the last thing keeping the transcript over budget.
    #[default]
    PreserveSystem,
    /// Plain prefix eviction, system message included.
    OldestFirst,
}

/// Trims `messages` to at most `max_tokens` tokens as encoded for `model`.
///
/// Fails with [`ChatError::UnsupportedModel`](crate::ChatError::UnsupportedModel)
/// before touching the transcript if the model has no known encoding.
pub fn trim(
    model: &str,
    max_tokens: usize,
    messages: Vec<LlmMessage>,
    policy: TrimPolicy,
) -> Result<Vec<LlmMessage>> {
    let tokenizer = TokenizerGateway::for_model(model)?;
    Ok(trim_with(&tokenizer, max_tokens, messages, policy))
}

/// Trims `messages` with an already resolved tokenizer.
pub fn trim_with(
    tokenizer: &TokenizerGateway,
    max_tokens: usize,
    mut messages: Vec<LlmMessage>,
    policy: TrimPolicy,
) -> Vec<LlmMessage> {
    let mut lengths: Vec<usize> = messages.iter().map(|m| tokenizer.count_tokens(&m.content)).collect();
    let mut total: usize = lengths.iter().sum();
    let original_len = messages.len();

    while total > max_tokens && !messages.is_empty() {
        let victim = match policy {
            TrimPolicy::OldestFirst => 0,
            TrimPolicy::PreserveSystem => messages.iter().position(|m| !m.is_system()).unwrap_or(0),
        };
        messages.remove(victim);
        total -= lengths.remove(victim);
    }

    if messages.len() != original_len {
        debug!(
            removed = original_len - messages.len(),
            remaining_tokens = total,
            max_tokens = max_tokens,
            "Trimmed transcript"
        );
    }

    messages
}
