//! Tokenizer gateway for counting tokens using tiktoken.
//!
//! The counts produced here drive transcript trimming: a transcript is measured
//! as the sum of the token lengths of each message's content under the
//! encoding the target model uses.

use crate::error::{ChatError, Result};
use crate::llm::models::LlmMessage;
use tiktoken_rs::CoreBPE;

/// Gateway for tokenizing text using tiktoken.
///
/// # Examples
///
/// ```
/// use chatgpt_cli::llm::gateways::TokenizerGateway;
///
/// let tokenizer = TokenizerGateway::for_model("gpt-3.5-turbo").unwrap();
/// assert!(tokenizer.count_tokens("Hello, world!") > 0);
/// ```
pub struct TokenizerGateway {
    tokenizer: CoreBPE,
}

impl TokenizerGateway {
    /// Creates a tokenizer from an explicit encoding name.
    ///
    /// Supported encodings are `cl100k_base`, `p50k_base` and `r50k_base`.
    pub fn new(encoding: &str) -> Result<Self> {
        let tokenizer = match encoding {
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "p50k_base" => tiktoken_rs::p50k_base(),
            "r50k_base" => tiktoken_rs::r50k_base(),
            _ => return Err(ChatError::UnsupportedModel(format!("unknown encoding {}", encoding))),
        }
        .map_err(|e| ChatError::UnsupportedModel(format!("{}: {}", encoding, e)))?;
        Ok(Self { tokenizer })
    }

    /// Resolves the encoding used by a model identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::UnsupportedModel`] when no encoding is known for `model`.
    pub fn for_model(model: &str) -> Result<Self> {
        let tokenizer = tiktoken_rs::get_bpe_from_model(model)
            .map_err(|e| ChatError::UnsupportedModel(format!("{}: {}", model, e)))?;
        tracing::debug!(model = model, "Resolved token encoding");
        Ok(Self { tokenizer })
    }

    /// Counts the number of tokens in a text string.
    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.encode_with_special_tokens(text).len()
    }

    /// Sums the token length of every message's content.
    pub fn count_messages(&self, messages: &[LlmMessage]) -> usize {
        messages.iter().map(|m| self.count_tokens(&m.content)).sum()
    }
}

/// Counts the tokens `messages` occupy when encoded for `model`.
pub fn count_tokens(model: &str, messages: &[LlmMessage]) -> Result<usize> {
    let tokenizer = TokenizerGateway::for_model(model)?;
    Ok(tokenizer.count_messages(messages))
}
