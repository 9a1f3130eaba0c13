pub mod openai;
pub mod tokenizer_gateway;

pub use openai::{OpenAIConfig, OpenAIGateway};
pub use tokenizer_gateway::{count_tokens, TokenizerGateway};
