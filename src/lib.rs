pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod sandbox;

pub use config::Config;
pub use error::{ChatError, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{ChatError, Result};
    pub use crate::llm::gateways::{OpenAIGateway, TokenizerGateway};
    pub use crate::llm::{ChatSession, LineSource, LlmBroker, LlmGateway, LlmMessage, MessageRole};
    pub use crate::sandbox::{CommandRunner, SandboxConfig, SandboxExecutor};
}
