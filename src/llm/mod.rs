pub mod broker;
pub mod chat_session;
pub mod directive;
pub mod gateway;
pub mod gateways;
pub mod models;
pub mod transcript;

pub use broker::{default_token_budget, LlmBroker};
pub use chat_session::{ChatSession, ChatSessionBuilder, LineSource, TurnOutcome};
pub use directive::{Directive, SENTINEL};
pub use gateway::LlmGateway;
pub use models::{LlmMessage, MessageRole, Transcript};
pub use transcript::{trim, TrimPolicy};
