//! Error types and result aliases for the chat client.
//!
//! This module defines the core error type [`ChatError`] and the [`Result`] type alias
//! used throughout the crate. Only [`ChatError::ConfigUnavailable`] and
//! [`ChatError::UnsupportedModel`] are meant to end the process; remote call and
//! sandbox failures are absorbed by the chat session.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Configuration unavailable: {0}")]
    ConfigUnavailable(String),

    #[error("Model not supported: {0}")]
    UnsupportedModel(String),

    #[error("Remote call failed: {0}")]
    RemoteCall(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Input error: {0}")]
    InputError(String),
}

impl ChatError {
    /// Whether this error came out of a completion request.
    ///
    /// These are reported to the user and the session keeps going.
    pub fn is_remote(&self) -> bool {
        matches!(self, ChatError::RemoteCall(_) | ChatError::Http(_) | ChatError::Serialization(_))
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_unavailable_display() {
        let err = ChatError::ConfigUnavailable(".env: not found".to_string());
        assert_eq!(err.to_string(), "Configuration unavailable: .env: not found");
    }

    #[test]
    fn test_unsupported_model_display() {
        let err = ChatError::UnsupportedModel("llama-local".to_string());
        assert_eq!(err.to_string(), "Model not supported: llama-local");
    }

    #[test]
    fn test_remote_call_display() {
        let err = ChatError::RemoteCall("401 Unauthorized".to_string());
        assert_eq!(err.to_string(), "Remote call failed: 401 Unauthorized");
    }

    #[test]
    fn test_sandbox_error_display() {
        let err = ChatError::Sandbox("docker not found".to_string());
        assert_eq!(err.to_string(), "Sandbox error: docker not found");
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: ChatError = json_err.into();

        match err {
            ChatError::Serialization(_) => {}
            _ => panic!("Expected Serialization"),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ChatError = io_err.into();

        match err {
            ChatError::Io(_) => {}
            _ => panic!("Expected Io"),
        }
    }

    #[test]
    fn test_is_remote() {
        assert!(ChatError::RemoteCall("quota".to_string()).is_remote());
        assert!(!ChatError::UnsupportedModel("x".to_string()).is_remote());
        assert!(!ChatError::ConfigUnavailable("x".to_string()).is_remote());
        assert!(!ChatError::Sandbox("x".to_string()).is_remote());
    }

    #[test]
    fn test_result_type() {
        let ok_result: Result<i32> = Ok(42);
        assert!(ok_result.is_ok());

        let err_result: Result<i32> = Err(ChatError::Timeout("slow".to_string()));
        assert!(err_result.is_err());
    }
}
