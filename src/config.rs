//! Runtime configuration.
//!
//! Settings come from built-in defaults, the process environment and a
//! key-value env file, with the file taking precedence. The env file is read
//! into a map and never exported into the process environment; every
//! component receives its settings through [`Config`].

use crate::error::{ChatError, Result};
use crate::llm::chat_session::{DEFAULT_MAX_DIRECTIVE_CHAIN, DEFAULT_SYSTEM_PROMPT};
use crate::llm::gateways::openai::DEFAULT_BASE_URL;
use crate::sandbox::SandboxConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Settings shared by the gateway, broker, sandbox and session.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub history_file: Option<PathBuf>,
    /// Overrides the per-model token budget when set.
    pub max_context_tokens: Option<usize>,
    pub max_directive_chain: usize,
    pub system_prompt: String,
    pub request_timeout: Option<Duration>,
    pub sandbox: SandboxConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            history_file: None,
            max_context_tokens: None,
            max_directive_chain: DEFAULT_MAX_DIRECTIVE_CHAIN,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            request_timeout: None,
            sandbox: SandboxConfig::default(),
        }
    }
}

impl Config {
    /// Load from the env file at `path` layered over the process environment.
    ///
    /// A missing or unreadable env file is logged and treated as empty.
    pub fn load(path: &Path) -> Result<Self> {
        let file = match read_env_file(path) {
            Ok(values) => values,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Continuing without env file");
                HashMap::new()
            }
        };
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::from_sources(&file, &env)
    }

    /// Build from explicit key-value sources; `file` wins over `env`.
    pub fn from_sources(file: &HashMap<String, String>, env: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            file.get(key)
                .or_else(|| env.get(key))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let mut config = Config::default();

        if let Some(key) = get("OPENAI_API_KEY") {
            config.api_key = key.to_string();
        }
        if let Some(base_url) = get("OPENAI_API_ENDPOINT") {
            config.base_url = base_url.to_string();
        }
        if let Some(model) = get("OPENAI_MODEL") {
            config.model = model.to_string();
        }
        if let Some(path) = get("HISTORY_FILE") {
            config.history_file = Some(PathBuf::from(path));
        }
        if let Some(value) = get("MAX_CONTEXT_TOKENS") {
            config.max_context_tokens = Some(parse_value("MAX_CONTEXT_TOKENS", value)?);
        }
        if let Some(value) = get("MAX_DIRECTIVE_CHAIN") {
            config.max_directive_chain = parse_value("MAX_DIRECTIVE_CHAIN", value)?;
        }
        if let Some(value) = get("REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Some(Duration::from_secs(parse_value("REQUEST_TIMEOUT_SECS", value)?));
        }
        if let Some(runtime) = get("SANDBOX_RUNTIME") {
            config.sandbox.runtime = runtime.to_string();
        }
        if let Some(image) = get("SANDBOX_IMAGE") {
            config.sandbox.image = image.to_string();
        }
        if let Some(value) = get("SANDBOX_TIMEOUT_SECS") {
            config.sandbox.timeout = Duration::from_secs(parse_value("SANDBOX_TIMEOUT_SECS", value)?);
        }

        if config.api_key.is_empty() {
            warn!("OPENAI_API_KEY is not set");
        }
        debug!(model = %config.model, base_url = %config.base_url, "Configuration resolved");

        Ok(config)
    }
}

/// Read a `KEY=value` env file into a map without touching the process environment.
///
/// Lines that cannot be parsed are skipped with a warning.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let iter = dotenv::from_path_iter(path)
        .map_err(|e| ChatError::ConfigUnavailable(format!("{}: {}", path.display(), e)))?;

    let mut values = HashMap::new();
    for item in iter {
        match item {
            Ok((key, value)) => {
                values.insert(key, value);
            }
            Err(dotenv::Error::LineParse(line, _)) => {
                warn!(path = %path.display(), line = %line, "Skipping malformed env file line");
            }
            Err(e) => {
                return Err(ChatError::ConfigUnavailable(format!("{}: {}", path.display(), e)));
            }
        }
    }

    Ok(values)
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ChatError::ConfigUnavailable(format!("{} has invalid value {:?}", key, value)))
}
