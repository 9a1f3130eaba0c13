//! Command-line front end: argument parsing, the line editor and mode dispatch.

use crate::config::{Config, DEFAULT_ENV_FILE};
use crate::error::{ChatError, Result};
use crate::llm::chat_session::{ChatSession, LineSource};
use crate::llm::gateways::{OpenAIConfig, OpenAIGateway};
use crate::llm::LlmBroker;
use crate::sandbox::SandboxExecutor;
use anyhow::Context;
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Chat with a hosted LLM from the terminal.
///
/// Without a query, starts an interactive session in which the model may run
/// shell commands in a sandboxed container. With a query, asks once and exits.
#[derive(Parser, Debug)]
#[command(name = "chatgpt-cli", version)]
pub struct Cli {
    /// Model to use (see https://platform.openai.com/docs/models/overview)
    #[arg(long)]
    pub model: Option<String>,

    /// Env file holding OPENAI_API_KEY and other settings
    #[arg(long, default_value = DEFAULT_ENV_FILE)]
    pub env_file: PathBuf,

    /// Token budget for the transcript sent with each request
    #[arg(long)]
    pub max_tokens: Option<usize>,

    /// Show command replies instead of running them
    #[arg(long)]
    pub no_sandbox_commands: bool,

    /// One-shot query; words are joined with spaces
    pub query: Vec<String>,
}

impl Cli {
    /// Flags take precedence over the env file and environment.
    pub fn apply(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_context_tokens = Some(max_tokens);
        }
    }

    /// The joined one-shot query, if any words were given.
    pub fn joined_query(&self) -> Option<String> {
        if self.query.is_empty() {
            None
        } else {
            Some(self.query.join(" "))
        }
    }
}

/// Interactive input backed by rustyline, with optional persistent history.
pub struct ReadlineSource {
    editor: DefaultEditor,
    history_file: Option<PathBuf>,
}

impl ReadlineSource {
    pub fn new(history_file: Option<PathBuf>) -> Result<Self> {
        let mut editor = DefaultEditor::new().map_err(|e| ChatError::InputError(e.to_string()))?;
        if let Some(path) = &history_file {
            if let Err(e) = editor.load_history(path) {
                debug!(path = %path.display(), error = %e, "No history loaded");
            }
        }
        Ok(Self { editor, history_file })
    }

    pub fn save_history(&mut self) {
        if let Some(path) = &self.history_file {
            if let Err(e) = self.editor.save_history(path) {
                warn!(path = %path.display(), error = %e, "Failed to save history");
            }
        }
    }
}

impl LineSource for ReadlineSource {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    if let Err(e) = self.editor.add_history_entry(line.as_str()) {
                        warn!(error = %e, "Failed to add history entry");
                    }
                }
                Ok(Some(line))
            }
            // Ctrl-C abandons the current line only.
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(ChatError::InputError(e.to_string())),
        }
    }
}

fn build_broker(config: &Config) -> Result<LlmBroker> {
    let gateway = OpenAIGateway::with_config(OpenAIConfig {
        api_key: config.api_key.clone(),
        base_url: config.base_url.clone(),
        timeout: config.request_timeout,
    })?;
    let broker = LlmBroker::new(config.model.clone(), Arc::new(gateway))?;
    Ok(match config.max_context_tokens {
        Some(max_tokens) => broker.with_max_tokens(max_tokens),
        None => broker,
    })
}

/// Resolve configuration and run the requested mode.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(&cli.env_file).context("failed to load configuration")?;
    cli.apply(&mut config);

    let broker = build_broker(&config)
        .with_context(|| format!("cannot use model {}", config.model))?;

    if let Some(query) = cli.joined_query() {
        let reply = broker.ask(&query).await?;
        println!("{}", reply);
        return Ok(());
    }

    let mut builder = ChatSession::builder(broker)
        .system_prompt(config.system_prompt.clone())
        .max_directive_chain(config.max_directive_chain);
    if !cli.no_sandbox_commands {
        builder = builder.runner(Arc::new(SandboxExecutor::new(config.sandbox.clone())));
    }
    let mut session = builder.build();

    let mut input = ReadlineSource::new(config.history_file.clone())?;
    println!("ChatGPT {} interactive mode", config.model);

    let mut out = std::io::stdout();
    let result = session.run(&mut input, &mut out).await;
    input.save_history();
    result?;

    Ok(())
}
