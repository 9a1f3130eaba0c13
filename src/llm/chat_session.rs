//! Interactive chat session with sandboxed command feedback.
//!
//! A session owns the transcript for its whole lifetime. Each user turn runs a
//! small state machine: complete, and while the reply is a command directive,
//! execute it, append the output as a user message and complete again. The
//! chain of executions per turn is capped.

use crate::error::Result;
use crate::llm::broker::LlmBroker;
use crate::llm::directive::Directive;
use crate::llm::models::{LlmMessage, Transcript};
use crate::sandbox::CommandRunner;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant running inside a terminal. \
You can run shell commands in a disposable Linux container with network access: reply with a \
single line starting with '/' followed by the command, e.g. '/ls -la', and nothing else. \
The command output will be sent back to you as the next user message. \
Only start a reply with '/' when you want a command executed.";

pub const DEFAULT_MAX_DIRECTIVE_CHAIN: usize = 8;

pub const PROMPT: &str = "-> ";

/// Blocking source of input lines.
pub trait LineSource {
    /// Read one line. `Ok(None)` signals end of input.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

/// Result of one user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The last assistant reply of the turn.
    pub reply: String,
    /// Commands executed during the turn.
    pub commands_run: usize,
    /// True when the reply was a directive left unexecuted because the chain cap was hit.
    pub chain_exhausted: bool,
}

enum TurnState {
    Completing,
    Executing(Arc<dyn CommandRunner>, String),
    Done(TurnOutcome),
}

/// A chat session that feeds sandboxed command output back to the model.
pub struct ChatSession {
    broker: LlmBroker,
    runner: Option<Arc<dyn CommandRunner>>,
    transcript: Transcript,
    max_directive_chain: usize,
}

impl ChatSession {
    /// Create a session with the default system prompt and command execution disabled.
    pub fn new(broker: LlmBroker) -> Self {
        Self::builder(broker).build()
    }

    pub fn builder(broker: LlmBroker) -> ChatSessionBuilder {
        ChatSessionBuilder::new(broker)
    }

    /// Get the current conversation history
    pub fn transcript(&self) -> &[LlmMessage] {
        &self.transcript
    }

    /// Get the total token count of the current conversation
    pub fn total_tokens(&self) -> usize {
        self.broker.count_tokens(&self.transcript)
    }

    pub fn commands_enabled(&self) -> bool {
        self.runner.is_some()
    }

    /// Run one user turn to its first non-directive reply.
    ///
    /// Executed commands and their output are echoed to `out`. A completion
    /// failure ends the turn with an error; the messages appended so far stay
    /// in the transcript.
    pub async fn send<W: Write>(&mut self, input: &str, out: &mut W) -> Result<TurnOutcome> {
        self.transcript.push(LlmMessage::user(input));

        let mut commands_run = 0;
        let mut state = TurnState::Completing;
        loop {
            state = match state {
                TurnState::Completing => {
                    let reply = self.broker.complete(&mut self.transcript).await?;
                    self.next_state(reply.content, commands_run)
                }
                TurnState::Executing(runner, command) => {
                    writeln!(out, "$ {}", command)?;
                    let output = runner.run(&command).await;
                    write!(out, "{}", output)?;
                    if !output.is_empty() && !output.ends_with('\n') {
                        writeln!(out)?;
                    }
                    out.flush()?;

                    commands_run += 1;
                    self.transcript.push(LlmMessage::user(output));
                    TurnState::Completing
                }
                TurnState::Done(outcome) => return Ok(outcome),
            };
        }
    }

    fn next_state(&self, reply: String, commands_run: usize) -> TurnState {
        let command = Directive::parse(&reply).map(|d| d.command().to_string());
        let (runner, command) = match (&self.runner, command) {
            (Some(runner), Some(command)) => (runner.clone(), command),
            _ => {
                return TurnState::Done(TurnOutcome {
                    reply,
                    commands_run,
                    chain_exhausted: false,
                })
            }
        };

        if commands_run >= self.max_directive_chain {
            warn!(
                limit = self.max_directive_chain,
                command = %command,
                "Command chain limit reached, not executing"
            );
            return TurnState::Done(TurnOutcome {
                reply,
                commands_run,
                chain_exhausted: true,
            });
        }

        debug!(command = %command, "Reply is a command directive");
        TurnState::Executing(runner, command)
    }

    /// Read lines until end of input, running one turn per non-blank line.
    ///
    /// Completion failures are reported on `out` and the loop keeps reading.
    pub async fn run<S: LineSource, W: Write>(&mut self, input: &mut S, out: &mut W) -> Result<()> {
        info!(model = self.broker.model(), "Starting interactive session");

        while let Some(line) = input.read_line(PROMPT)? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match self.send(line, out).await {
                Ok(outcome) => {
                    writeln!(out, "{}", outcome.reply)?;
                    if outcome.chain_exhausted {
                        writeln!(
                            out,
                            "(not executed: limit of {} commands per message reached)",
                            self.max_directive_chain
                        )?;
                    }
                }
                Err(e) if e.is_remote() => {
                    error!(error = %e, "Completion failed");
                    writeln!(out, "Error: {}", e)?;
                }
                Err(e) => return Err(e),
            }
            out.flush()?;
        }

        info!(messages = self.transcript.len(), "Input closed, ending session");
        Ok(())
    }
}

/// Builder for constructing a `ChatSession` with custom configuration.
pub struct ChatSessionBuilder {
    broker: LlmBroker,
    system_prompt: String,
    runner: Option<Arc<dyn CommandRunner>>,
    max_directive_chain: usize,
}

impl ChatSessionBuilder {
    fn new(broker: LlmBroker) -> Self {
        Self {
            broker,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            runner: None,
            max_directive_chain: DEFAULT_MAX_DIRECTIVE_CHAIN,
        }
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Execute command directives with `runner`
    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Maximum commands executed per user message (default: 8)
    pub fn max_directive_chain(mut self, max: usize) -> Self {
        self.max_directive_chain = max;
        self
    }

    pub fn build(self) -> ChatSession {
        ChatSession {
            broker: self.broker,
            runner: self.runner,
            transcript: vec![LlmMessage::system(self.system_prompt)],
            max_directive_chain: self.max_directive_chain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::llm::gateway::LlmGateway;
    use crate::llm::models::MessageRole;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    // Mock gateway replaying scripted replies
    struct MockGateway {
        responses: Mutex<VecDeque<Result<String>>>,
        calls: Mutex<Vec<Vec<LlmMessage>>>,
    }

    impl MockGateway {
        fn new(responses: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(vec![]),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmGateway for MockGateway {
        async fn complete(&self, _model: &str, messages: &[LlmMessage]) -> Result<LlmMessage> {
            self.calls.lock().unwrap().push(messages.to_vec());
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(content)) => Ok(LlmMessage::assistant(content)),
                Some(Err(e)) => Err(e),
                None => Ok(LlmMessage::assistant("default response")),
            }
        }
    }

    // Mock runner answering from a fixed table
    struct MockRunner {
        outputs: Vec<(&'static str, &'static str)>,
        commands: Mutex<Vec<String>>,
    }

    impl MockRunner {
        fn new(outputs: Vec<(&'static str, &'static str)>) -> Arc<Self> {
            Arc::new(Self {
                outputs,
                commands: Mutex::new(vec![]),
            })
        }
    }

    #[async_trait]
    impl CommandRunner for MockRunner {
        async fn run(&self, command: &str) -> String {
            self.commands.lock().unwrap().push(command.to_string());
            self.outputs
                .iter()
                .find(|(c, _)| *c == command)
                .map(|(_, o)| o.to_string())
                .unwrap_or_else(|| "ERROR: command exited with status 127\n".to_string())
        }
    }

    struct Lines(VecDeque<String>);

    impl Lines {
        fn new(lines: &[&str]) -> Self {
            Self(lines.iter().map(|l| l.to_string()).collect())
        }
    }

    impl LineSource for Lines {
        fn read_line(&mut self, _prompt: &str) -> Result<Option<String>> {
            Ok(self.0.pop_front())
        }
    }

    fn ok(s: &str) -> Result<String> {
        Ok(s.to_string())
    }

    fn broker(gateway: Arc<MockGateway>) -> LlmBroker {
        LlmBroker::new("gpt-3.5-turbo", gateway).unwrap()
    }

    #[test]
    fn test_new_session_has_system_message() {
        let session = ChatSession::new(broker(MockGateway::new(vec![])));

        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript()[0].role, MessageRole::System);
        assert_eq!(session.transcript()[0].content, DEFAULT_SYSTEM_PROMPT);
        assert!(!session.commands_enabled());
    }

    #[test]
    fn test_builder_custom_system_prompt() {
        let session = ChatSession::builder(broker(MockGateway::new(vec![])))
            .system_prompt("Custom system prompt")
            .build();

        assert_eq!(session.transcript()[0].content, "Custom system prompt");
        assert!(session.total_tokens() > 0);
    }

    #[tokio::test]
    async fn test_plain_question() {
        let gateway = MockGateway::new(vec![ok("4")]);
        let mut session = ChatSession::builder(broker(gateway.clone()))
            .system_prompt("sys")
            .runner(MockRunner::new(vec![]))
            .build();
        let mut out = Vec::new();

        let outcome = session.send("what is 2+2?", &mut out).await.unwrap();

        assert_eq!(outcome.reply, "4");
        assert_eq!(outcome.commands_run, 0);
        assert_eq!(gateway.calls.lock().unwrap()[0], vec![
            LlmMessage::system("sys"),
            LlmMessage::user("what is 2+2?"),
        ]);
        assert_eq!(session.transcript().len(), 3);
        assert_eq!(session.transcript()[2], LlmMessage::assistant("4"));
    }

    #[tokio::test]
    async fn test_command_feedback() {
        let gateway = MockGateway::new(vec![ok("/echo hi"), ok("The command printed hi.")]);
        let runner = MockRunner::new(vec![("echo hi", "hi\n")]);
        let mut session = ChatSession::builder(broker(gateway.clone()))
            .system_prompt("sys")
            .runner(runner.clone())
            .build();
        let mut out = Vec::new();

        let outcome = session.send("say hi", &mut out).await.unwrap();

        assert_eq!(outcome.reply, "The command printed hi.");
        assert_eq!(outcome.commands_run, 1);
        assert_eq!(*runner.commands.lock().unwrap(), vec!["echo hi".to_string()]);
        assert_eq!(gateway.call_count(), 2);
        assert_eq!(session.transcript(), &[
            LlmMessage::system("sys"),
            LlmMessage::user("say hi"),
            LlmMessage::assistant("/echo hi"),
            LlmMessage::user("hi\n"),
            LlmMessage::assistant("The command printed hi."),
        ]);
        assert_eq!(String::from_utf8(out).unwrap(), "$ echo hi\nhi\n");
    }

    #[tokio::test]
    async fn test_failed_command_fed_back() {
        let gateway = MockGateway::new(vec![ok("/nope"), ok("That command does not exist.")]);
        let mut session = ChatSession::builder(broker(gateway.clone()))
            .runner(MockRunner::new(vec![]))
            .build();
        let mut out = Vec::new();

        session.send("run nope", &mut out).await.unwrap();

        let fed_back = &session.transcript()[3];
        assert_eq!(fed_back.role, MessageRole::User);
        assert!(fed_back.content.starts_with("ERROR: "));
    }

    #[tokio::test]
    async fn test_chain_cap() {
        let gateway = MockGateway::new(vec![ok("/ls"), ok("/ls"), ok("/ls"), ok("/ls")]);
        let runner = MockRunner::new(vec![("ls", "file\n")]);
        let mut session = ChatSession::builder(broker(gateway.clone()))
            .runner(runner.clone())
            .max_directive_chain(2)
            .build();
        let mut out = Vec::new();

        let outcome = session.send("loop forever", &mut out).await.unwrap();

        assert!(outcome.chain_exhausted);
        assert_eq!(outcome.commands_run, 2);
        assert_eq!(outcome.reply, "/ls");
        assert_eq!(runner.commands.lock().unwrap().len(), 2);
        assert_eq!(gateway.call_count(), 3);
    }

    #[tokio::test]
    async fn test_directives_ignored_without_runner() {
        let gateway = MockGateway::new(vec![ok("/rm -rf /")]);
        let mut session = ChatSession::new(broker(gateway.clone()));
        let mut out = Vec::new();

        let outcome = session.send("clean up", &mut out).await.unwrap();

        assert_eq!(outcome.reply, "/rm -rf /");
        assert!(!outcome.chain_exhausted);
        assert_eq!(gateway.call_count(), 1);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_empty_reply_is_not_directive() {
        let gateway = MockGateway::new(vec![ok("")]);
        let runner = MockRunner::new(vec![]);
        let mut session = ChatSession::builder(broker(gateway)).runner(runner.clone()).build();
        let mut out = Vec::new();

        let outcome = session.send("say nothing", &mut out).await.unwrap();

        assert_eq!(outcome.reply, "");
        assert!(runner.commands.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transcript_grows_by_one_per_turn() {
        let gateway = MockGateway::new(vec![ok("a"), ok("b"), ok("c")]);
        let mut session = ChatSession::new(broker(gateway));
        let mut out = Vec::new();

        for (i, q) in ["one", "two", "three"].iter().enumerate() {
            let before = session.transcript().len();
            session.send(q, &mut out).await.unwrap();
            assert_eq!(session.transcript().len(), before + 2, "turn {}", i);
        }
    }

    #[tokio::test]
    async fn test_run_end_to_end() {
        let gateway = MockGateway::new(vec![ok("4"), ok("/echo hi"), ok("done")]);
        let runner = MockRunner::new(vec![("echo hi", "hi\n")]);
        let mut session = ChatSession::builder(broker(gateway.clone()))
            .runner(runner)
            .build();
        let mut input = Lines::new(&["what is 2+2?", "   ", "", "echo something"]);
        let mut out = Vec::new();

        session.run(&mut input, &mut out).await.unwrap();

        assert_eq!(gateway.call_count(), 3);
        assert_eq!(String::from_utf8(out).unwrap(), "4\n$ echo hi\nhi\ndone\n");
        assert_eq!(session.transcript().len(), 7);
    }

    #[tokio::test]
    async fn test_run_reports_remote_error_and_continues() {
        let gateway = MockGateway::new(vec![
            Err(ChatError::RemoteCall("429 Too Many Requests".to_string())),
            ok("back again"),
        ]);
        let mut session = ChatSession::new(broker(gateway.clone()));
        let mut input = Lines::new(&["first", "second"]);
        let mut out = Vec::new();

        session.run(&mut input, &mut out).await.unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Error: Remote call failed: 429 Too Many Requests"));
        assert!(printed.ends_with("back again\n"));
        assert_eq!(gateway.call_count(), 2);
        assert_eq!(session.transcript(), &[
            LlmMessage::system(DEFAULT_SYSTEM_PROMPT),
            LlmMessage::user("first"),
            LlmMessage::user("second"),
            LlmMessage::assistant("back again"),
        ]);
    }

    #[tokio::test]
    async fn test_run_stops_on_input_error() {
        struct Broken;
        impl LineSource for Broken {
            fn read_line(&mut self, _prompt: &str) -> Result<Option<String>> {
                Err(ChatError::InputError("terminal closed".to_string()))
            }
        }

        let gateway = MockGateway::new(vec![]);
        let mut session = ChatSession::new(broker(gateway.clone()));
        let mut out = Vec::new();

        let result = session.run(&mut Broken, &mut out).await;

        assert!(matches!(result, Err(ChatError::InputError(_))));
        assert_eq!(gateway.call_count(), 0);
    }
}
