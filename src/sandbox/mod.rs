//! Sandboxed execution of model-issued shell commands.
//!
//! Commands run through a container runtime (`docker` by default) in a
//! disposable, resource-capped container. Every failure mode, including a
//! missing runtime, comes back as text prefixed with [`ERROR_MARKER`] so it
//! can be handed back to the model instead of ending the session.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix of every result that did not come from a clean exit.
pub const ERROR_MARKER: &str = "ERROR: ";

/// How long to keep draining output after the runtime has been killed.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runs one shell command and reports its output as text.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> String;
}

/// Container runtime invocation and resource caps.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Runtime binary, e.g. `docker` or `podman`.
    pub runtime: String,
    /// Global runtime arguments placed before the subcommand.
    pub runtime_args: Vec<String>,
    pub image: String,
    pub shell: String,
    pub pids_limit: u32,
    /// Memory cap, also used as the memory+swap cap.
    pub memory: String,
    pub kernel_memory: Option<String>,
    pub cpu_period: u32,
    pub cpu_quota: u32,
    pub timeout: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            runtime_args: vec![],
            image: "alpine:latest".to_string(),
            shell: "sh".to_string(),
            pids_limit: 10,
            memory: "200m".to_string(),
            kernel_memory: Some("4m".to_string()),
            cpu_period: 100_000,
            cpu_quota: 50_000,
            timeout: Duration::from_secs(120),
        }
    }
}

impl SandboxConfig {
    /// Argument list for running `command` in a fresh container called `name`.
    pub fn run_args(&self, name: &str, command: &str) -> Vec<String> {
        let mut args = self.runtime_args.clone();
        args.extend([
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--pids-limit".to_string(),
            self.pids_limit.to_string(),
            "--memory".to_string(),
            self.memory.clone(),
            "--memory-swap".to_string(),
            self.memory.clone(),
        ]);
        if let Some(kernel_memory) = &self.kernel_memory {
            args.push("--kernel-memory".to_string());
            args.push(kernel_memory.clone());
        }
        args.extend([
            "--cpu-period".to_string(),
            self.cpu_period.to_string(),
            "--cpu-quota".to_string(),
            self.cpu_quota.to_string(),
            self.image.clone(),
            self.shell.clone(),
            "-c".to_string(),
            command.to_string(),
        ]);
        args
    }

    fn kill_args(&self, name: &str) -> Vec<String> {
        let mut args = self.runtime_args.clone();
        args.push("kill".to_string());
        args.push(name.to_string());
        args
    }
}

/// How a sandboxed command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success { output: String },
    Failed { code: Option<i32>, output: String },
    TimedOut { after: Duration, output: String },
    SpawnFailed { reason: String },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    /// Text fed back to the model.
    pub fn into_text(self) -> String {
        match self {
            ExecutionOutcome::Success { output } => output,
            ExecutionOutcome::Failed { code: Some(code), output } => {
                format!("{}command exited with status {}\n{}", ERROR_MARKER, code, output)
            }
            ExecutionOutcome::Failed { code: None, output } => {
                format!("{}command terminated by signal\n{}", ERROR_MARKER, output)
            }
            ExecutionOutcome::TimedOut { after, output } => {
                format!("{}command timed out after {}s\n{}", ERROR_MARKER, after.as_secs_f32(), output)
            }
            ExecutionOutcome::SpawnFailed { reason } => {
                format!("{}failed to start sandbox: {}", ERROR_MARKER, reason)
            }
        }
    }
}

/// Executes commands in a disposable container.
pub struct SandboxExecutor {
    config: SandboxConfig,
}

impl SandboxExecutor {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run `command` to completion or until the configured timeout.
    pub async fn execute(&self, command: &str) -> ExecutionOutcome {
        let name = format!("chatgpt-cli-{}", Uuid::new_v4());
        info!(command = command, container = %name, "Running sandboxed command");

        let spawned = Command::new(&self.config.runtime)
            .args(self.config.run_args(&name, command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!(runtime = %self.config.runtime, error = %e, "Failed to spawn sandbox runtime");
                return ExecutionOutcome::SpawnFailed {
                    reason: format!("{}: {}", self.config.runtime, e),
                };
            }
        };

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let stdout = tokio::spawn(drain(child.stdout.take(), buffer.clone()));
        let stderr = tokio::spawn(drain(child.stderr.take(), buffer.clone()));
        let drained = async {
            let _ = stdout.await;
            let _ = stderr.await;
        };

        let waited = tokio::time::timeout(self.config.timeout, child.wait()).await;
        match waited {
            Ok(Ok(status)) => {
                let _ = tokio::time::timeout(DRAIN_GRACE, drained).await;
                let output = collect(&buffer);
                debug!(status = ?status.code(), bytes = output.len(), "Sandboxed command finished");
                if status.success() {
                    ExecutionOutcome::Success { output }
                } else {
                    ExecutionOutcome::Failed {
                        code: status.code(),
                        output,
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed waiting on sandbox runtime");
                ExecutionOutcome::Failed {
                    code: None,
                    output: collect(&buffer),
                }
            }
            Err(_) => {
                warn!(container = %name, timeout = ?self.config.timeout, "Sandboxed command timed out");
                self.kill_container(&name).await;
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Runtime process already gone");
                }
                let _ = tokio::time::timeout(DRAIN_GRACE, drained).await;
                ExecutionOutcome::TimedOut {
                    after: self.config.timeout,
                    output: collect(&buffer),
                }
            }
        }
    }

    /// Killing the runtime client does not stop a detached container.
    async fn kill_container(&self, name: &str) {
        let result = tokio::time::timeout(
            DRAIN_GRACE,
            Command::new(&self.config.runtime)
                .args(self.config.kill_args(name))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .status(),
        )
        .await;

        match result {
            Ok(Ok(status)) if status.success() => debug!(container = name, "Container killed"),
            Ok(Ok(status)) => debug!(container = name, status = ?status.code(), "Container kill returned non-zero"),
            Ok(Err(e)) => warn!(container = name, error = %e, "Failed to kill container"),
            Err(_) => warn!(container = name, "Timed out killing container"),
        }
    }
}

#[async_trait]
impl CommandRunner for SandboxExecutor {
    async fn run(&self, command: &str) -> String {
        self.execute(command).await.into_text()
    }
}

async fn drain<R>(reader: Option<R>, buffer: Arc<Mutex<Vec<u8>>>)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return;
    };
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }
}

fn collect(buffer: &Mutex<Vec<u8>>) -> String {
    match buffer.lock() {
        Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
        Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
    }
}
