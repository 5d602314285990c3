//! Base command execution abstraction
//!
//! Every call into `helm`, `kubectl` or the in-container tooling goes through
//! [`CommandRunner`], so workflows can be exercised against scripted doubles.
//! Arguments are typed as plain or secret; secret values never reach a trace
//! line or an error message.

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

const REDACTED: &str = "******";

/// One argument passed to an external program
#[derive(Clone, PartialEq, Eq)]
pub enum CommandArg {
    Plain(String),
    /// Passed to the program verbatim, rendered as `******` everywhere else
    Secret(String),
}

impl CommandArg {
    pub fn secret(value: impl Into<String>) -> Self {
        CommandArg::Secret(value.into())
    }

    /// The real value handed to the child process
    pub fn expose(&self) -> &str {
        match self {
            CommandArg::Plain(value) | CommandArg::Secret(value) => value,
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, CommandArg::Secret(_))
    }
}

impl fmt::Display for CommandArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandArg::Plain(value) => f.write_str(value),
            CommandArg::Secret(_) => f.write_str(REDACTED),
        }
    }
}

impl fmt::Debug for CommandArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandArg::Plain(value) => write!(f, "Plain({value:?})"),
            CommandArg::Secret(_) => write!(f, "Secret({REDACTED})"),
        }
    }
}

impl From<&str> for CommandArg {
    fn from(value: &str) -> Self {
        CommandArg::Plain(value.to_string())
    }
}

impl From<String> for CommandArg {
    fn from(value: String) -> Self {
        CommandArg::Plain(value)
    }
}

/// A fully described external program call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<CommandArg>,
    pub timeout: Duration,
}

impl Invocation {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<CommandArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<CommandArg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn secret(mut self, value: impl Into<String>) -> Self {
        self.args.push(CommandArg::secret(value));
        self
    }

    /// Command line safe for logs and audit details
    pub fn display(&self) -> String {
        let mut rendered = self.program.clone();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&arg.to_string());
        }
        rendered
    }

    /// Scrub every secret argument value out of `text`
    ///
    /// For `key=value` secrets the bare value is scrubbed too, since tools
    /// tend to echo only the value back.
    pub fn redact(&self, text: &str) -> String {
        self.args
            .iter()
            .filter(|arg| arg.is_secret())
            .flat_map(|arg| {
                let whole = arg.expose();
                let value = whole.split_once('=').map(|(_, value)| value);
                [Some(whole), value]
            })
            .flatten()
            .filter(|secret| !secret.is_empty())
            .fold(text.to_string(), |acc, secret| acc.replace(secret, REDACTED))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Command timed out after {}s: {command}", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },
    #[error("Command failed: {message}")]
    ExecutionFailed {
        command: String,
        exit_code: Option<i32>,
        message: String,
    },
    #[error("Command not found: {program}")]
    NotFound { program: String },
    #[error("IO error running {command}: {message}")]
    Io { command: String, message: String },
}

impl CommandError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandError::Timeout { .. })
    }
}

/// Trait for executing external commands
///
/// Returns trimmed standard output on a zero exit status. No retries happen
/// here; retry policy belongs to the caller.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<String, CommandError>;
}

/// Real implementation on top of `tokio::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandRunner;

#[async_trait]
impl CommandRunner for ProcessCommandRunner {
    async fn run(&self, invocation: &Invocation) -> Result<String, CommandError> {
        let command_line = invocation.display();
        debug!(command = %command_line, timeout_secs = invocation.timeout.as_secs(), "Running command");
        let started = Instant::now();

        // The child is killed when the wait future is dropped on timeout.
        let child = Command::new(&invocation.program)
            .args(invocation.args.iter().map(CommandArg::expose))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CommandError::NotFound {
                        program: invocation.program.clone(),
                    }
                } else {
                    CommandError::Io {
                        command: command_line.clone(),
                        message: e.to_string(),
                    }
                }
            })?;

        let output = match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| CommandError::Io {
                command: command_line.clone(),
                message: e.to_string(),
            })?,
            Err(_) => {
                debug!(command = %command_line, "Command timed out, child killed");
                return Err(CommandError::Timeout {
                    command: command_line,
                    timeout: invocation.timeout,
                });
            }
        };

        let elapsed_ms = started.elapsed().as_millis();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

        if output.status.success() {
            debug!(command = %command_line, elapsed_ms, "Command succeeded");
            return Ok(invocation.redact(&stdout));
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() { stdout } else { stderr };
        debug!(
            command = %command_line,
            elapsed_ms,
            exit_code = ?output.status.code(),
            "Command failed"
        );

        Err(CommandError::ExecutionFailed {
            command: command_line,
            exit_code: output.status.code(),
            message: invocation.redact(&message),
        })
    }
}
