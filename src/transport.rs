//! Interactive transport over the system `ssh` client.
//!
//! The console session reaches a machine's private address by shelling out
//! to `ssh`, mirroring how operators connect by hand. Command execution is
//! abstracted behind [`CommandRunner`] so tests can script outcomes without
//! spawning processes.

use std::ffi::OsString;
use std::process::Command;

use shell_escape::unix::escape;
use thiserror::Error;

use crate::fleet::Machine;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output (empty for interactive runs).
    pub stdout: String,
    /// Captured standard error (empty for interactive runs).
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, TransportError>;
}

/// Runner that executes the command with inherited standard streams, as an
/// interactive console requires.
#[derive(Clone, Copy, Debug, Default)]
pub struct InteractiveProcessRunner;

impl CommandRunner for InteractiveProcessRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, TransportError> {
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|err| TransportError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: status.code(),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// Errors raised while parsing a command template into arguments.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CommandParseError {
    /// Raised when the template contains no arguments.
    #[error("command template is empty")]
    Empty,
    /// Raised when a quoted section never closes.
    #[error("command template has an unterminated quote")]
    UnterminatedQuote,
}

/// Splits a command template into arguments, honouring single quotes, double
/// quotes, and backslash escapes outside single quotes.
///
/// # Errors
///
/// Returns [`CommandParseError`] when the template is empty or a quote is
/// left unterminated.
pub fn split_command(raw: &str) -> Result<Vec<String>, CommandParseError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = raw.chars();

    while let Some(ch) = chars.next() {
        match quote {
            Some('\'') if ch == '\'' => quote = None,
            Some('\'') => current.push(ch),
            Some('"') if ch == '"' => quote = None,
            Some('"') if ch == '\\' => match chars.next() {
                Some(next) => current.push(next),
                None => return Err(CommandParseError::UnterminatedQuote),
            },
            Some(_) => current.push(ch),
            None if ch == '\'' || ch == '"' => {
                quote = Some(ch);
                in_word = true;
            }
            None if ch == '\\' => {
                match chars.next() {
                    Some(next) => current.push(next),
                    None => current.push(ch),
                }
                in_word = true;
            }
            None if ch.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(ch);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err(CommandParseError::UnterminatedQuote);
    }
    if in_word {
        args.push(current);
    }
    if args.is_empty() {
        return Err(CommandParseError::Empty);
    }
    Ok(args)
}

/// Joins arguments into a single shell-safe command string.
#[must_use]
pub fn render_remote_command(args: &[String]) -> String {
    let mut result = String::new();
    let mut first = true;

    for arg in args {
        if first {
            first = false;
        } else {
            result.push(' ');
        }

        let escaped = escape(arg.as_str().into());
        result.push_str(escaped.as_ref());
    }

    result
}

/// Open channel to a machine, ready to run commands.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransportSession {
    /// SSH destination in `user@host` form.
    pub destination: String,
}

/// Errors surfaced by the interactive transport.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransportError {
    /// Raised when the target machine has no private address to connect to.
    #[error("machine {machine_id} has no private address")]
    MissingAddress {
        /// Machine that lacked an address.
        machine_id: String,
    },
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the process finishes without yielding an exit status.
    #[error("{program} did not return an exit code")]
    MissingExitCode {
        /// Command that completed without a status.
        program: String,
    },
}

/// Contract the session runner requires from an interactive transport.
pub trait Transport {
    /// Opens a channel to the machine's private address for `user`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MissingAddress`] when the machine exposes no
    /// private address.
    fn attach(&self, machine: &Machine, user: &str) -> Result<TransportSession, TransportError>;

    /// Runs `command` over the open channel and returns the remote exit code.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the channel process cannot be spawned
    /// or terminates without an exit status.
    fn run(&self, session: &TransportSession, command: &[String]) -> Result<i32, TransportError>;
}

/// Transport backed by the system `ssh` binary.
#[derive(Clone, Debug)]
pub struct SshTransport<R: CommandRunner> {
    ssh_bin: String,
    runner: R,
}

impl SshTransport<InteractiveProcessRunner> {
    /// Creates a transport wired to the real interactive process runner.
    #[must_use]
    pub fn with_process_runner(ssh_bin: impl Into<String>) -> Self {
        Self::new(ssh_bin, InteractiveProcessRunner)
    }
}

impl<R: CommandRunner> SshTransport<R> {
    /// Creates a transport using the provided runner.
    #[must_use]
    pub fn new(ssh_bin: impl Into<String>, runner: R) -> Self {
        Self {
            ssh_bin: ssh_bin.into(),
            runner,
        }
    }

    fn build_args(&self, session: &TransportSession, command: &[String]) -> Vec<OsString> {
        vec![
            OsString::from("-t"),
            OsString::from("-o"),
            OsString::from("StrictHostKeyChecking=no"),
            OsString::from("-o"),
            OsString::from("UserKnownHostsFile=/dev/null"),
            OsString::from(&session.destination),
            OsString::from("--"),
            OsString::from(render_remote_command(command)),
        ]
    }
}

impl<R: CommandRunner> Transport for SshTransport<R> {
    fn attach(&self, machine: &Machine, user: &str) -> Result<TransportSession, TransportError> {
        let address =
            machine
                .private_ip
                .as_deref()
                .ok_or_else(|| TransportError::MissingAddress {
                    machine_id: machine.id.clone(),
                })?;
        Ok(TransportSession {
            destination: format!("{user}@{address}"),
        })
    }

    fn run(&self, session: &TransportSession, command: &[String]) -> Result<i32, TransportError> {
        let args = self.build_args(session, command);
        let output = self.runner.run(&self.ssh_bin, &args)?;
        output.code.ok_or_else(|| TransportError::MissingExitCode {
            program: self.ssh_bin.clone(),
        })
    }
}
