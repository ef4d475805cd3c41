//! Binary entry point for the Perch CLI.

use std::env;
use std::io::{self, Write};
use std::process;
#[cfg(test)]
use std::sync::OnceLock;
#[cfg(test)]
use std::{future::Future, pin::Pin};

use clap::Parser;
use thiserror::Error;

use perch::{
    ConsoleConfig, ConsoleReporter, FleetApi, HttpFleetClient, SelectionError, SelectionMode,
    SessionError, SessionRunner, SshTransport, TtyPicker,
};

use crate::cli::{Cli, ConsoleCommand};

mod cli;
#[cfg(test)]
mod test_helpers;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("fleet API error: {0}")]
    Fleet(String),
    #[error("console session failed: {0}")]
    Session(#[from] SessionError),
}

impl From<SelectionError> for CliError {
    fn from(value: SelectionError) -> Self {
        Self::Session(SessionError::Selection(value))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Console(command) => {
            #[cfg(test)]
            if let Some(hook) = CONSOLE_COMMAND_HOOK.get() {
                return hook(command).await;
            }

            console_command(command).await
        }
    }
}

async fn console_command(args: ConsoleCommand) -> Result<i32, CliError> {
    if let Some(result) = fake_session_from_env() {
        return result;
    }

    if let Some(err) = prefail_from_env() {
        return Err(err);
    }

    let mut config =
        ConsoleConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    if let Some(app) = args.app {
        config.app = app;
    }
    if let Some(user) = args.user {
        config.ssh_user = user;
    }
    config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;

    let mode = SelectionMode::from_flags(args.machine_id, args.select)?;

    let fleet = HttpFleetClient::new(&config).map_err(|err| CliError::Fleet(err.to_string()))?;
    let app = fleet
        .get_app(&config.app)
        .await
        .map_err(|err| CliError::Fleet(err.to_string()))?;
    let transport = SshTransport::with_process_runner(config.ssh_bin.clone());

    let runner = SessionRunner::new(fleet, transport, TtyPicker, ConsoleReporter, app)
        .with_console_command(config.console_command.clone())
        .with_ssh_user(config.ssh_user.clone());

    Ok(runner.run(mode).await?)
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
type ConsoleHook = dyn Fn(ConsoleCommand) -> Pin<Box<dyn Future<Output = Result<i32, CliError>> + Send>>
    + Send
    + Sync;

#[cfg(test)]
static CONSOLE_COMMAND_HOOK: OnceLock<Box<ConsoleHook>> = OnceLock::new();

fn fake_session_from_env() -> Option<Result<i32, CliError>> {
    let mode = env::var("PERCH_FAKE_SESSION_MODE").ok()?;
    match mode.as_str() {
        "exit-0" => {
            writeln!(io::stdout(), "fake-console-stdout").ok();
            writeln!(io::stderr(), "fake-console-stderr").ok();
            Some(Ok(0))
        }
        "exit-7" => {
            writeln!(io::stdout(), "fake-console-stdout").ok();
            writeln!(io::stderr(), "fake-console-stderr").ok();
            Some(Ok(7))
        }
        "missing-exit" => Some(Err(CliError::Session(SessionError::Remote {
            machine_id: String::from("fake"),
            source: perch::transport::TransportError::MissingExitCode {
                program: String::from("ssh"),
            },
        }))),
        _ => None,
    }
}

fn prefail_from_env() -> Option<CliError> {
    let mode = env::var("PERCH_FAKE_SESSION_PREFAIL").ok()?;
    match mode.as_str() {
        "config" => Some(CliError::Config(String::from("fake"))),
        "fleet" => Some(CliError::Fleet(String::from("fake"))),
        "session" => Some(CliError::Session(SessionError::Selection(
            SelectionError::NoMachinesAvailable,
        ))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::EnvGuard;

    async fn dispatch_with_hook<F, Fut>(hook: F) -> Result<i32, CliError>
    where
        F: Fn(ConsoleCommand) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<i32, CliError>> + Send + 'static,
    {
        CONSOLE_COMMAND_HOOK
            .set(Box::new(move |cmd| Box::pin(hook(cmd))))
            .ok();
        let cli = Cli::Console(ConsoleCommand {
            machine_id: None,
            select: false,
            user: None,
            app: None,
        });
        dispatch(cli).await
    }

    fn console_args() -> ConsoleCommand {
        ConsoleCommand {
            machine_id: None,
            select: false,
            user: None,
            app: None,
        }
    }

    #[tokio::test]
    async fn console_command_prefail_variants() {
        type ErrorPredicate = fn(&CliError) -> bool;
        let cases: [(&str, ErrorPredicate); 3] = [
            ("config", |err: &CliError| {
                matches!(err, CliError::Config(_))
            }),
            ("fleet", |err: &CliError| matches!(err, CliError::Fleet(_))),
            ("session", |err: &CliError| {
                matches!(err, CliError::Session(_))
            }),
        ];

        for (mode, predicate) in cases {
            let _guard = EnvGuard::set_var("PERCH_FAKE_SESSION_PREFAIL", mode).await;
            let result = console_command(console_args()).await;
            let err = result.expect_err("prefail should error");
            assert!(
                predicate(&err),
                "mode {mode} produced unexpected error: {err}"
            );
        }
    }

    #[tokio::test]
    async fn console_command_missing_exit_code_from_fake_mode() {
        let _guard = EnvGuard::set_var("PERCH_FAKE_SESSION_MODE", "missing-exit").await;
        let result = console_command(console_args()).await;

        assert!(
            matches!(result, Err(CliError::Session(SessionError::Remote { .. }))),
            "expected a remote session error, got {result:?}"
        );
    }

    #[tokio::test]
    async fn console_command_fake_exit_codes() {
        let _guard = EnvGuard::set_var("PERCH_FAKE_SESSION_MODE", "exit-7").await;
        let result = console_command(console_args()).await;

        assert!(matches!(result, Ok(7)), "expected Ok(7), got {result:?}");
    }

    #[tokio::test]
    async fn dispatch_uses_hook_result() {
        let result = dispatch_with_hook(|_| async { Ok(42) }).await;
        assert!(matches!(result, Ok(42)));
    }

    #[test]
    fn selector_conflict_is_a_session_error() {
        let result = SelectionMode::from_flags(Some(String::from("m1")), true)
            .map_err(CliError::from)
            .expect_err("conflicting selectors should error");

        assert!(
            matches!(
                result,
                CliError::Session(SessionError::Selection(
                    SelectionError::ConflictingSelectors
                ))
            ),
            "unexpected error: {result}"
        );
    }

    #[test]
    fn write_error_writes_cli_error() {
        let mut buf = Vec::new();
        let err = CliError::Config(String::from("missing token"));
        write_error(&mut buf, &err);
        let rendered = String::from_utf8(buf).expect("utf8");
        assert!(
            rendered.contains("configuration error: missing token"),
            "rendered: {rendered}"
        );
    }
}
