//! Command-line interface definitions for the `perch` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `perch` binary.
#[derive(Debug, Parser)]
#[command(
    name = "perch",
    about = "Attach an interactive console to a machine in your app's fleet",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Open a console on an existing or ephemeral machine.
    #[command(
        name = "console",
        about = "Open a console on an existing or ephemeral machine"
    )]
    Console(ConsoleCommand),
}

/// Arguments for the `perch console` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ConsoleCommand {
    /// Attach to this machine instead of creating an ephemeral one.
    ///
    /// The machine must be in the `started` state and must not be a
    /// platform-reserved machine (for example a release-command runner).
    #[arg(value_name = "MACHINE_ID")]
    pub(crate) machine_id: Option<String>,
    /// Select the target machine from a list of started machines.
    ///
    /// Cannot be combined with an explicit machine ID.
    #[arg(short = 's', long = "select")]
    pub(crate) select: bool,
    /// Unix username to connect as.
    #[arg(short = 'u', long = "user", value_name = "USER")]
    pub(crate) user: Option<String>,
    /// Application name, overriding the configured default.
    #[arg(short = 'a', long = "app", value_name = "APP")]
    pub(crate) app: Option<String>,
}
