//! End-to-end console session orchestration.
//!
//! Drives selection (possibly provisioning), attach, remote execution, and
//! teardown in that order. Teardown runs whenever the session owns an
//! ephemeral machine, even when attach or the remote command failed, and
//! never replaces the first error encountered.

use std::time::Duration;

use thiserror::Error;

use crate::fleet::{AppSummary, FleetApi, Machine};
use crate::provision::{Provisioner, START_WAIT_TIMEOUT};
use crate::report::SessionReporter;
use crate::selector::{MachinePicker, MachineSelector, SelectionError, SelectionMode};
use crate::teardown::{STOP_TIMEOUT, TeardownCoordinator};
use crate::transport::{CommandParseError, Transport, TransportError};

/// Errors surfaced by a console session.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SessionError {
    /// Raised when machine acquisition fails.
    #[error(transparent)]
    Selection(#[from] SelectionError),
    /// Raised when the console command template cannot be rendered.
    #[error("invalid console command: {0}")]
    Command(#[from] CommandParseError),
    /// Raised when the interactive channel cannot be opened.
    #[error("failed to attach to machine {machine_id}: {source}")]
    Attach {
        /// Machine the session tried to attach to.
        machine_id: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },
    /// Raised when the remote console command fails to run.
    #[error("console on machine {machine_id} failed: {source}")]
    Remote {
        /// Machine the console ran on.
        machine_id: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },
}

/// Runs one console session from selection through teardown.
#[derive(Debug)]
pub struct SessionRunner<F, T, P, R>
where
    F: FleetApi,
    T: Transport,
    P: MachinePicker,
    R: SessionReporter,
{
    fleet: F,
    transport: T,
    picker: P,
    reporter: R,
    app: AppSummary,
    console_command: String,
    ssh_user: String,
    start_timeout: Duration,
    stop_timeout: Duration,
}

impl<F, T, P, R> SessionRunner<F, T, P, R>
where
    F: FleetApi,
    T: Transport,
    P: MachinePicker,
    R: SessionReporter,
{
    /// Creates a runner with default console command, user, and budgets.
    #[must_use]
    pub fn new(fleet: F, transport: T, picker: P, reporter: R, app: AppSummary) -> Self {
        Self {
            fleet,
            transport,
            picker,
            reporter,
            app,
            console_command: String::from("/bin/sh"),
            ssh_user: String::from("root"),
            start_timeout: START_WAIT_TIMEOUT,
            stop_timeout: STOP_TIMEOUT,
        }
    }

    /// Sets the console command template.
    #[must_use]
    pub fn with_console_command(mut self, command: impl Into<String>) -> Self {
        self.console_command = command.into();
        self
    }

    /// Sets the remote username.
    #[must_use]
    pub fn with_ssh_user(mut self, user: impl Into<String>) -> Self {
        self.ssh_user = user.into();
        self
    }

    /// Overrides the machine start budget.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Overrides the teardown stop budget.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Runs the session and returns the remote command's exit code.
    ///
    /// Provisioning concludes (success or definitive failure) before attach
    /// is attempted; teardown begins only after attach/run has concluded,
    /// and runs on its own budget whenever the selection was ephemeral.
    ///
    /// # Errors
    ///
    /// Returns the first [`SessionError`] encountered. Teardown failures are
    /// reported as warnings and never alter the returned result.
    pub async fn run(&self, mode: SelectionMode) -> Result<i32, SessionError> {
        let command = crate::transport::split_command(&self.console_command)?;

        let provisioner = Provisioner::new(&self.fleet, &self.app, &self.console_command)
            .with_start_timeout(self.start_timeout);
        let selector = MachineSelector::new(&self.fleet, &self.picker, provisioner);
        let selection = selector.select(mode, &self.reporter).await?;

        let result = self.attach_and_run(&selection.machine, &command);

        if selection.ephemeral {
            TeardownCoordinator::new(&self.fleet)
                .with_stop_timeout(self.stop_timeout)
                .teardown(&selection.machine, &self.reporter)
                .await;
        }

        result
    }

    fn attach_and_run(&self, machine: &Machine, command: &[String]) -> Result<i32, SessionError> {
        let session = self
            .transport
            .attach(machine, &self.ssh_user)
            .map_err(|source| SessionError::Attach {
                machine_id: machine.id.clone(),
                source,
            })?;
        self.transport
            .run(&session, command)
            .map_err(|source| SessionError::Remote {
                machine_id: machine.id.clone(),
                source,
            })
    }
}
