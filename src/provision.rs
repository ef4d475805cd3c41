//! Ephemeral machine provisioning.
//!
//! Creates a single-use console machine from the application's current
//! release and console-invocation template, then blocks until the machine is
//! confirmed `started` or the wait budget elapses. Failure paths are
//! classified precisely: a not-found failure during the wait is handed to
//! the destruction-race resolver so the operator learns whether the machine
//! crashed (and with which exit code) or genuinely vanished.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::destruction::{self, DestructionCause, DestructionVerdict};
use crate::fleet::{
    AppSummary, CONSOLE_ROLE, FleetApi, FleetError, GuestPreset, LaunchRequest, Machine,
    MachineConfig, MachineInit, MachineState, ROLE_METADATA_KEY,
};
use crate::report::SessionReporter;
use crate::transport::{CommandParseError, split_command};

/// Wall-clock budget for a freshly launched machine to reach `started`.
pub const START_WAIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Environment variable carrying the rendered console command inside an
/// ephemeral machine.
pub const CONSOLE_COMMAND_ENV: &str = "CONSOLE_COMMAND";

/// Errors surfaced while provisioning an ephemeral machine.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProvisionError {
    /// Raised when the application has never been released, so there is no
    /// image to boot an ephemeral machine from.
    #[error("can't create an ephemeral machine since app {app} has not been released yet")]
    NoRelease {
        /// Application that lacks a release.
        app: String,
    },
    /// Raised when the console-invocation template cannot be rendered.
    #[error("failed to generate ephemeral machine configuration: {source}")]
    ConfigGeneration {
        /// Template parse failure.
        #[source]
        source: CommandParseError,
    },
    /// Raised when the fleet API rejects the launch request.
    #[error("failed to launch ephemeral machine: {source}")]
    Launch {
        /// Underlying API failure.
        #[source]
        source: FleetError,
    },
    /// Raised when the machine does not reach `started` within the wait
    /// budget, or the wait fails for a reason other than destruction.
    #[error("ephemeral machine {machine_id} failed to start: {source}")]
    StartFailed {
        /// Machine that failed to start; teardown can still target it.
        machine_id: String,
        /// Underlying wait failure.
        #[source]
        source: FleetError,
    },
    /// Raised when the destruction-confirming fetch itself failed, leaving
    /// the machine's fate unknown.
    #[error("failed to check status of machine {machine_id}: {source}")]
    StatusCheckFailed {
        /// Machine whose status could not be confirmed.
        machine_id: String,
        /// Fetch failure.
        #[source]
        source: FleetError,
    },
    /// Raised when the machine was confirmed destroyed during boot.
    #[error("ephemeral machine {machine_id}: {cause}")]
    Destroyed {
        /// Machine that was destroyed.
        machine_id: String,
        /// Diagnosed destruction cause.
        cause: DestructionCause,
    },
}

impl ProvisionError {
    /// Returns the machine ID involved in the failure, when one exists.
    #[must_use]
    pub fn machine_id(&self) -> Option<&str> {
        match self {
            Self::NoRelease { .. } | Self::ConfigGeneration { .. } | Self::Launch { .. } => None,
            Self::StartFailed { machine_id, .. }
            | Self::StatusCheckFailed { machine_id, .. }
            | Self::Destroyed { machine_id, .. } => Some(machine_id),
        }
    }

    /// Returns `true` when destruction of the machine was confirmed, meaning
    /// no manual cleanup is required.
    #[must_use]
    pub const fn destruction_confirmed(&self) -> bool {
        matches!(self, Self::Destroyed { .. })
    }
}

/// Builds the configuration for an ephemeral console machine.
///
/// The image always comes from the application's current release and the
/// guest preset is forced to the smallest size; console machines are never
/// auto-sized. The machine idles under `/bin/sleep` awaiting attachment,
/// with the rendered console command exported for shells to exec.
///
/// # Errors
///
/// Returns [`ProvisionError::ConfigGeneration`] when the console template
/// cannot be rendered.
pub fn console_machine_config(
    console_command: &str,
    release_image: &str,
) -> Result<MachineConfig, ProvisionError> {
    let rendered = split_command(console_command)
        .map_err(|source| ProvisionError::ConfigGeneration { source })?;

    let mut metadata = BTreeMap::new();
    metadata.insert(ROLE_METADATA_KEY.to_owned(), CONSOLE_ROLE.to_owned());

    let mut env = BTreeMap::new();
    env.insert(
        CONSOLE_COMMAND_ENV.to_owned(),
        crate::transport::render_remote_command(&rendered),
    );

    Ok(MachineConfig {
        image: release_image.to_owned(),
        guest: GuestPreset::shared_cpu_1x(),
        env,
        metadata,
        init: Some(MachineInit {
            cmd: vec![String::from("/bin/sleep"), String::from("inf")],
        }),
        auto_destroy: true,
    })
}

/// Provisions ephemeral console machines for one application.
#[derive(Debug)]
pub struct Provisioner<'a, F: FleetApi> {
    fleet: &'a F,
    app: &'a AppSummary,
    console_command: &'a str,
    start_timeout: Duration,
}

impl<'a, F: FleetApi> Provisioner<'a, F> {
    /// Creates a provisioner for `app` using its console template.
    #[must_use]
    pub const fn new(fleet: &'a F, app: &'a AppSummary, console_command: &'a str) -> Self {
        Self {
            fleet,
            app,
            console_command,
            start_timeout: START_WAIT_TIMEOUT,
        }
    }

    /// Overrides the start wait budget.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Launches an ephemeral machine and waits for it to reach `started`.
    ///
    /// On success the returned machine is owned by this session and must be
    /// torn down when the session ends. On failure the error carries the
    /// machine ID when one was assigned, and a manual-cleanup warning is
    /// emitted unless destruction was already confirmed.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] describing the most specific failure
    /// available.
    pub async fn provision(
        &self,
        reporter: &impl SessionReporter,
    ) -> Result<Machine, ProvisionError> {
        let release =
            self.app
                .current_release
                .as_ref()
                .ok_or_else(|| ProvisionError::NoRelease {
                    app: self.app.name.clone(),
                })?;
        let config = console_machine_config(self.console_command, &release.image_ref)?;

        let launch = LaunchRequest {
            name: format!("perch-console-{}", Uuid::new_v4().simple()),
            region: None,
            config,
        };
        let machine = self
            .fleet
            .create_machine(&launch)
            .await
            .map_err(|source| ProvisionError::Launch { source })?;
        reporter.progress(&format!(
            "Created an ephemeral machine {} to run the console.",
            machine.id
        ));

        reporter.progress(&format!("Waiting for {} to start ...", machine.id));
        match self
            .fleet
            .wait_for_state(&machine.id, MachineState::Started, self.start_timeout)
            .await
        {
            Ok(()) => Ok(machine),
            Err(source) => Err(self.diagnose_wait_failure(&machine.id, source, reporter).await),
        }
    }

    /// Refines a wait failure into the most specific provisioning error.
    ///
    /// Not-found failures go through the destruction-race resolver; anything
    /// else is a start failure with the machine ID preserved so teardown can
    /// still target it.
    async fn diagnose_wait_failure(
        &self,
        machine_id: &str,
        source: FleetError,
        reporter: &impl SessionReporter,
    ) -> ProvisionError {
        let error = match source {
            FleetError::NotFound { .. } => {
                match destruction::resolve(self.fleet, machine_id, source).await {
                    DestructionVerdict::Unrelated(first_error) => ProvisionError::StartFailed {
                        machine_id: machine_id.to_owned(),
                        source: first_error,
                    },
                    DestructionVerdict::StatusCheckFailed(fetch_error) => {
                        ProvisionError::StatusCheckFailed {
                            machine_id: machine_id.to_owned(),
                            source: fetch_error,
                        }
                    }
                    DestructionVerdict::Confirmed(cause) => ProvisionError::Destroyed {
                        machine_id: machine_id.to_owned(),
                        cause,
                    },
                }
            }
            other => ProvisionError::StartFailed {
                machine_id: machine_id.to_owned(),
                source: other,
            },
        };

        if !error.destruction_confirmed() {
            reporter.warn(&format!(
                "You may need to destroy machine {machine_id} manually."
            ));
        }
        error
    }
}
