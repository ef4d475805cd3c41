//! Guaranteed teardown of session-owned machines.
//!
//! Runs whenever the session provisioned an ephemeral machine, regardless
//! of how the session itself ended. The coordinator uses its own time
//! budget rather than inheriting the session's, so a cancelled or failed
//! session cannot suppress cleanup of a real remote resource. Failures are
//! reported as warnings only; they never change the session's result.

use std::fmt::Display;
use std::time::Duration;

use crate::fleet::{FleetApi, Machine, MachineState};
use crate::report::SessionReporter;

/// Budget for the stop request and for the destruction wait.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// How a teardown attempt concluded. Observability only: no variant is ever
/// escalated to a session error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TeardownOutcome {
    /// Stop was acknowledged and destruction confirmed.
    Completed,
    /// The stop request failed; the destruction wait was not attempted.
    StopFailed,
    /// Stop was acknowledged but destruction was not confirmed in time.
    WaitFailed,
}

/// Stops and confirms destruction of ephemeral machines.
#[derive(Debug)]
pub struct TeardownCoordinator<'a, F: FleetApi> {
    fleet: &'a F,
    stop_timeout: Duration,
}

impl<'a, F: FleetApi> TeardownCoordinator<'a, F> {
    /// Creates a coordinator with the default stop budget.
    #[must_use]
    pub const fn new(fleet: &'a F) -> Self {
        Self {
            fleet,
            stop_timeout: STOP_TIMEOUT,
        }
    }

    /// Overrides the stop budget.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Stops `machine` and waits for confirmed destruction.
    ///
    /// Both steps run under this coordinator's own budget. Failures produce
    /// warnings naming the machine and advising manual destruction; the
    /// session's own error and exit code are never affected.
    pub async fn teardown(
        &self,
        machine: &Machine,
        reporter: &impl SessionReporter,
    ) -> TeardownOutcome {
        let stop = tokio::time::timeout(
            self.stop_timeout,
            self.fleet.stop_machine(&machine.id, self.stop_timeout),
        )
        .await;
        if let Err(err) = flatten(stop) {
            self.warn_manual_destroy(
                &machine.id,
                "Failed to stop ephemeral machine",
                &err,
                reporter,
            );
            return TeardownOutcome::StopFailed;
        }

        reporter.progress(&format!(
            "Waiting for ephemeral machine {} to be destroyed ...",
            machine.id
        ));
        let wait = tokio::time::timeout(
            self.stop_timeout,
            self.fleet
                .wait_for_state(&machine.id, MachineState::Destroyed, self.stop_timeout),
        )
        .await;
        match flatten(wait) {
            Ok(()) => TeardownOutcome::Completed,
            Err(err) => {
                self.warn_manual_destroy(
                    &machine.id,
                    "Failed to wait for ephemeral machine to be destroyed",
                    &err,
                    reporter,
                );
                TeardownOutcome::WaitFailed
            }
        }
    }

    fn warn_manual_destroy(
        &self,
        machine_id: &str,
        what: &str,
        err: &impl Display,
        reporter: &impl SessionReporter,
    ) {
        reporter.warn(&format!("{what} {machine_id}: {err}"));
        reporter.warn(&format!(
            "You may need to destroy machine {machine_id} manually."
        ));
    }
}

/// Collapses an outer budget expiry and an inner fleet failure into one
/// printable error.
fn flatten<E: Display>(
    result: Result<Result<(), E>, tokio::time::error::Elapsed>,
) -> Result<(), String> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err(String::from("timed out")),
    }
}
