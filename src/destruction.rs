//! Destruction-race diagnosis for machines that vanish during boot.
//!
//! A not-found failure while waiting for a freshly launched machine is
//! ambiguous: the machine may never have registered, or it may have booted,
//! crashed, and been destroyed out-of-band. The distinction changes the
//! operator's remediation path (read the machine logs vs. file a bug), so
//! the resolver re-fetches the machine and inspects its event history to
//! produce the most specific verdict available.

use std::fmt;

use crate::fleet::{FleetApi, FleetError, MachineState};

/// Why a confirmed-destroyed machine went away.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DestructionCause {
    /// No exit event (or no exit cause record) was found; the machine is
    /// confirmed gone but the reason is unknown.
    Unknown,
    /// An exit event exists but its exit code data is malformed.
    MalformedExit,
    /// The machine's workload exited with this code before destruction.
    ExitedWithCode(i32),
}

impl fmt::Display for DestructionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("machine was destroyed unexpectedly"),
            Self::MalformedExit => f.write_str("machine exited unexpectedly"),
            Self::ExitedWithCode(code) => {
                write!(f, "machine exited unexpectedly with code {code}")
            }
        }
    }
}

/// Outcome of a destruction-race diagnosis.
///
/// Modelled as an explicit tagged union so callers branch exhaustively
/// instead of inspecting wrapped error types.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DestructionVerdict {
    /// The not-found condition was transient or unrelated; the original
    /// error is carried unchanged and manual cleanup may still be needed.
    Unrelated(FleetError),
    /// The confirming fetch itself failed, so destruction cannot be
    /// confirmed and manual cleanup must be assumed necessary.
    StatusCheckFailed(FleetError),
    /// Destruction is confirmed; no manual cleanup is needed.
    Confirmed(DestructionCause),
}

/// Diagnoses why a machine disappeared after `first_error` was observed.
///
/// Re-fetches the machine by ID and classifies the result per the verdict
/// variants above. The first `exit` event in the recorded history supplies
/// the exit cause when destruction is confirmed.
pub async fn resolve<F: FleetApi + ?Sized>(
    fleet: &F,
    machine_id: &str,
    first_error: FleetError,
) -> DestructionVerdict {
    let machine = match fleet.get_machine(machine_id).await {
        Ok(machine) => machine,
        Err(err) => return DestructionVerdict::StatusCheckFailed(err),
    };

    if machine.state != MachineState::Destroyed && machine.state != MachineState::Destroying {
        return DestructionVerdict::Unrelated(first_error);
    }

    let Some(exit_event) = machine.first_exit_event() else {
        return DestructionVerdict::Confirmed(DestructionCause::Unknown);
    };
    let Some(request) = exit_event.request.as_ref() else {
        return DestructionVerdict::Confirmed(DestructionCause::Unknown);
    };

    match request.exit_code() {
        Ok(code) => DestructionVerdict::Confirmed(DestructionCause::ExitedWithCode(code)),
        Err(_) => DestructionVerdict::Confirmed(DestructionCause::MalformedExit),
    }
}
