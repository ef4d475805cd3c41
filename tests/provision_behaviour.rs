//! Behavioural tests for ephemeral machine provisioning.

#[path = "common/machines.rs"]
mod machines;

use std::time::Duration;

use perch::destruction::DestructionCause;
use perch::provision::{ProvisionError, Provisioner};
use perch::test_support::{FleetCall, RecordingReporter, ScriptedFleet};
use perch::{FleetError, MachineState};

use machines::{
    app_with_release, app_without_release, destroyed_machine_with_exit, machine_in,
    started_machine,
};

#[tokio::test]
async fn provision_launches_and_waits_for_started() {
    let fleet = ScriptedFleet::new();
    fleet.push_created(Ok(machine_in("m-new", MachineState::Created)));
    fleet.push_wait(Ok(()));
    let app = app_with_release("demo");
    let reporter = RecordingReporter::new();

    let machine = Provisioner::new(&fleet, &app, "/bin/sh")
        .provision(&reporter)
        .await
        .expect("provisioning should succeed");

    assert_eq!(machine.id, "m-new");
    let calls = fleet.calls();
    assert!(
        matches!(
            calls.first(),
            Some(FleetCall::Create(name)) if name.starts_with("perch-console-")
        ),
        "expected a console-prefixed launch, got {calls:?}"
    );
    assert_eq!(
        calls.get(1),
        Some(&FleetCall::Wait(
            String::from("m-new"),
            MachineState::Started
        ))
    );
    assert!(
        reporter
            .progress_lines()
            .iter()
            .any(|line| line.contains("ephemeral machine m-new")),
        "expected creation progress, got {:?}",
        reporter.progress_lines()
    );
}

#[tokio::test]
async fn provision_requires_a_release() {
    let fleet = ScriptedFleet::new();
    let app = app_without_release("demo");

    let error = Provisioner::new(&fleet, &app, "/bin/sh")
        .provision(&RecordingReporter::new())
        .await
        .expect_err("an unreleased app cannot host a console");

    assert_eq!(
        error,
        ProvisionError::NoRelease {
            app: String::from("demo"),
        }
    );
    assert!(fleet.calls().is_empty(), "no fleet calls expected");
}

#[tokio::test]
async fn provision_surfaces_launch_rejection() {
    let fleet = ScriptedFleet::new();
    fleet.push_created(Err(FleetError::Api {
        status: 422,
        message: String::from("no capacity"),
    }));
    let app = app_with_release("demo");

    let error = Provisioner::new(&fleet, &app, "/bin/sh")
        .provision(&RecordingReporter::new())
        .await
        .expect_err("a rejected launch should fail");

    assert!(matches!(error, ProvisionError::Launch { .. }));
    assert!(error.machine_id().is_none(), "no machine was assigned");
}

#[tokio::test]
async fn start_timeout_preserves_the_machine_id_and_warns() {
    let fleet = ScriptedFleet::new();
    fleet.push_created(Ok(machine_in("m-slow", MachineState::Created)));
    fleet.push_wait(Err(FleetError::WaitTimeout {
        machine_id: String::from("m-slow"),
        state: MachineState::Started,
        secs: 1,
    }));
    let app = app_with_release("demo");
    let reporter = RecordingReporter::new();

    let error = Provisioner::new(&fleet, &app, "/bin/sh")
        .with_start_timeout(Duration::from_secs(1))
        .provision(&reporter)
        .await
        .expect_err("the wait should time out");

    assert_eq!(error.machine_id(), Some("m-slow"));
    assert!(matches!(error, ProvisionError::StartFailed { .. }));
    assert!(
        reporter
            .warnings()
            .iter()
            .any(|warning| warning.contains("destroy machine m-slow manually")),
        "expected manual cleanup guidance, got {:?}",
        reporter.warnings()
    );
}

#[tokio::test]
async fn destruction_race_is_diagnosed_with_the_exit_code() {
    let fleet = ScriptedFleet::new();
    fleet.push_created(Ok(machine_in("m-gone", MachineState::Created)));
    fleet.push_wait(Err(FleetError::NotFound {
        resource: String::from("machine m-gone"),
    }));
    fleet.push_machine(Ok(destroyed_machine_with_exit("m-gone", 137)));
    let app = app_with_release("demo");
    let reporter = RecordingReporter::new();

    let error = Provisioner::new(&fleet, &app, "/bin/sh")
        .provision(&reporter)
        .await
        .expect_err("a destroyed machine should fail provisioning");

    assert_eq!(
        error,
        ProvisionError::Destroyed {
            machine_id: String::from("m-gone"),
            cause: DestructionCause::ExitedWithCode(137),
        }
    );
    assert!(
        error.to_string().contains("exited unexpectedly with code 137"),
        "unexpected message: {error}"
    );
    assert!(
        reporter.warnings().is_empty(),
        "confirmed destruction needs no manual cleanup"
    );
}

#[tokio::test]
async fn transient_not_found_keeps_the_original_wait_error() {
    let fleet = ScriptedFleet::new();
    fleet.push_created(Ok(machine_in("m-flaky", MachineState::Created)));
    fleet.push_wait(Err(FleetError::NotFound {
        resource: String::from("machine m-flaky"),
    }));
    fleet.push_machine(Ok(started_machine("m-flaky")));
    let app = app_with_release("demo");

    let error = Provisioner::new(&fleet, &app, "/bin/sh")
        .provision(&RecordingReporter::new())
        .await
        .expect_err("the original wait failure is still a failure");

    assert_eq!(
        error,
        ProvisionError::StartFailed {
            machine_id: String::from("m-flaky"),
            source: FleetError::NotFound {
                resource: String::from("machine m-flaky"),
            },
        }
    );
}

#[tokio::test]
async fn failed_status_check_is_reported_as_such() {
    let fleet = ScriptedFleet::new();
    fleet.push_created(Ok(machine_in("m-dark", MachineState::Created)));
    fleet.push_wait(Err(FleetError::NotFound {
        resource: String::from("machine m-dark"),
    }));
    fleet.push_machine(Err(FleetError::Transport {
        message: String::from("connection reset"),
    }));
    let app = app_with_release("demo");
    let reporter = RecordingReporter::new();

    let error = Provisioner::new(&fleet, &app, "/bin/sh")
        .provision(&reporter)
        .await
        .expect_err("an unconfirmable machine should fail provisioning");

    assert!(matches!(error, ProvisionError::StatusCheckFailed { .. }));
    assert!(
        reporter
            .warnings()
            .iter()
            .any(|warning| warning.contains("manually")),
        "unknown fate requires manual cleanup guidance"
    );
}
