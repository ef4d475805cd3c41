//! Behavioural tests for end-to-end console sessions.
//!
//! These cover the teardown guarantees: ephemeral machines are torn down
//! whether the session succeeded or failed, pre-existing machines are left
//! alone, and teardown failures never replace the session's own result.

#[path = "common/machines.rs"]
mod machines;

use perch::fleet::MachineState;
use perch::selector::{SelectionError, SelectionMode};
use perch::session::{SessionError, SessionRunner};
use perch::test_support::{
    FleetCall, RecordingReporter, ScriptedFleet, ScriptedPicker, ScriptedTransport,
};
use perch::transport::TransportError;
use perch::FleetError;

use machines::{app_with_release, machine_in, started_machine};

fn runner(
    fleet: &ScriptedFleet,
    transport: &ScriptedTransport,
    reporter: &RecordingReporter,
) -> SessionRunner<ScriptedFleet, ScriptedTransport, ScriptedPicker, RecordingReporter> {
    SessionRunner::new(
        fleet.clone(),
        transport.clone(),
        ScriptedPicker::new(),
        reporter.clone(),
        app_with_release("demo"),
    )
}

#[tokio::test]
async fn ephemeral_session_propagates_exit_code_and_tears_down() {
    let fleet = ScriptedFleet::new();
    fleet.push_created(Ok(started_machine("m-eph")));
    fleet.push_wait(Ok(()));
    fleet.push_stop(Ok(()));
    fleet.push_wait(Ok(()));
    let transport = ScriptedTransport::new();
    transport.push_exit_code(7);
    let reporter = RecordingReporter::new();

    let code = runner(&fleet, &transport, &reporter)
        .run(SelectionMode::CreateEphemeral)
        .await
        .expect("the session should succeed");

    assert_eq!(code, 7);
    let calls = fleet.calls();
    assert!(
        calls.contains(&FleetCall::Stop(String::from("m-eph"))),
        "teardown should stop the machine, got {calls:?}"
    );
    assert!(
        calls.contains(&FleetCall::Wait(
            String::from("m-eph"),
            MachineState::Destroyed
        )),
        "teardown should confirm destruction, got {calls:?}"
    );

    let commands = transport.commands();
    assert_eq!(
        commands.first(),
        Some(&(
            String::from("root@fdaa::1"),
            vec![String::from("/bin/sh")]
        ))
    );
}

#[tokio::test]
async fn teardown_runs_even_when_attach_fails() {
    let fleet = ScriptedFleet::new();
    let mut machine = started_machine("m-eph");
    machine.private_ip = None;
    fleet.push_created(Ok(machine));
    fleet.push_wait(Ok(()));
    fleet.push_stop(Ok(()));
    fleet.push_wait(Ok(()));
    let transport = ScriptedTransport::new();
    let reporter = RecordingReporter::new();

    let error = runner(&fleet, &transport, &reporter)
        .run(SelectionMode::CreateEphemeral)
        .await
        .expect_err("attach should fail without an address");

    assert!(matches!(
        error,
        SessionError::Attach {
            ref machine_id,
            source: TransportError::MissingAddress { .. },
        } if machine_id == "m-eph"
    ));
    assert!(
        fleet
            .calls()
            .contains(&FleetCall::Stop(String::from("m-eph"))),
        "the session still owns the machine and must tear it down"
    );
}

#[tokio::test]
async fn teardown_failure_never_replaces_a_successful_result() {
    let fleet = ScriptedFleet::new();
    fleet.push_created(Ok(started_machine("m-eph")));
    fleet.push_wait(Ok(()));
    fleet.push_stop(Err(FleetError::Api {
        status: 500,
        message: String::from("boom"),
    }));
    let transport = ScriptedTransport::new();
    transport.push_exit_code(0);
    let reporter = RecordingReporter::new();

    let code = runner(&fleet, &transport, &reporter)
        .run(SelectionMode::CreateEphemeral)
        .await
        .expect("teardown failures must not fail the session");

    assert_eq!(code, 0);
    assert!(
        reporter
            .warnings()
            .iter()
            .any(|warning| warning.contains("destroy machine m-eph manually")),
        "expected manual cleanup guidance, got {:?}",
        reporter.warnings()
    );
}

#[tokio::test]
async fn teardown_failure_never_replaces_the_first_error() {
    let fleet = ScriptedFleet::new();
    fleet.push_created(Ok(started_machine("m-eph")));
    fleet.push_wait(Ok(()));
    fleet.push_stop(Err(FleetError::Transport {
        message: String::from("connection reset"),
    }));
    let transport = ScriptedTransport::new();
    transport.push_run_failure(TransportError::MissingExitCode {
        program: String::from("ssh"),
    });
    let reporter = RecordingReporter::new();

    let error = runner(&fleet, &transport, &reporter)
        .run(SelectionMode::CreateEphemeral)
        .await
        .expect_err("the remote failure should be returned");

    assert!(
        matches!(
            error,
            SessionError::Remote {
                source: TransportError::MissingExitCode { .. },
                ..
            }
        ),
        "the remote failure must survive a failed teardown"
    );
}

#[tokio::test]
async fn explicit_machines_are_never_torn_down() {
    let fleet = ScriptedFleet::new();
    fleet.push_machine(Ok(started_machine("m-yours")));
    let transport = ScriptedTransport::new();
    transport.push_exit_code(0);
    let reporter = RecordingReporter::new();

    let code = runner(&fleet, &transport, &reporter)
        .run(SelectionMode::Explicit(String::from("m-yours")))
        .await
        .expect("the session should succeed");

    assert_eq!(code, 0);
    let calls = fleet.calls();
    assert!(
        !calls
            .iter()
            .any(|call| matches!(call, FleetCall::Stop(_))),
        "pre-existing machines must not be stopped, got {calls:?}"
    );
}

#[tokio::test]
async fn selection_failure_skips_attach_and_teardown() {
    let fleet = ScriptedFleet::new();
    fleet.push_machine(Ok(machine_in("m-cold", MachineState::Stopping)));
    let transport = ScriptedTransport::new();
    let reporter = RecordingReporter::new();

    let error = runner(&fleet, &transport, &reporter)
        .run(SelectionMode::Explicit(String::from("m-cold")))
        .await
        .expect_err("a stopped machine is not attachable");

    assert!(matches!(
        error,
        SessionError::Selection(SelectionError::NotStarted { .. })
    ));
    assert!(transport.commands().is_empty(), "nothing should run");
    assert!(
        !fleet
            .calls()
            .iter()
            .any(|call| matches!(call, FleetCall::Stop(_))),
        "nothing to tear down"
    );
}

#[tokio::test]
async fn invalid_console_command_fails_before_any_fleet_call() {
    let fleet = ScriptedFleet::new();
    let transport = ScriptedTransport::new();
    let reporter = RecordingReporter::new();

    let error = runner(&fleet, &transport, &reporter)
        .with_console_command("sh -c 'broken")
        .run(SelectionMode::CreateEphemeral)
        .await
        .expect_err("an unparseable template should fail fast");

    assert!(matches!(error, SessionError::Command(_)));
    assert!(fleet.calls().is_empty(), "no fleet calls expected");
}

#[tokio::test]
async fn custom_user_is_used_for_the_destination() {
    let fleet = ScriptedFleet::new();
    fleet.push_machine(Ok(started_machine("m-yours")));
    let transport = ScriptedTransport::new();
    transport.push_exit_code(0);
    let reporter = RecordingReporter::new();

    runner(&fleet, &transport, &reporter)
        .with_ssh_user("deploy")
        .run(SelectionMode::Explicit(String::from("m-yours")))
        .await
        .expect("the session should succeed");

    let commands = transport.commands();
    assert!(
        matches!(
            commands.first(),
            Some((destination, _)) if destination == "deploy@fdaa::1"
        ),
        "expected a deploy@ destination, got {commands:?}"
    );
}
