//! Test support utilities shared across unit and integration tests.
//!
//! The scripted doubles return pre-seeded responses in FIFO order and record
//! every invocation, so tests can assert both outcomes and call ordering
//! without a real fleet, prompt, or SSH client.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::fleet::{
    AppSummary, FleetApi, FleetError, FleetFuture, LaunchRequest, Machine, MachineState,
};
use crate::report::SessionReporter;
use crate::selector::{MachinePicker, PickError};
use crate::transport::{Transport, TransportError, TransportSession};

type Scripted<T> = Arc<Mutex<VecDeque<Result<T, FleetError>>>>;

/// Records a single invocation made through [`ScriptedFleet`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FleetCall {
    /// `get_app` with the application name.
    GetApp(String),
    /// `create_machine` with the requested machine name.
    Create(String),
    /// `get_machine` with the machine ID.
    GetMachine(String),
    /// `list_active`.
    ListActive,
    /// `stop_machine` with the machine ID.
    Stop(String),
    /// `wait_for_state` with the machine ID and target state.
    Wait(String, MachineState),
}

/// Scripted fleet API double.
#[derive(Clone, Debug, Default)]
pub struct ScriptedFleet {
    apps: Scripted<AppSummary>,
    created: Scripted<Machine>,
    machines: Scripted<Machine>,
    lists: Scripted<Vec<Machine>>,
    stops: Scripted<()>,
    waits: Scripted<()>,
    stop_delay: Arc<Mutex<Option<Duration>>>,
    wait_delay: Arc<Mutex<Option<Duration>>>,
    calls: Arc<Mutex<Vec<FleetCall>>>,
}

fn pop<T>(queue: &Scripted<T>) -> Result<T, FleetError> {
    let unscripted = || {
        Err(FleetError::Transport {
            message: String::from("no scripted response"),
        })
    };
    match queue.lock() {
        Ok(mut responses) => responses.pop_front().map_or_else(unscripted, |next| next),
        Err(_) => unscripted(),
    }
}

fn push<T>(queue: &Scripted<T>, response: Result<T, FleetError>) {
    if let Ok(mut responses) = queue.lock() {
        responses.push_back(response);
    }
}

impl ScriptedFleet {
    /// Creates a double with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a `get_app` response.
    pub fn push_app(&self, response: Result<AppSummary, FleetError>) {
        push(&self.apps, response);
    }

    /// Queues a `create_machine` response.
    pub fn push_created(&self, response: Result<Machine, FleetError>) {
        push(&self.created, response);
    }

    /// Queues a `get_machine` response.
    pub fn push_machine(&self, response: Result<Machine, FleetError>) {
        push(&self.machines, response);
    }

    /// Queues a `list_active` response.
    pub fn push_list(&self, response: Result<Vec<Machine>, FleetError>) {
        push(&self.lists, response);
    }

    /// Queues a `stop_machine` response.
    pub fn push_stop(&self, response: Result<(), FleetError>) {
        push(&self.stops, response);
    }

    /// Queues a `wait_for_state` response.
    pub fn push_wait(&self, response: Result<(), FleetError>) {
        push(&self.waits, response);
    }

    /// Delays every `stop_machine` response, simulating a hung API call.
    pub fn delay_stop(&self, delay: Duration) {
        if let Ok(mut slot) = self.stop_delay.lock() {
            *slot = Some(delay);
        }
    }

    /// Delays every `wait_for_state` response.
    pub fn delay_wait(&self, delay: Duration) {
        if let Ok(mut slot) = self.wait_delay.lock() {
            *slot = Some(delay);
        }
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<FleetCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: FleetCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn delay_for(slot: &Arc<Mutex<Option<Duration>>>) -> Option<Duration> {
        slot.lock().ok().and_then(|slot| *slot)
    }
}

impl FleetApi for ScriptedFleet {
    fn get_app<'a>(&'a self, name: &'a str) -> FleetFuture<'a, AppSummary> {
        self.record(FleetCall::GetApp(name.to_owned()));
        let response = pop(&self.apps);
        Box::pin(async move { response })
    }

    fn create_machine<'a>(&'a self, launch: &'a LaunchRequest) -> FleetFuture<'a, Machine> {
        self.record(FleetCall::Create(launch.name.clone()));
        let response = pop(&self.created);
        Box::pin(async move { response })
    }

    fn get_machine<'a>(&'a self, machine_id: &'a str) -> FleetFuture<'a, Machine> {
        self.record(FleetCall::GetMachine(machine_id.to_owned()));
        let response = pop(&self.machines);
        Box::pin(async move { response })
    }

    fn list_active(&self) -> FleetFuture<'_, Vec<Machine>> {
        self.record(FleetCall::ListActive);
        let response = pop(&self.lists);
        Box::pin(async move { response })
    }

    fn stop_machine<'a>(&'a self, machine_id: &'a str, _timeout: Duration) -> FleetFuture<'a, ()> {
        self.record(FleetCall::Stop(machine_id.to_owned()));
        let response = pop(&self.stops);
        let delay = Self::delay_for(&self.stop_delay);
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            response
        })
    }

    fn wait_for_state<'a>(
        &'a self,
        machine_id: &'a str,
        state: MachineState,
        _timeout: Duration,
    ) -> FleetFuture<'a, ()> {
        self.record(FleetCall::Wait(machine_id.to_owned(), state));
        let response = pop(&self.waits);
        let delay = Self::delay_for(&self.wait_delay);
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            response
        })
    }
}

/// Reporter that records progress and warnings for assertions.
#[derive(Clone, Debug, Default)]
pub struct RecordingReporter {
    progress: Arc<Mutex<Vec<String>>>,
    warnings: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all progress lines recorded so far.
    #[must_use]
    pub fn progress_lines(&self) -> Vec<String> {
        self.progress
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Returns all warnings recorded so far.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.warnings
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl SessionReporter for RecordingReporter {
    fn progress(&self, message: &str) {
        if let Ok(mut lines) = self.progress.lock() {
            lines.push(message.to_owned());
        }
    }

    fn warn(&self, message: &str) {
        if let Ok(mut lines) = self.warnings.lock() {
            lines.push(message.to_owned());
        }
    }
}

/// Picker double returning pre-seeded choices.
#[derive(Clone, Debug, Default)]
pub struct ScriptedPicker {
    choices: Arc<Mutex<VecDeque<Result<usize, PickError>>>>,
    prompts: Arc<Mutex<Vec<Vec<String>>>>,
}

impl ScriptedPicker {
    /// Creates a picker with no queued choices.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a zero-based choice.
    pub fn push_choice(&self, index: usize) {
        if let Ok(mut choices) = self.choices.lock() {
            choices.push_back(Ok(index));
        }
    }

    /// Queues a prompt failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        if let Ok(mut choices) = self.choices.lock() {
            choices.push_back(Err(PickError {
                message: message.into(),
            }));
        }
    }

    /// Returns the option lists presented so far.
    #[must_use]
    pub fn presented(&self) -> Vec<Vec<String>> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }
}

impl MachinePicker for ScriptedPicker {
    fn pick(&self, _prompt: &str, options: &[String]) -> Result<usize, PickError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(options.to_vec());
        }
        let unscripted = || {
            Err(PickError {
                message: String::from("no scripted choice"),
            })
        };
        match self.choices.lock() {
            Ok(mut choices) => choices.pop_front().map_or_else(unscripted, |next| next),
            Err(_) => unscripted(),
        }
    }
}

/// Transport double returning pre-seeded exit codes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransport {
    attach_failures: Arc<Mutex<VecDeque<TransportError>>>,
    runs: Arc<Mutex<VecDeque<Result<i32, TransportError>>>>,
    commands: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl ScriptedTransport {
    /// Creates a transport with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an exit code for the next run.
    pub fn push_exit_code(&self, code: i32) {
        if let Ok(mut runs) = self.runs.lock() {
            runs.push_back(Ok(code));
        }
    }

    /// Queues a run failure.
    pub fn push_run_failure(&self, error: TransportError) {
        if let Ok(mut runs) = self.runs.lock() {
            runs.push_back(Err(error));
        }
    }

    /// Makes the next attach fail with `error`.
    pub fn fail_next_attach(&self, error: TransportError) {
        if let Ok(mut failures) = self.attach_failures.lock() {
            failures.push_back(error);
        }
    }

    /// Returns `(destination, command)` pairs recorded so far.
    #[must_use]
    pub fn commands(&self) -> Vec<(String, Vec<String>)> {
        self.commands
            .lock()
            .map(|commands| commands.clone())
            .unwrap_or_default()
    }
}

impl Transport for ScriptedTransport {
    fn attach(&self, machine: &Machine, user: &str) -> Result<TransportSession, TransportError> {
        if let Ok(mut failures) = self.attach_failures.lock() {
            if let Some(error) = failures.pop_front() {
                return Err(error);
            }
        }
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
        if let Ok(mut commands) = self.commands.lock() {
            commands.push((session.destination.clone(), command.to_vec()));
        }
        let unscripted = || {
            Err(TransportError::Spawn {
                program: String::from("ssh"),
                message: String::from("no scripted response"),
            })
        };
        match self.runs.lock() {
            Ok(mut runs) => runs.pop_front().map_or_else(unscripted, |next| next),
            Err(_) => unscripted(),
        }
    }
}
