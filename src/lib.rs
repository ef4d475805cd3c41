//! Core library for the Perch console tool.
//!
//! The crate attaches an interactive console to a machine in an
//! application's fleet: it acquires a machine (explicit ID, interactive
//! pick, or a freshly provisioned ephemeral one), runs the console command
//! over SSH, and guarantees teardown of any machine the session created.

pub mod config;
pub mod destruction;
pub mod fleet;
pub mod provision;
pub mod report;
pub mod selector;
pub mod session;
pub mod teardown;
pub mod test_support;
pub mod transport;

pub use config::{ConfigError, ConsoleConfig};
pub use destruction::{DestructionCause, DestructionVerdict};
pub use fleet::{AppSummary, FleetApi, FleetError, HttpFleetClient, Machine, MachineState};
pub use provision::{ProvisionError, Provisioner, START_WAIT_TIMEOUT};
pub use report::{ConsoleReporter, SessionReporter};
pub use selector::{
    MachinePicker, MachineSelector, Selection, SelectionError, SelectionMode, TtyPicker,
};
pub use session::{SessionError, SessionRunner};
pub use teardown::{STOP_TIMEOUT, TeardownCoordinator, TeardownOutcome};
pub use transport::{CommandRunner, InteractiveProcessRunner, SshTransport, Transport};
