//! Fleet API collaborator: machine data model and client abstraction.
//!
//! The fleet hosts an application's machines, each with an observable
//! lifecycle (`created` → `starting` → `started` → `stopping` →
//! `destroying` → `destroyed`) and an ordered event history. This module
//! defines the wire types plus the [`FleetApi`] trait the lifecycle core is
//! written against; the HTTP implementation lives in [`http`].

mod error;
pub mod http;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use error::FleetError;
pub use http::HttpFleetClient;

/// Metadata key marking the platform role a machine was created for.
pub const ROLE_METADATA_KEY: &str = "perch_platform_role";

/// Metadata value identifying a release-command runner machine.
pub const RELEASE_COMMAND_ROLE: &str = "release-command";

/// Metadata value identifying an ephemeral console machine.
pub const CONSOLE_ROLE: &str = "console";

/// Lifecycle state reported by the fleet API.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    /// Machine record exists but has never booted.
    Created,
    /// Machine is booting.
    Starting,
    /// Machine is running and reachable.
    Started,
    /// Machine is shutting down.
    Stopping,
    /// Machine is being removed by the platform.
    Destroying,
    /// Machine no longer exists.
    Destroyed,
    /// Machine is being replaced by the platform (transient).
    Replacing,
}

impl MachineState {
    /// Returns the wire-format name for this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Destroying => "destroying",
            Self::Destroyed => "destroyed",
            Self::Replacing => "replacing",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exit cause record attached to an `exit` lifecycle event.
///
/// The exit code arrives as raw JSON because older fleet agents reported it
/// as a string and some crash paths omit it entirely; [`ExitRequest::exit_code`]
/// normalises it and fails on malformed data.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ExitRequest {
    /// Raw exit code as reported by the machine agent, if any.
    #[serde(default)]
    pub exit_code: Option<serde_json::Value>,
}

/// Raised when an exit event carries no usable exit code.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("exit code missing or malformed")]
pub struct MalformedExitCode;

impl ExitRequest {
    /// Returns the exit code recorded for this event.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedExitCode`] when the code is absent, not an integer,
    /// or outside the `i32` range.
    pub fn exit_code(&self) -> Result<i32, MalformedExitCode> {
        let raw = self.exit_code.as_ref().ok_or(MalformedExitCode)?;
        let code = raw.as_i64().ok_or(MalformedExitCode)?;
        i32::try_from(code).map_err(|_| MalformedExitCode)
    }
}

/// A single entry in a machine's lifecycle event history.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MachineEvent {
    /// Event type tag, for example `start`, `stop`, or `exit`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Exit cause details, present only on some `exit` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ExitRequest>,
}

/// Virtual hardware assigned to a machine.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GuestPreset {
    /// CPU class, for example `shared` or `performance`.
    pub cpu_kind: String,
    /// Number of virtual CPUs.
    pub cpus: u32,
    /// Memory allocation in megabytes.
    pub memory_mb: u32,
}

impl GuestPreset {
    /// Smallest preset: one shared vCPU and 256 MB of memory.
    ///
    /// Ephemeral console machines are always launched with this preset and
    /// are never auto-sized.
    #[must_use]
    pub fn shared_cpu_1x() -> Self {
        Self {
            cpu_kind: String::from("shared"),
            cpus: 1,
            memory_mb: 256,
        }
    }
}

/// Init process override applied to a machine on boot.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MachineInit {
    /// Command executed as the machine's init process.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
}

/// Full configuration submitted when launching a machine.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MachineConfig {
    /// Container image reference the machine boots from.
    pub image: String,
    /// Virtual hardware assigned to the machine.
    pub guest: GuestPreset,
    /// Environment variables injected into the machine.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Free-form metadata; see [`ROLE_METADATA_KEY`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// Init process override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<MachineInit>,
    /// When `true`, the platform removes the machine once it stops.
    #[serde(default)]
    pub auto_destroy: bool,
}

/// A remote compute unit owned by an application.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Machine {
    /// Opaque identifier assigned by the fleet API.
    pub id: String,
    /// Human-readable machine name.
    #[serde(default)]
    pub name: String,
    /// Region the machine was placed in.
    #[serde(default)]
    pub region: String,
    /// Current lifecycle state.
    pub state: MachineState,
    /// Private network address, absent until networking is provisioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip: Option<String>,
    /// Configuration the machine was launched with, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<MachineConfig>,
    /// Ordered lifecycle event history, most recent first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<MachineEvent>,
}

impl Machine {
    /// Returns `true` when the machine is an internally-reserved runner for
    /// platform release commands. Such machines must never be attached to.
    #[must_use]
    pub fn is_release_runner(&self) -> bool {
        self.config
            .as_ref()
            .and_then(|config| config.metadata.get(ROLE_METADATA_KEY))
            .is_some_and(|role| role == RELEASE_COMMAND_ROLE)
    }

    /// Returns the first `exit` event in the recorded history, if any.
    #[must_use]
    pub fn first_exit_event(&self) -> Option<&MachineEvent> {
        self.events.iter().find(|event| event.kind == "exit")
    }
}

/// Reference to an application's current deployable release.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Release {
    /// Image reference produced by the release.
    pub image_ref: String,
}

/// Application summary returned by the fleet API.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AppSummary {
    /// Opaque application identifier.
    pub id: String,
    /// Application name.
    pub name: String,
    /// Owning organisation identifier.
    pub organization_id: String,
    /// Most recent release, absent for never-deployed applications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_release: Option<Release>,
}

/// Request body submitted when launching a new machine.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LaunchRequest {
    /// Name for the new machine.
    pub name: String,
    /// Target region; the platform chooses when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Full machine configuration.
    pub config: MachineConfig,
}

/// Future returned by fleet operations.
pub type FleetFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, FleetError>> + Send + 'a>>;

/// Contract the lifecycle core requires from a fleet API client.
///
/// Implementations are scoped to a single application; the session never
/// touches machines belonging to other applications.
pub trait FleetApi {
    /// Fetches the application summary by name.
    fn get_app<'a>(&'a self, name: &'a str) -> FleetFuture<'a, AppSummary>;

    /// Creates and launches a new machine.
    fn create_machine<'a>(&'a self, launch: &'a LaunchRequest) -> FleetFuture<'a, Machine>;

    /// Fetches a machine by ID, including its event history.
    fn get_machine<'a>(&'a self, machine_id: &'a str) -> FleetFuture<'a, Machine>;

    /// Lists machines that have not been destroyed.
    fn list_active(&self) -> FleetFuture<'_, Vec<Machine>>;

    /// Requests a machine stop, acknowledged within `timeout`.
    fn stop_machine<'a>(&'a self, machine_id: &'a str, timeout: Duration) -> FleetFuture<'a, ()>;

    /// Blocks until the machine reaches `state` or `timeout` elapses.
    fn wait_for_state<'a>(
        &'a self,
        machine_id: &'a str,
        state: MachineState,
        timeout: Duration,
    ) -> FleetFuture<'a, ()>;
}
