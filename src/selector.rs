//! Machine acquisition: explicit ID, interactive pick, or ephemeral create.
//!
//! The three modes are mutually exclusive. An explicit machine ID wins over
//! `--select`; supplying both is an error rather than a silent preference.
//! When neither is given the selector provisions an ephemeral machine.
//!
//! Interactive pick presents only the filtered machine list; it never offers
//! an inline "create an ephemeral machine" entry, so the chosen index maps
//! 1:1 onto the listed machines.

use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::fleet::{FleetApi, FleetError, Machine, MachineState};
use crate::provision::{ProvisionError, Provisioner};
use crate::report::SessionReporter;

/// How the session acquires its machine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SelectionMode {
    /// Attach to this machine.
    Explicit(String),
    /// Choose from a list of started machines.
    Interactive,
    /// Provision a single-use machine.
    CreateEphemeral,
}

impl SelectionMode {
    /// Resolves CLI flags into a selection mode.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::ConflictingSelectors`] when a machine ID is
    /// combined with interactive selection.
    pub fn from_flags(machine_id: Option<String>, select: bool) -> Result<Self, SelectionError> {
        match (machine_id, select) {
            (Some(_), true) => Err(SelectionError::ConflictingSelectors),
            (Some(id), false) => Ok(Self::Explicit(id)),
            (None, true) => Ok(Self::Interactive),
            (None, false) => Ok(Self::CreateEphemeral),
        }
    }
}

/// Outcome of machine acquisition: the machine plus session ownership.
///
/// Ephemeral machines were created by this session and must be torn down by
/// it; pre-existing machines are never mutated.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Selection {
    /// Machine the session will attach to.
    pub machine: Machine,
    /// `true` when the machine is owned by this session.
    pub ephemeral: bool,
}

/// Raised when an interactive prompt fails.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("failed to prompt for a machine: {message}")]
pub struct PickError {
    /// Prompt failure description.
    pub message: String,
}

/// Abstraction over the interactive machine prompt.
pub trait MachinePicker {
    /// Presents `options` and returns the zero-based index of the choice.
    ///
    /// # Errors
    ///
    /// Returns [`PickError`] when the prompt cannot be completed.
    fn pick(&self, prompt: &str, options: &[String]) -> Result<usize, PickError>;
}

/// Picker that prompts on stdout and reads the choice from stdin.
#[derive(Clone, Copy, Debug, Default)]
pub struct TtyPicker;

impl MachinePicker for TtyPicker {
    fn pick(&self, prompt: &str, options: &[String]) -> Result<usize, PickError> {
        let io_error = |err: io::Error| PickError {
            message: err.to_string(),
        };

        let mut stdout = io::stdout();
        writeln!(stdout, "{prompt}").map_err(io_error)?;
        for (position, option) in options.iter().enumerate() {
            writeln!(stdout, "{:>3}. {option}", position + 1).map_err(io_error)?;
        }
        write!(stdout, "> ").map_err(io_error)?;
        stdout.flush().map_err(io_error)?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).map_err(io_error)?;
        let choice: usize = line.trim().parse().map_err(|_| PickError {
            message: format!("expected a number between 1 and {}", options.len()),
        })?;
        if choice == 0 || choice > options.len() {
            return Err(PickError {
                message: format!("expected a number between 1 and {}", options.len()),
            });
        }
        Ok(choice - 1)
    }
}

/// Errors surfaced while acquiring a machine.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SelectionError {
    /// Raised when a machine ID is combined with `--select`.
    #[error("machine IDs can't be used with -s/--select")]
    ConflictingSelectors,
    /// Raised when no started, attachable machines exist.
    #[error("no machines are available")]
    NoMachinesAvailable,
    /// Raised when the explicitly selected machine is not started.
    #[error("machine {machine_id} is not started (state: {state})")]
    NotStarted {
        /// Machine that was requested.
        machine_id: String,
        /// State the machine was actually in.
        state: MachineState,
    },
    /// Raised when the explicitly selected machine is reserved for platform
    /// tasks and must never be attached to.
    #[error("machine {machine_id} is a release command machine")]
    ReservedMachine {
        /// Machine that was requested.
        machine_id: String,
    },
    /// Raised when the interactive prompt fails.
    #[error(transparent)]
    Prompt(#[from] PickError),
    /// Raised when the fleet API fails during selection.
    #[error(transparent)]
    Fleet(#[from] FleetError),
    /// Raised when ephemeral provisioning fails.
    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

/// Filters a machine list down to started, non-reserved machines.
#[must_use]
pub fn attachable_machines(machines: Vec<Machine>) -> Vec<Machine> {
    machines
        .into_iter()
        .filter(|machine| machine.state == MachineState::Started && !machine.is_release_runner())
        .collect()
}

/// Acquires the machine a session will attach to.
#[derive(Debug)]
pub struct MachineSelector<'a, F: FleetApi, P: MachinePicker> {
    fleet: &'a F,
    picker: &'a P,
    provisioner: Provisioner<'a, F>,
}

impl<'a, F: FleetApi, P: MachinePicker> MachineSelector<'a, F, P> {
    /// Creates a selector; the provisioner handles the create-ephemeral mode.
    #[must_use]
    pub const fn new(fleet: &'a F, picker: &'a P, provisioner: Provisioner<'a, F>) -> Self {
        Self {
            fleet,
            picker,
            provisioner,
        }
    }

    /// Resolves `mode` into a machine and its ownership flag.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError`] when the requested machine is unusable, no
    /// machines are available, the prompt fails, or provisioning fails.
    pub async fn select(
        &self,
        mode: SelectionMode,
        reporter: &impl SessionReporter,
    ) -> Result<Selection, SelectionError> {
        match mode {
            SelectionMode::Explicit(machine_id) => self.select_by_id(&machine_id).await,
            SelectionMode::Interactive => self.select_interactively().await,
            SelectionMode::CreateEphemeral => {
                let machine = self.provisioner.provision(reporter).await?;
                Ok(Selection {
                    machine,
                    ephemeral: true,
                })
            }
        }
    }

    async fn select_by_id(&self, machine_id: &str) -> Result<Selection, SelectionError> {
        let machine = self.fleet.get_machine(machine_id).await?;
        if machine.state != MachineState::Started {
            return Err(SelectionError::NotStarted {
                machine_id: machine_id.to_owned(),
                state: machine.state,
            });
        }
        if machine.is_release_runner() {
            return Err(SelectionError::ReservedMachine {
                machine_id: machine_id.to_owned(),
            });
        }
        Ok(Selection {
            machine,
            ephemeral: false,
        })
    }

    async fn select_interactively(&self) -> Result<Selection, SelectionError> {
        let machines = attachable_machines(self.fleet.list_active().await?);
        if machines.is_empty() {
            return Err(SelectionError::NoMachinesAvailable);
        }

        let options: Vec<String> = machines
            .iter()
            .map(|machine| {
                format!(
                    "{}: {} {} {}",
                    machine.region,
                    machine.id,
                    machine.private_ip.as_deref().unwrap_or("-"),
                    machine.name
                )
            })
            .collect();
        let index = self.picker.pick("Select a machine:", &options)?;
        let machine = machines.get(index).cloned().ok_or_else(|| PickError {
            message: format!("choice {index} out of range"),
        })?;

        Ok(Selection {
            machine,
            ephemeral: false,
        })
    }
}
