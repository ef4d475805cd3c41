//! Shared machine and application fixtures for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file
//! in `tests/`). Placing shared fixtures under `tests/common/` avoids
//! creating an additional integration test binary while still allowing reuse
//! via:
//!
//! ```rust
//! #[path = "common/machines.rs"]
//! mod machines;
//! ```

use std::collections::BTreeMap;

use perch::fleet::{
    AppSummary, ExitRequest, GuestPreset, Machine, MachineConfig, MachineEvent, MachineState,
    RELEASE_COMMAND_ROLE, ROLE_METADATA_KEY, Release,
};

/// Image reference used by fixture releases.
pub const RELEASE_IMAGE: &str = "registry.example/app:v42";

/// Builds a machine in the given state with a private address.
pub fn machine_in(id: &str, state: MachineState) -> Machine {
    Machine {
        id: id.to_owned(),
        name: format!("{id}-name"),
        region: String::from("lhr"),
        state,
        private_ip: Some(String::from("fdaa::1")),
        config: None,
        events: Vec::new(),
    }
}

/// Builds a started machine with a private address.
pub fn started_machine(id: &str) -> Machine {
    machine_in(id, MachineState::Started)
}

/// Builds a started machine reserved for platform release commands.
pub fn reserved_machine(id: &str) -> Machine {
    let mut metadata = BTreeMap::new();
    metadata.insert(
        ROLE_METADATA_KEY.to_owned(),
        RELEASE_COMMAND_ROLE.to_owned(),
    );
    let mut machine = started_machine(id);
    machine.config = Some(MachineConfig {
        image: RELEASE_IMAGE.to_owned(),
        guest: GuestPreset::shared_cpu_1x(),
        env: BTreeMap::new(),
        metadata,
        init: None,
        auto_destroy: false,
    });
    machine
}

/// Builds a destroyed machine whose history records the given exit code.
pub fn destroyed_machine_with_exit(id: &str, exit_code: i32) -> Machine {
    let mut machine = machine_in(id, MachineState::Destroyed);
    machine.events = vec![MachineEvent {
        kind: String::from("exit"),
        request: Some(ExitRequest {
            exit_code: Some(serde_json::json!(exit_code)),
        }),
    }];
    machine
}

/// Builds an application summary carrying a current release.
pub fn app_with_release(name: &str) -> AppSummary {
    AppSummary {
        id: format!("{name}-id"),
        name: name.to_owned(),
        organization_id: String::from("org-1"),
        current_release: Some(Release {
            image_ref: RELEASE_IMAGE.to_owned(),
        }),
    }
}

/// Builds an application summary that has never been released.
pub fn app_without_release(name: &str) -> AppSummary {
    AppSummary {
        id: format!("{name}-id"),
        name: name.to_owned(),
        organization_id: String::from("org-1"),
        current_release: None,
    }
}
