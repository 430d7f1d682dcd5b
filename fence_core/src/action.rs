use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::state::PowerState;

/// The single action a cluster manager asks the agent to carry out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Status,
    Monitor,
    #[serde(rename = "on")]
    PowerOn,
    #[serde(rename = "off")]
    PowerOff,
    Reboot,
}

impl ActionKind {
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            ActionKind::PowerOn | ActionKind::PowerOff | ActionKind::Reboot
        )
    }

    /// State the node must end up in for a mutating action.
    pub fn target_state(self) -> Option<PowerState> {
        match self {
            ActionKind::PowerOn => Some(PowerState::On),
            // Reboot never re-powers the node.
            ActionKind::PowerOff | ActionKind::Reboot => Some(PowerState::Off),
            ActionKind::Status | ActionKind::Monitor => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Status => "status",
            ActionKind::Monitor => "monitor",
            ActionKind::PowerOn => "on",
            ActionKind::PowerOff => "off",
            ActionKind::Reboot => "reboot",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActionRequest {
    pub kind: ActionKind,
    /// Upper bound on the whole action, confirmation included.
    pub timeout: Duration,
}

impl ActionRequest {
    pub fn new(kind: ActionKind, timeout: Duration) -> Self {
        Self { kind, timeout }
    }
}

/// How an action finished successfully.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Read-only action; the state was observed.
    Observed,
    /// The backend was mutated and the new state confirmed.
    Applied,
    /// The node was already in the requested state.
    AlreadyInState,
    /// The policy deliberately withheld the action (soft refusal).
    Withheld,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub final_state: PowerState,
    pub mutation_performed: bool,
    pub disposition: Disposition,
}

impl ActionResult {
    pub fn observed(state: PowerState) -> Self {
        Self {
            final_state: state,
            mutation_performed: false,
            disposition: Disposition::Observed,
        }
    }

    pub fn applied(state: PowerState) -> Self {
        Self {
            final_state: state,
            mutation_performed: true,
            disposition: Disposition::Applied,
        }
    }

    pub fn already(state: PowerState) -> Self {
        Self {
            final_state: state,
            mutation_performed: false,
            disposition: Disposition::AlreadyInState,
        }
    }

    pub fn withheld(state: PowerState) -> Self {
        Self {
            final_state: state,
            mutation_performed: false,
            disposition: Disposition::Withheld,
        }
    }
}
