use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalized power state of a node at the moment it was observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn as_str(self) -> &'static str {
        match self {
            PowerState::On => "on",
            PowerState::Off => "off",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw reading from one of the two signal sources.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum NodeObservation {
    /// Cluster-API reading. `fenced` is `None` when the node was not ready
    /// and the storage-node resource was never read.
    Api { ready: bool, fenced: Option<bool> },
    /// Token captured after the `[` on the firmware status line.
    Interactive { status_token: String },
}

impl NodeObservation {
    pub fn api_not_ready() -> Self {
        NodeObservation::Api {
            ready: false,
            fenced: None,
        }
    }

    pub fn api_ready(fenced: bool) -> Self {
        NodeObservation::Api {
            ready: true,
            fenced: Some(fenced),
        }
    }

    pub fn interactive(status_token: impl Into<String>) -> Self {
        NodeObservation::Interactive {
            status_token: status_token.into(),
        }
    }
}
