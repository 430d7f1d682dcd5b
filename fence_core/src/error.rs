//! Failure taxonomy shared by every layer.
//!
//! Errors are classified where they happen and travel up unchanged; the
//! binary maps each variant to one exit code. A soft policy refusal is not in
//! here: it is a successful `Disposition::Withheld`.

use std::time::Duration;

use crate::action::ActionKind;
use crate::policy::DeviceClass;
use crate::state::PowerState;

pub type Result<T> = std::result::Result<T, FenceError>;

#[derive(Debug, thiserror::Error)]
pub enum FenceError {
    /// Credentials rejected by the backend. Never retried.
    #[error("login denied: {0}")]
    LoginDenied(String),

    /// Credentials accepted but not allowed to perform the call.
    #[error("insufficient privileges: {0}")]
    Forbidden(String),

    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("timed out after {}s waiting for {what}", .after.as_secs())]
    Timeout { what: String, after: Duration },

    /// The node did not reach the requested state after the mutation.
    #[error("node did not power on")]
    WaitingOn,

    #[error("node did not power off")]
    WaitingOff,

    /// Hard refusal: the device class can never perform this action.
    #[error("{action} refused by {class} policy")]
    PolicyRefused {
        action: ActionKind,
        class: DeviceClass,
    },

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Optimistic-concurrency write rejected; another agent changed the resource.
    #[error("conflicting update on {0}")]
    Conflict(String),

    #[error("ambiguous observation: {0}")]
    Ambiguous(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("backend does not support {0}")]
    Unsupported(&'static str),

    #[error("backend error: {0}")]
    Backend(String),
}

impl FenceError {
    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        FenceError::Timeout {
            what: what.into(),
            after,
        }
    }

    /// Confirmation failure for the given target state.
    pub fn waiting_for(target: PowerState) -> Self {
        match target {
            PowerState::On => FenceError::WaitingOn,
            PowerState::Off => FenceError::WaitingOff,
        }
    }

    /// True for failures the cluster manager must not retry blindly.
    pub fn is_policy(&self) -> bool {
        matches!(self, FenceError::PolicyRefused { .. })
    }
}
