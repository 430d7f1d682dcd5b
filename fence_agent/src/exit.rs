//! Exit codes and the single result line fence daemons read from stdout.

use std::io::Write;

use tracing::error;

use fence_core::{ActionKind, ActionResult, Disposition, FenceError, PowerState};

pub const EC_OK: u8 = 0;
pub const EC_GENERIC_ERROR: u8 = 1;
/// Also used by `status` for a node that is off.
pub const EC_STATUS_OFF: u8 = 2;
pub const EC_LOGIN_DENIED: u8 = 3;
pub const EC_CONNECTION_LOST: u8 = 4;
pub const EC_TIMED_OUT: u8 = 5;
pub const EC_WAITING_ON: u8 = 6;
pub const EC_WAITING_OFF: u8 = 7;
pub const EC_STATUS: u8 = 8;
pub const EC_INVALID_PRIVILEGES: u8 = 11;

pub fn success_code(kind: ActionKind, result: &ActionResult) -> u8 {
    match (kind, result.final_state) {
        (ActionKind::Status, PowerState::Off) => EC_STATUS_OFF,
        _ => EC_OK,
    }
}

pub fn failure_code(err: &anyhow::Error) -> u8 {
    let Some(fence) = err.downcast_ref::<FenceError>() else {
        return EC_GENERIC_ERROR;
    };
    match fence {
        FenceError::LoginDenied(_) => EC_LOGIN_DENIED,
        FenceError::ConnectionLost(_) => EC_CONNECTION_LOST,
        FenceError::Timeout { .. } => EC_TIMED_OUT,
        FenceError::WaitingOn => EC_WAITING_ON,
        FenceError::WaitingOff => EC_WAITING_OFF,
        FenceError::NotFound { .. } | FenceError::Ambiguous(_) | FenceError::PolicyRefused { .. } => {
            EC_STATUS
        }
        FenceError::Forbidden(_) => EC_INVALID_PRIVILEGES,
        _ => EC_GENERIC_ERROR,
    }
}

pub fn success_line(kind: ActionKind, result: &ActionResult) -> String {
    let state = result.final_state.as_str().to_uppercase();
    match (kind, result.disposition) {
        (ActionKind::Status | ActionKind::Monitor, _) | (_, Disposition::Observed) => {
            format!("Status: {state}")
        }
        (_, Disposition::Applied) => format!("Success: Powered {state}"),
        (_, Disposition::AlreadyInState) => format!("Success: Already {state}"),
        (_, Disposition::Withheld) => {
            format!("Success: Withheld ({kind} not permitted, node is {state})")
        }
    }
}

pub fn failure_line(err: &anyhow::Error) -> String {
    format!("Failed: {err:#}")
}

/// Write the result line. The daemon reads nothing else, so a lost line
/// turns any outcome into a generic failure.
pub fn emit<W: Write>(out: &mut W, line: &str, code: u8) -> u8 {
    match writeln!(out, "{line}").and_then(|_| out.flush()) {
        Ok(()) => code,
        Err(e) => {
            error!(error = %e, %line, "result line not written");
            EC_GENERIC_ERROR
        }
    }
}
