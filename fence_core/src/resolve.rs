use tracing::debug;

use crate::error::{FenceError, Result};
use crate::state::{NodeObservation, PowerState};
use crate::status_line::classify_token;

/// Turn one raw observation into `on` or `off`.
///
/// Readiness dominates the fenced marker: an unready node is `off` whatever
/// the marker says, and the marker only matters while the node is healthy.
pub fn resolve(observation: &NodeObservation) -> Result<PowerState> {
    let state = match observation {
        NodeObservation::Api { ready: false, .. } => PowerState::Off,
        NodeObservation::Api {
            ready: true,
            fenced: Some(true),
        } => PowerState::Off,
        NodeObservation::Api {
            ready: true,
            fenced: Some(false),
        } => PowerState::On,
        NodeObservation::Api {
            ready: true,
            fenced: None,
        } => {
            return Err(FenceError::Ambiguous(
                "ready node observed without a fenced reading".to_string(),
            ))
        }
        NodeObservation::Interactive { status_token } => classify_token(status_token),
    };

    debug!(?observation, %state, "resolved power state");
    Ok(state)
}
