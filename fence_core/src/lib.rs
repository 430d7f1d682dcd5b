//! fence_core
//!
//! Decision core of the node fencing agent: the data model, the power-state
//! resolver, the per device-class policy table and the failure taxonomy.
//! No I/O lives here.

pub mod action;
pub mod cfg;
pub mod error;
pub mod policy;
pub mod resolve;
pub mod state;
pub mod status_line;

pub use action::{ActionKind, ActionRequest, ActionResult, Disposition};
pub use cfg::{deadline_after, FenceCfg, DEFAULT_API_VERSION, DEFAULT_COMMAND_PROMPT, MAX_TIMEOUT};
pub use error::{FenceError, Result};
pub use policy::{Authorization, DeviceClass, FencingPolicy, MutationTarget, PowerCommand};
pub use resolve::resolve;
pub use state::{NodeObservation, PowerState};
pub use status_line::{classify_token, extract_token, STATUS_PATTERN, STATUS_RE};
