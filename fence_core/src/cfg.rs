use std::time::{Duration, Instant};

use crate::policy::DeviceClass;

/// Default prompt printed by the HSS firmware shell.
pub const DEFAULT_COMMAND_PROMPT: &str = "nC-RBTP:>";

/// Default API version of the `nnfnodes` custom resource.
pub const DEFAULT_API_VERSION: &str = "v1alpha1";

/// Upper bound for every configured timeout, wait and delay.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// `now + timeout` with the timeout clamped to `MAX_TIMEOUT`, so the
/// addition cannot overflow.
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout.min(MAX_TIMEOUT)).unwrap_or(now)
}

/// Per-invocation agent configuration.
///
/// Built once by the option layer and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct FenceCfg {
    pub device_class: DeviceClass,
    /// Refuse power-off and reboot on direct-hardware devices.
    pub withhold_power_off: bool,
    /// Firmware node index used in `redfish node <n> ...` commands.
    pub node_index: u32,
    pub command_prompt: String,
    pub api_version: String,
    pub shell_timeout: Duration,
    pub login_timeout: Duration,
    pub power_timeout: Duration,
    /// Pause between a mutation and its confirmation read.
    pub power_wait: Duration,
    /// Pause before the first backend contact.
    pub delay: Duration,
}

impl Default for FenceCfg {
    fn default() -> Self {
        Self {
            device_class: DeviceClass::ApiMarkerOnly,
            withhold_power_off: false,
            node_index: 0,
            command_prompt: DEFAULT_COMMAND_PROMPT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            shell_timeout: Duration::from_secs(3),
            login_timeout: Duration::from_secs(5),
            power_timeout: Duration::from_secs(20),
            power_wait: Duration::from_secs(5),
            delay: Duration::ZERO,
        }
    }
}
