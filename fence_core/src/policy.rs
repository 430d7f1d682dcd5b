//! Per device-class fencing rules.
//!
//! | class              | on       | off                        | reboot      |
//! |--------------------|----------|----------------------------|-------------|
//! | direct-hardware    | command  | command (unless withheld)  | as off      |
//! | api-marker-only    | withheld | fenced flag                | as off      |
//! | hardware-readonly  | withheld | refused                    | refused     |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::ActionKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceClass {
    /// Redfish power control over the HSS firmware shell.
    DirectHardware,
    /// Software `fenced` marker on the storage-node resource.
    ApiMarkerOnly,
    /// Firmware status only; the agent may not change power at all.
    HardwareReadonly,
}

impl DeviceClass {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceClass::DirectHardware => "direct-hardware",
            DeviceClass::ApiMarkerOnly => "api-marker-only",
            DeviceClass::HardwareReadonly => "hardware-readonly",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Firmware power commands understood by the HSS `redfish` utility.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerCommand {
    On,
    ForceOff,
}

impl PowerCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            PowerCommand::On => "on",
            PowerCommand::ForceOff => "forceoff",
        }
    }
}

/// What a permitted mutation does to the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationTarget {
    Hardware(PowerCommand),
    FencedFlag(bool),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Authorization {
    /// Read-only action; nothing to mutate.
    ReadOnly,
    Permitted(MutationTarget),
    /// Soft refusal, reported as success without mutation.
    Withheld,
    /// Hard refusal, fatal and raised before any backend I/O.
    Refused,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FencingPolicy {
    pub class: DeviceClass,
    /// Only meaningful for `DirectHardware`.
    pub withhold_power_off: bool,
}

impl FencingPolicy {
    pub fn new(class: DeviceClass) -> Self {
        Self {
            class,
            withhold_power_off: false,
        }
    }

    pub fn with_power_off_withheld(mut self, withhold: bool) -> Self {
        self.withhold_power_off = withhold;
        self
    }

    pub fn authorize(&self, action: ActionKind) -> Authorization {
        use Authorization::*;

        match (self.class, action) {
            (_, ActionKind::Status | ActionKind::Monitor) => ReadOnly,

            (DeviceClass::DirectHardware, ActionKind::PowerOn) => {
                Permitted(MutationTarget::Hardware(PowerCommand::On))
            }
            (DeviceClass::DirectHardware, ActionKind::PowerOff | ActionKind::Reboot) => {
                if self.withhold_power_off {
                    Refused
                } else {
                    Permitted(MutationTarget::Hardware(PowerCommand::ForceOff))
                }
            }

            // Clearing the fenced marker is an administrator decision.
            (DeviceClass::ApiMarkerOnly, ActionKind::PowerOn) => Withheld,
            (DeviceClass::ApiMarkerOnly, ActionKind::PowerOff | ActionKind::Reboot) => {
                Permitted(MutationTarget::FencedFlag(true))
            }

            (DeviceClass::HardwareReadonly, ActionKind::PowerOn) => Withheld,
            (DeviceClass::HardwareReadonly, ActionKind::PowerOff | ActionKind::Reboot) => Refused,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_are_never_gated() {
        for class in [
            DeviceClass::DirectHardware,
            DeviceClass::ApiMarkerOnly,
            DeviceClass::HardwareReadonly,
        ] {
            let p = FencingPolicy::new(class).with_power_off_withheld(true);
            assert_eq!(p.authorize(ActionKind::Status), Authorization::ReadOnly);
            assert_eq!(p.authorize(ActionKind::Monitor), Authorization::ReadOnly);
        }
    }

    #[test]
    fn withhold_flag_only_touches_destructive_actions() {
        let p = FencingPolicy::new(DeviceClass::DirectHardware).with_power_off_withheld(true);
        assert_eq!(
            p.authorize(ActionKind::PowerOn),
            Authorization::Permitted(MutationTarget::Hardware(PowerCommand::On))
        );
        assert_eq!(p.authorize(ActionKind::PowerOff), Authorization::Refused);
        assert_eq!(p.authorize(ActionKind::Reboot), Authorization::Refused);
    }

    #[test]
    fn withhold_flag_ignored_for_marker_devices() {
        let p = FencingPolicy::new(DeviceClass::ApiMarkerOnly).with_power_off_withheld(true);
        assert_eq!(
            p.authorize(ActionKind::PowerOff),
            Authorization::Permitted(MutationTarget::FencedFlag(true))
        );
    }
}
