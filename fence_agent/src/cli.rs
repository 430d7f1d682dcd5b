use std::path::PathBuf;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, ValueEnum};

use fence_core::{
    ActionKind, DeviceClass, FenceCfg, DEFAULT_API_VERSION, DEFAULT_COMMAND_PROMPT, MAX_TIMEOUT,
};

#[derive(Parser, Debug)]
#[command(
    name = "fence_nnf",
    version,
    about = "Fence agent for Near Node Flash storage nodes and their HSS controllers"
)]
pub struct Cli {
    #[arg(short = 'o', long, value_enum, default_value_t = ActionArg::Reboot, visible_alias = "option")]
    pub action: ActionArg,

    #[arg(long, value_enum, default_value_t = DeviceClassArg::ApiMarkerOnly)]
    pub device_class: DeviceClassArg,

    #[arg(long, help = "Refuse power-off and reboot on direct-hardware devices")]
    pub withhold_power_off: bool,

    #[arg(short, long, help = "Log at debug level")]
    pub verbose: bool,

    #[arg(long, default_value_t = 0.0, help = "Seconds to wait before contacting the device")]
    pub delay: f64,

    #[arg(long, default_value_t = 20.0)]
    pub power_timeout: f64,

    #[arg(long, default_value_t = 5.0, help = "Seconds between a power change and its check")]
    pub power_wait: f64,

    // ----- firmware shell -----
    #[arg(short = 'a', long, visible_alias = "ipaddr", help = "HSS controller address")]
    pub ip: Option<String>,

    #[arg(short = 'l', long, visible_alias = "login")]
    pub username: Option<String>,

    #[arg(long, default_value = "ssh")]
    pub ssh_path: String,

    #[arg(long, default_value = "-tt -o BatchMode=yes")]
    pub ssh_options: String,

    #[arg(long, help = "Run this program as the firmware session instead of ssh")]
    pub session_command: Option<String>,

    #[arg(long, allow_hyphen_values = true)]
    pub session_arg: Vec<String>,

    #[arg(short = 'c', long, default_value = DEFAULT_COMMAND_PROMPT)]
    pub command_prompt: String,

    #[arg(short = 'n', long, visible_alias = "port", default_value_t = 0)]
    pub plug: u32,

    #[arg(long, default_value_t = 3.0)]
    pub shell_timeout: f64,

    #[arg(long, default_value_t = 5.0)]
    pub login_timeout: f64,

    // ----- cluster API -----
    #[arg(long, env = "KUBERNETES_SERVICE_HOST")]
    pub kubernetes_service_host: Option<String>,

    #[arg(long, env = "KUBERNETES_SERVICE_PORT", default_value_t = 443)]
    pub kubernetes_service_port: u16,

    #[arg(long)]
    pub service_token_file: Option<PathBuf>,

    #[arg(long)]
    pub service_cert_file: Option<PathBuf>,

    #[arg(long)]
    pub nnf_node_name: Option<String>,

    #[arg(long, default_value = DEFAULT_API_VERSION)]
    pub api_version: String,

    #[arg(long, help = "Use the local kubeconfig")]
    pub localconfig: bool,

    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ActionArg {
    Status,
    Monitor,
    On,
    Off,
    Reboot,
}

impl From<ActionArg> for ActionKind {
    fn from(a: ActionArg) -> Self {
        match a {
            ActionArg::Status => ActionKind::Status,
            ActionArg::Monitor => ActionKind::Monitor,
            ActionArg::On => ActionKind::PowerOn,
            ActionArg::Off => ActionKind::PowerOff,
            ActionArg::Reboot => ActionKind::Reboot,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DeviceClassArg {
    DirectHardware,
    ApiMarkerOnly,
    HardwareReadonly,
}

impl From<DeviceClassArg> for DeviceClass {
    fn from(d: DeviceClassArg) -> Self {
        match d {
            DeviceClassArg::DirectHardware => DeviceClass::DirectHardware,
            DeviceClassArg::ApiMarkerOnly => DeviceClass::ApiMarkerOnly,
            DeviceClassArg::HardwareReadonly => DeviceClass::HardwareReadonly,
        }
    }
}

/// Values are range-checked by `Cli::validate`; out-of-range input clamps.
fn secs(v: f64) -> Duration {
    if v.is_nan() || v <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(v).unwrap_or(MAX_TIMEOUT).min(MAX_TIMEOUT)
}

impl Cli {
    /// Cross-option checks clap cannot express declaratively.
    pub fn validate(&self) -> Result<(), clap::Error> {
        let missing = |msg: &str| Cli::command().error(ErrorKind::MissingRequiredArgument, msg);

        match DeviceClass::from(self.device_class) {
            DeviceClass::ApiMarkerOnly => {
                if self.nnf_node_name.is_none() {
                    return Err(missing("--nnf-node-name is required for api-marker-only"));
                }
                if !self.localconfig {
                    if self.kubernetes_service_host.is_none() {
                        return Err(missing(
                            "--kubernetes-service-host is required without --localconfig",
                        ));
                    }
                    if self.service_token_file.is_none() || self.service_cert_file.is_none() {
                        return Err(missing(
                            "--service-token-file and --service-cert-file are required without --localconfig",
                        ));
                    }
                }
            }
            DeviceClass::DirectHardware | DeviceClass::HardwareReadonly => {
                if self.session_command.is_none() && self.ip.is_none() {
                    return Err(missing("--ip is required for firmware devices"));
                }
            }
        }

        for (name, v) in [
            ("--delay", self.delay),
            ("--power-timeout", self.power_timeout),
            ("--power-wait", self.power_wait),
            ("--shell-timeout", self.shell_timeout),
            ("--login-timeout", self.login_timeout),
        ] {
            if !v.is_finite() || v < 0.0 || v > MAX_TIMEOUT.as_secs_f64() {
                return Err(Cli::command().error(
                    ErrorKind::ValueValidation,
                    format!(
                        "{name} must be between 0 and {} seconds",
                        MAX_TIMEOUT.as_secs()
                    ),
                ));
            }
        }
        Ok(())
    }

    pub fn fence_cfg(&self) -> FenceCfg {
        FenceCfg {
            device_class: self.device_class.into(),
            withhold_power_off: self.withhold_power_off,
            node_index: self.plug,
            command_prompt: self.command_prompt.clone(),
            api_version: self.api_version.clone(),
            shell_timeout: secs(self.shell_timeout),
            login_timeout: secs(self.login_timeout),
            power_timeout: secs(self.power_timeout),
            power_wait: secs(self.power_wait),
            delay: secs(self.delay),
        }
    }

    /// Program and arguments that open the firmware session.
    pub fn session_invocation(&self) -> (String, Vec<String>) {
        if let Some(cmd) = &self.session_command {
            return (cmd.clone(), self.session_arg.clone());
        }
        let mut args: Vec<String> = self.ssh_options.split_whitespace().map(String::from).collect();
        if let Some(user) = &self.username {
            args.push("-l".to_string());
            args.push(user.clone());
        }
        if let Some(ip) = &self.ip {
            args.push(ip.clone());
        }
        (self.ssh_path.clone(), args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("fence_nnf").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let cli = parse(&["--nnf-node-name", "rabbit-0", "--localconfig"]);
        assert_eq!(cli.action, ActionArg::Reboot);
        assert!(cli.validate().is_ok());
        let cfg = cli.fence_cfg();
        assert_eq!(cfg.device_class, DeviceClass::ApiMarkerOnly);
        assert_eq!(cfg.power_wait, Duration::from_secs(5));
        assert_eq!(cfg.api_version, "v1alpha1");
    }

    #[test]
    fn marker_device_needs_a_node_name() {
        let cli = parse(&["--localconfig", "-o", "status"]);
        let err = cli.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn ssh_invocation() {
        let cli = parse(&[
            "--device-class",
            "direct-hardware",
            "--ipaddr",
            "10.0.0.9",
            "--login",
            "root",
        ]);
        assert!(cli.validate().is_ok());
        let (program, args) = cli.session_invocation();
        assert_eq!(program, "ssh");
        assert_eq!(args, ["-tt", "-o", "BatchMode=yes", "-l", "root", "10.0.0.9"]);
    }

    #[test]
    fn negative_timeouts_are_rejected() {
        let cli = parse(&[
            "--device-class",
            "direct-hardware",
            "--ip",
            "h",
            "--power-wait=-1",
        ]);
        assert_eq!(cli.validate().unwrap_err().kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn oversized_timeouts_are_rejected() {
        let cli = parse(&[
            "--device-class",
            "direct-hardware",
            "--ip",
            "h",
            "--login-timeout",
            "1e19",
        ]);
        assert_eq!(cli.validate().unwrap_err().kind(), ErrorKind::ValueValidation);

        let cli = parse(&["--localconfig", "--nnf-node-name", "n", "--power-wait", "86400"]);
        assert!(cli.validate().is_ok());
        assert_eq!(secs(1e19), MAX_TIMEOUT);
    }

    #[test]
    fn action_names() {
        assert_eq!(ActionKind::from(parse(&["-o", "off"]).action), ActionKind::PowerOff);
        assert_eq!(ActionKind::from(parse(&["--option", "on"]).action), ActionKind::PowerOn);
    }
}
