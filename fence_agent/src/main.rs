//! `fence_nnf`: fence agent entry point.
//!
//! Options come from the command line or, when started without arguments,
//! as `key=value` lines on stdin. One action runs per process; the outcome
//! is a single line on stdout plus the exit code.

mod cli;
mod exit;
mod stdin_opts;

use std::io;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use fence_core::{ActionKind, ActionRequest, ActionResult, DeviceClass, FenceCfg, FencingPolicy};
use fence_supervisor::{
    prompt_regex, ApiBackend, FenceBackend, FenceSupervisor, InteractiveBackend, InteractiveCfg,
    KubeClient, KubeEndpoint, ProcessSession,
};

use crate::cli::Cli;

fn main() -> ExitCode {
    let (cli, unknown) = match parse_options() {
        Ok(parsed) => parsed,
        Err(e) => e.exit(),
    };
    if let Err(e) = cli.validate() {
        e.exit();
    }

    init_tracing(cli.verbose);
    for key in &unknown {
        warn!(%key, "ignoring unknown option");
    }

    let kind = ActionKind::from(cli.action);
    let outcome = run(&cli, kind);

    let (line, code) = match &outcome {
        Ok(result) => (exit::success_line(kind, result), exit::success_code(kind, result)),
        Err(e) => (exit::failure_line(e), exit::failure_code(e)),
    };
    ExitCode::from(exit::emit(&mut io::stdout().lock(), &line, code))
}

fn parse_options() -> Result<(Cli, Vec<String>), clap::Error> {
    if std::env::args_os().len() > 1 {
        return Cli::try_parse().map(|cli| (cli, Vec::new()));
    }
    let opts = stdin_opts::parse(io::stdin().lock())
        .map_err(|e| clap::Error::raw(clap::error::ErrorKind::Io, e))?;
    let cli = Cli::try_parse_from(&opts.argv)?;
    Ok((cli, opts.unknown))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(cli: &Cli, kind: ActionKind) -> anyhow::Result<ActionResult> {
    let cfg = cli.fence_cfg();
    let supervisor = FenceSupervisor::new(
        FencingPolicy::new(cfg.device_class).with_power_off_withheld(cfg.withhold_power_off),
    )
    .with_power_wait(cfg.power_wait);

    // Refused actions never reach the device.
    supervisor.preflight(kind)?;

    if !cfg.delay.is_zero() {
        info!(delay_secs = cfg.delay.as_secs_f64(), "delaying before fencing");
        std::thread::sleep(cfg.delay);
    }

    let timeout = if kind.is_mutating() {
        cfg.power_timeout.saturating_add(cfg.power_wait)
    } else {
        cfg.shell_timeout
    };

    let mut backend = connect(cli, &cfg)?;
    info!(action = %kind, class = %cfg.device_class, "running fence action");
    let result = supervisor
        .execute(backend.as_mut(), ActionRequest::new(kind, timeout))
        .with_context(|| format!("{kind}"))?;
    debug!(?result, "action finished");
    Ok(result)
}

fn connect(cli: &Cli, cfg: &FenceCfg) -> anyhow::Result<Box<dyn FenceBackend>> {
    match cfg.device_class {
        DeviceClass::ApiMarkerOnly => {
            let endpoint = if cli.localconfig {
                KubeEndpoint::from_kubeconfig(cli.kubeconfig.as_deref())?
            } else {
                let (Some(host), Some(token), Some(cert)) = (
                    cli.kubernetes_service_host.as_deref(),
                    cli.service_token_file.as_deref(),
                    cli.service_cert_file.as_deref(),
                ) else {
                    anyhow::bail!("cluster API endpoint is not configured");
                };
                KubeEndpoint::from_service_account(host, cli.kubernetes_service_port, token, cert)?
            };
            let node_name = cli
                .nnf_node_name
                .clone()
                .context("--nnf-node-name is required")?;
            debug!(server = %endpoint.server, %node_name, "using cluster API");
            let client = KubeClient::new(endpoint, cfg.shell_timeout.max(cfg.power_timeout))?;
            Ok(Box::new(ApiBackend::new(client, node_name, cfg.api_version.clone())))
        }
        DeviceClass::DirectHardware | DeviceClass::HardwareReadonly => {
            let (program, args) = cli.session_invocation();
            let prompt = prompt_regex(&cfg.command_prompt)?;
            let session =
                ProcessSession::spawn(&program, &args)?.login(&prompt, cfg.login_timeout)?;
            let shell_cfg = InteractiveCfg {
                node_index: cfg.node_index,
                command_prompt: cfg.command_prompt.clone(),
                shell_timeout: cfg.shell_timeout,
                power_timeout: cfg.power_timeout,
            };
            Ok(Box::new(InteractiveBackend::new(session, &shell_cfg)?))
        }
    }
}
