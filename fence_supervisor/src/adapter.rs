//! Backend adapter layer: turn the outside world into `NodeObservation`s and
//! carry out the mutations the policy selects.
//!
//! Two variants implement `FenceBackend`:
//! - `ApiBackend` reads node readiness and the `fenced` marker from the
//!   cluster API and writes the marker.
//! - `InteractiveBackend` drives the HSS firmware shell.
//!
//! Capabilities a variant lacks fall through to the trait defaults, which
//! fail with `FenceError::Unsupported`.

use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};

use fence_core::{
    FenceError, NodeObservation, PowerCommand, Result, STATUS_RE,
};

use crate::kube::{fenced_flag, set_fenced_flag, ClusterApi};
use crate::session::Session;

/// Capability interface the executor depends on.
pub trait FenceBackend {
    /// One raw observation, no retries.
    fn observe(&mut self) -> Result<NodeObservation>;

    /// Set the software `fenced` marker. Returns whether a write happened.
    fn apply_fenced(&mut self, _fenced: bool) -> Result<bool> {
        Err(FenceError::Unsupported("fenced marker writes"))
    }

    fn power_command(&mut self, _command: PowerCommand) -> Result<()> {
        Err(FenceError::Unsupported("hardware power commands"))
    }
}

impl<B: FenceBackend + ?Sized> FenceBackend for Box<B> {
    fn observe(&mut self) -> Result<NodeObservation> {
        (**self).observe()
    }

    fn apply_fenced(&mut self, fenced: bool) -> Result<bool> {
        (**self).apply_fenced(fenced)
    }

    fn power_command(&mut self, command: PowerCommand) -> Result<()> {
        (**self).power_command(command)
    }
}

// ---------------------------------------------------------------------
// Cluster-API variant
// ---------------------------------------------------------------------

pub struct ApiBackend<C> {
    client: C,
    node_name: String,
    api_version: String,
}

impl<C: ClusterApi> ApiBackend<C> {
    /// `node_name` names both the `Node` and the namespace of its `NnfNode`.
    pub fn new(client: C, node_name: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            client,
            node_name: node_name.into(),
            api_version: api_version.into(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C: ClusterApi> FenceBackend for ApiBackend<C> {
    fn observe(&mut self) -> Result<NodeObservation> {
        let node = self.client.read_node(&self.node_name)?;
        if !node.is_ready() {
            // An unready node cannot be meaningfully fenced in software.
            info!(node = %self.node_name, "node is not ready");
            return Ok(NodeObservation::api_not_ready());
        }

        let nnf_node = self
            .client
            .get_nnf_node(&self.node_name, &self.api_version)?;
        let fenced = fenced_flag(&nnf_node)?;
        info!(node = %self.node_name, fenced, "NNF node fenced status");
        Ok(NodeObservation::api_ready(fenced))
    }

    fn apply_fenced(&mut self, fenced: bool) -> Result<bool> {
        let mut nnf_node = self
            .client
            .get_nnf_node(&self.node_name, &self.api_version)?;
        if fenced_flag(&nnf_node)? == fenced {
            debug!(node = %self.node_name, fenced, "fenced marker already set");
            return Ok(false);
        }

        set_fenced_flag(&mut nnf_node, fenced)?;
        self.client
            .patch_nnf_node_status(&self.node_name, &self.api_version, &nnf_node)?;
        info!(node = %self.node_name, fenced, "fenced marker written");
        Ok(true)
    }
}

// ---------------------------------------------------------------------
// Firmware shell variant
// ---------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct InteractiveCfg {
    pub node_index: u32,
    pub command_prompt: String,
    pub shell_timeout: Duration,
    pub power_timeout: Duration,
}

pub struct InteractiveBackend<S> {
    session: S,
    node_index: u32,
    prompt: Regex,
    shell_timeout: Duration,
    power_timeout: Duration,
}

impl<S: Session> InteractiveBackend<S> {
    pub fn new(session: S, cfg: &InteractiveCfg) -> Result<Self> {
        Ok(Self {
            session,
            node_index: cfg.node_index,
            prompt: prompt_regex(&cfg.command_prompt)?,
            shell_timeout: cfg.shell_timeout,
            power_timeout: cfg.power_timeout,
        })
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    fn status_command(&self) -> String {
        format!("redfish node status | grep 'node {}'", self.node_index)
    }
}

/// The prompt is matched literally.
pub fn prompt_regex(prompt: &str) -> Result<Regex> {
    Regex::new(&regex::escape(prompt))
        .map_err(|e| FenceError::Malformed(format!("command prompt {prompt:?}: {e}")))
}

impl<S: Session> FenceBackend for InteractiveBackend<S> {
    fn observe(&mut self) -> Result<NodeObservation> {
        let cmd = self.status_command();
        self.session.send_line(&cmd)?;

        let m = self
            .session
            .expect(&STATUS_RE, self.shell_timeout)
            .map_err(|e| match e {
                FenceError::Timeout { after, .. } => {
                    FenceError::timeout(format!("status of node {}", self.node_index), after)
                }
                other => other,
            })?;
        // Re-synchronise on the prompt so the next command starts clean.
        self.session.expect(&self.prompt, self.shell_timeout)?;

        let token = m.capture.unwrap_or_default();
        debug!(node = self.node_index, %token, "firmware status token");
        Ok(NodeObservation::interactive(token))
    }

    fn power_command(&mut self, command: PowerCommand) -> Result<()> {
        let cmd = format!("redfish node {} {}", self.node_index, command.as_str());
        info!(node = self.node_index, %cmd, "sending power command");
        self.session.send_line(&cmd)?;
        self.session.expect(&self.prompt, self.power_timeout)?;
        Ok(())
    }
}
