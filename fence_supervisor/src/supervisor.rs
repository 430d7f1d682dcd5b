//! Action executor.
//!
//! Runs one `ActionRequest` against one backend:
//! - asks the policy whether the action is legal (hard refusals never touch
//!   the backend)
//! - observes and resolves the current state
//! - mutates the backend when the node is not already in the target state
//! - confirms the target state with a single re-check; a read that shows the
//!   target state is a success even when it lands on the deadline
//!
//! No retry loop. The only waits are the configured power wait and whatever
//! bound the backend applies to its own I/O.

use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use fence_core::{
    deadline_after, resolve, ActionKind, ActionRequest, ActionResult, Authorization, FenceError,
    FencingPolicy, MutationTarget, PowerState, Result,
};

use crate::adapter::FenceBackend;

#[derive(Clone, Debug)]
pub struct FenceSupervisor {
    policy: FencingPolicy,
    power_wait: Duration,
}

impl FenceSupervisor {
    pub fn new(policy: FencingPolicy) -> Self {
        Self {
            policy,
            power_wait: Duration::ZERO,
        }
    }

    /// Pause between a mutation and its confirmation read.
    pub fn with_power_wait(mut self, power_wait: Duration) -> Self {
        self.power_wait = power_wait;
        self
    }

    pub fn policy(&self) -> &FencingPolicy {
        &self.policy
    }

    /// Reject hard-refused actions. Callers run this before opening any
    /// connection so a refused action performs no I/O at all.
    pub fn preflight(&self, kind: ActionKind) -> Result<()> {
        match self.policy.authorize(kind) {
            Authorization::Refused => Err(self.refuse(kind)),
            _ => Ok(()),
        }
    }

    fn refuse(&self, action: ActionKind) -> FenceError {
        let class = self.policy.class;
        error!(%action, %class, "action refused by device policy");
        FenceError::PolicyRefused { action, class }
    }

    /// Observe and resolve once.
    pub fn status(&self, backend: &mut dyn FenceBackend) -> Result<PowerState> {
        let observation = backend.observe()?;
        resolve(&observation)
    }

    pub fn execute(
        &self,
        backend: &mut dyn FenceBackend,
        request: ActionRequest,
    ) -> Result<ActionResult> {
        let deadline = deadline_after(request.timeout);
        let class = self.policy.class;

        match self.policy.authorize(request.kind) {
            Authorization::Refused => Err(self.refuse(request.kind)),

            Authorization::ReadOnly => {
                let state = self.status(backend)?;
                info!(action = %request.kind, %state, "node status");
                Ok(ActionResult::observed(state))
            }

            Authorization::Withheld => {
                let state = self.status(backend)?;
                warn!(
                    action = %request.kind,
                    %class,
                    %state,
                    "action withheld by device policy; left to the administrator"
                );
                Ok(ActionResult::withheld(state))
            }

            Authorization::Permitted(target) => {
                let Some(want) = request.kind.target_state() else {
                    // `authorize` only permits mutating actions.
                    return Err(FenceError::Unsupported("mutation for a read-only action"));
                };

                let current = self.status(backend)?;
                if current == want {
                    info!(action = %request.kind, state = %current, "node already in requested state");
                    return Ok(ActionResult::already(current));
                }

                self.mutate(backend, target)?;
                self.confirm(backend, want, deadline, request.timeout)
            }
        }
    }

    fn mutate(&self, backend: &mut dyn FenceBackend, target: MutationTarget) -> Result<()> {
        match target {
            MutationTarget::Hardware(command) => backend.power_command(command),
            MutationTarget::FencedFlag(fenced) => backend.apply_fenced(fenced).map(|_| ()),
        }
    }

    fn confirm(
        &self,
        backend: &mut dyn FenceBackend,
        want: PowerState,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<ActionResult> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let wait = self.power_wait.min(remaining);
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }

        let state = self.status(backend)?;
        if state != want {
            error!(expected = %want, observed = %state, "power state not confirmed");
            if Instant::now() > deadline {
                return Err(FenceError::timeout(format!("node to power {want}"), timeout));
            }
            return Err(FenceError::waiting_for(want));
        }

        info!(state = %state, "power state confirmed");
        Ok(ActionResult::applied(state))
    }
}
