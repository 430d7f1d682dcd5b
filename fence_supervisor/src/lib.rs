//! fence_supervisor
//!
//! Outside-world facing layer around `fence_core`:
//! - backend adapters (cluster API, firmware shell)
//! - the interactive session provider
//! - the cluster-API HTTP client
//! - the action executor

pub mod adapter;
pub mod kube;
pub mod session;
pub mod supervisor;

pub use adapter::{prompt_regex, ApiBackend, FenceBackend, InteractiveBackend, InteractiveCfg};

pub use kube::{ClusterApi, KubeClient, KubeEndpoint, Node};

pub use session::{ProcessSession, Session, SessionMatch};

pub use supervisor::FenceSupervisor;
