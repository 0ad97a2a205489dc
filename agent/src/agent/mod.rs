//! Control-plane agent: wires the node supervisor into an externally-owned
//! worker-lifecycle runtime.
//!
//! This is a composition point, not a state machine. The runtime keeps its
//! own elastic-training semantics; the agent only registers lifecycle
//! callbacks against it, advertises the node's upstream address, and passes
//! the run loop's terminal result through unchanged.

use crate::config::{Framework, DEFAULT_UPSTREAM_ADDR, MASTER_ADDR_ENV};
use crate::errors::{AgentError, Result};
use crate::trust::CertTrustValidator;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const MAX_ADVERTISE_ATTEMPTS: u32 = 5;

/// Observed state of the local worker group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Healthy,
    Pending,
    Succeeded,
    Failed,
}

/// Lifecycle commands dispatched by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleCommand {
    KillWorker,
    StartAllWorker,
    Monitor,
    Restart,
}

impl LifecycleCommand {
    pub const ALL: [LifecycleCommand; 4] = [
        LifecycleCommand::KillWorker,
        LifecycleCommand::StartAllWorker,
        LifecycleCommand::Monitor,
        LifecycleCommand::Restart,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleCommand::KillWorker => "KILL_WORKER",
            LifecycleCommand::StartAllWorker => "START_ALL_WORKER",
            LifecycleCommand::Monitor => "MONITOR",
            LifecycleCommand::Restart => "RESTART",
        }
    }
}

impl fmt::Display for LifecycleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleCommand {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "KILL_WORKER" => Ok(LifecycleCommand::KillWorker),
            "START_ALL_WORKER" => Ok(LifecycleCommand::StartAllWorker),
            "MONITOR" => Ok(LifecycleCommand::Monitor),
            "RESTART" => Ok(LifecycleCommand::Restart),
            other => Err(AgentError::UnknownCommand(other.to_string())),
        }
    }
}

/// Worker-lifecycle methods owned by the external orchestration runtime.
///
/// Methods take `&self` and must be safe to call concurrently; registered
/// callbacks are invoked under concurrent dispatch.
pub trait WorkerLifecycle: Send + Sync + 'static {
    /// Terminal result of the runtime's run loop; the agent passes it
    /// through unchanged.
    type Outcome;

    /// Make this node's upstream address known to the runtime.
    fn advertise_upstream(&self, upstream: &str) -> Result<()>;

    fn stop_workers(&self) -> Result<()>;

    fn initialize_workers(&self) -> Result<()>;

    fn monitor_workers(&self) -> Result<WorkerState>;

    fn restart_workers(&self) -> Result<()>;

    /// Run loop; blocks until the job reaches a terminal state.
    fn run(&self) -> Self::Outcome;
}

type Handler = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Bridges the node supervisor into the orchestration runtime.
///
/// The callback registry is populated once at construction and read-only
/// afterwards.
pub struct ControlPlaneAgent<H: WorkerLifecycle> {
    hook: Arc<H>,
    agent_id: Uuid,
    framework: Framework,
    trust: CertTrustValidator,
    callbacks: HashMap<LifecycleCommand, Handler>,
}

impl<H: WorkerLifecycle> ControlPlaneAgent<H> {
    pub fn new(hook: Arc<H>, framework: Framework, trust: CertTrustValidator) -> Self {
        let callbacks = register_callbacks(&hook);
        let agent_id = Uuid::new_v4();
        info!(
            agent_id = %agent_id,
            framework = %framework,
            callbacks = callbacks.len(),
            "Control plane agent initialized"
        );

        Self {
            hook,
            agent_id,
            framework,
            trust,
            callbacks,
        }
    }

    pub fn agent_id(&self) -> Uuid {
        self.agent_id
    }

    pub fn framework(&self) -> Framework {
        self.framework
    }

    /// This node's upstream address: `MASTER_ADDR`, or loopback.
    pub fn upstream_addr() -> String {
        env::var(MASTER_ADDR_ENV).unwrap_or_else(|_| DEFAULT_UPSTREAM_ADDR.to_string())
    }

    /// Start the agent and hand control to the runtime's run loop.
    ///
    /// Spawns the proxy-advertisement task in the background, then blocks
    /// on `hook.run()` and returns whatever terminal result it yields.
    pub async fn run(&self) -> H::Outcome {
        self.spawn_proxy_task();
        info!(agent_id = %self.agent_id, "Starting worker lifecycle run loop");
        self.hook.run()
    }

    /// Advertise the upstream address with bounded retries.
    ///
    /// Failures degrade to a log entry; the advertisement must never block
    /// the run loop or prevent process shutdown.
    fn spawn_proxy_task(&self) {
        let hook = self.hook.clone();
        let upstream = Self::upstream_addr();

        tokio::spawn(async move {
            let mut retry_delay = Duration::from_secs(1);
            for attempt in 1..=MAX_ADVERTISE_ATTEMPTS {
                match hook.advertise_upstream(&upstream) {
                    Ok(()) => {
                        info!(upstream = %upstream, attempt, "Advertised upstream address");
                        return;
                    }
                    Err(e) => {
                        warn!(
                            attempt,
                            retry_in = ?retry_delay,
                            error = %e,
                            "Failed to advertise upstream address, retrying"
                        );
                        sleep(retry_delay).await;
                        retry_delay = std::cmp::min(retry_delay * 2, Duration::from_secs(60));
                    }
                }
            }
            error!(upstream = %upstream, "Giving up advertising upstream address");
        });
    }

    /// Invoke the registered handler for `command`.
    pub fn dispatch(&self, command: LifecycleCommand) -> Result<()> {
        let handler = self
            .callbacks
            .get(&command)
            .ok_or_else(|| AgentError::UnknownCommand(command.to_string()))?;
        debug!(command = %command, "Dispatching lifecycle callback");
        handler()
    }

    /// Validate a peer certificate, then dispatch.
    ///
    /// The trust failure path propagates; an untrusted peer never reaches
    /// a handler. Returns the trusted peer's common name.
    pub fn authorize_and_dispatch(
        &self,
        peer_cert: &[u8],
        command: LifecycleCommand,
    ) -> Result<String> {
        let peer = self.trust.check_cert_info(peer_cert)?;
        info!(peer = %peer, command = %command, "Authorized control-plane dispatch");
        self.dispatch(command)?;
        Ok(peer)
    }
}

fn register_callbacks<H: WorkerLifecycle>(hook: &Arc<H>) -> HashMap<LifecycleCommand, Handler> {
    let mut callbacks: HashMap<LifecycleCommand, Handler> = HashMap::new();

    let h = hook.clone();
    callbacks.insert(
        LifecycleCommand::KillWorker,
        Arc::new(move || h.stop_workers()),
    );

    let h = hook.clone();
    callbacks.insert(
        LifecycleCommand::StartAllWorker,
        Arc::new(move || h.initialize_workers()),
    );

    let h = hook.clone();
    callbacks.insert(
        LifecycleCommand::Monitor,
        Arc::new(move || {
            let state = h.monitor_workers()?;
            debug!(state = ?state, "Monitored worker group");
            Ok(())
        }),
    );

    let h = hook.clone();
    callbacks.insert(
        LifecycleCommand::Restart,
        Arc::new(move || h.restart_workers()),
    );

    callbacks
}
