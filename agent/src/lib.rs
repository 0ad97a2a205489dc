pub mod agent;
pub mod config;
pub mod errors;
pub mod monitor;
pub mod observability;
pub mod recorder;
pub mod topology;
pub mod trust;

pub use agent::{ControlPlaneAgent, LifecycleCommand, WorkerLifecycle, WorkerState};
pub use config::{Framework, SupervisorConfig, WorkerConfig};
pub use errors::{AgentError, Result};
pub use monitor::{MonitorClient, NativeMonitor, MONITOR_OK};
pub use observability::{init_production_logging, init_simple_logging};
pub use recorder::{
    CollectiveFramework, GroupEntry, GroupInfo, GroupInfoRecorder, ProcessGroup, RecorderConfig,
    DEFAULT_GROUP, GROUP_INFO_FILE,
};
pub use topology::{resolve_global_ranks, RankEntry, RankStatus, SnapshotError};
pub use trust::{CertInfo, CertTrustValidator, KeyType, TrustError, TrustPolicy};
