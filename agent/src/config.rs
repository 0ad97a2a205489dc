//! Supervisor configuration: per-worker monitor settings and the node-wide
//! agent configuration persisted under `~/.warden/config.toml`.

use crate::errors::{AgentError, Result};
use crate::trust::TrustPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable carrying this node's position in the node ordering.
pub const NODE_RANK_ENV: &str = "NODE_RANK";

/// Environment variable carrying the number of workers on this node.
pub const LOCAL_WORLD_SIZE_ENV: &str = "LOCAL_WORLD_SIZE";

/// Environment variable carrying the job identifier used to key group-info output.
pub const JOB_ID_ENV: &str = "JOB_ID";

/// Environment variable carrying the master/upstream address.
pub const MASTER_ADDR_ENV: &str = "MASTER_ADDR";

/// Upstream address used when `MASTER_ADDR` is not set.
pub const DEFAULT_UPSTREAM_ADDR: &str = "127.0.0.1";

/// Default profiling disk quota per worker, in megabytes.
pub const DEFAULT_DISK_QUOTA_MB: u32 = 5000;

/// Smallest accepted profiling disk quota, in megabytes.
pub const MIN_DISK_QUOTA_MB: u32 = 500;

/// Training framework driving the local workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    /// A torch-like framework with live process-group state.
    Torch,
    /// Any other framework; group-info capture is unsupported.
    Other,
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framework::Torch => write!(f, "PyTorch"),
            Framework::Other => write!(f, "other"),
        }
    }
}

/// Per-worker monitor configuration, fixed at monitor-initialization time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Training framework driving this worker
    pub framework: Framework,
    /// Global rank of this worker process
    pub rank: u64,
    /// Upper bound on profiling output, in megabytes
    pub disk_quota_mb: u32,
}

impl WorkerConfig {
    /// Build a worker configuration, rejecting a disk quota below
    /// [`MIN_DISK_QUOTA_MB`].
    pub fn new(framework: Framework, rank: u64, disk_quota_mb: u32) -> Result<Self> {
        if disk_quota_mb < MIN_DISK_QUOTA_MB {
            return Err(AgentError::Config(format!(
                "disk quota {} MB is below the minimum {} MB",
                disk_quota_mb, MIN_DISK_QUOTA_MB
            )));
        }
        Ok(Self {
            framework,
            rank,
            disk_quota_mb,
        })
    }

    /// Torch-like worker with the default disk quota.
    pub fn for_rank(rank: u64) -> Self {
        Self {
            framework: Framework::Torch,
            rank,
            disk_quota_mb: DEFAULT_DISK_QUOTA_MB,
        }
    }
}

/// Node-wide supervisor configuration.
///
/// Serialized to TOML and saved at `~/.warden/config.toml`. Every field has
/// a default, so a missing or partial file degrades gracefully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Default log level (overridden by `RUST_LOG`)
    pub log_level: String,

    /// Base directory for per-(job, rank) group-info output
    pub profiling_base_dir: PathBuf,

    /// Seconds between polls of the step-reached signal
    pub check_step_period_secs: u64,

    /// Optional upper bound on the step wait; `None` waits for the job's lifetime
    pub capture_deadline_secs: Option<u64>,

    /// Collective backend whose process groups are recorded
    pub collective_backend: String,

    /// Profiling disk quota handed to the native monitor, in megabytes
    pub disk_quota_mb: u32,

    /// Trust policy applied to control-plane peer certificates
    pub trust: TrustPolicy,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            profiling_base_dir: state_dir().join("profiling"),
            check_step_period_secs: 5,
            capture_deadline_secs: None,
            collective_backend: "nccl".to_string(),
            disk_quota_mb: DEFAULT_DISK_QUOTA_MB,
            trust: TrustPolicy::default(),
        }
    }
}

impl SupervisorConfig {
    /// Get default configuration file path: `~/.warden/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| AgentError::Config("Could not determine home directory".to_string()))?;
        Ok(home.join(".warden").join("config.toml"))
    }

    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "Failed to read config file"
            );
            e
        })?;

        let config: Self = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Supervisor configuration loaded");
        Ok(config)
    }

    /// Load configuration from the default path, falling back to defaults
    /// when the file does not exist.
    pub fn load_or_default() -> Self {
        match Self::default_path() {
            Ok(path) if path.exists() => Self::load(&path).unwrap_or_default(),
            _ => Self::default(),
        }
    }

    /// Save configuration to file.
    ///
    /// Creates parent directories if they don't exist.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        let temp_path = path.with_extension("toml.tmp");
        fs::write(&temp_path, &toml_string)?;
        fs::rename(&temp_path, path)?;

        tracing::info!(path = %path.display(), "Supervisor configuration saved");
        Ok(())
    }
}

/// Node-local state directory: `~/.warden` (current directory as a last resort).
pub fn state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".warden")
}
