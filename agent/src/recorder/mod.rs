//! Durable capture of process-group topology once training reaches a
//! stable step.
//!
//! The capture task polls the native monitor for the step-reached signal,
//! harvests communicator-to-group mappings from the training framework,
//! and writes a single JSON document per (job id, rank). The whole
//! sequence is best-effort diagnostics: every failure is logged and
//! discarded, never escalated to the worker.

mod framework;

pub use framework::{CollectiveFramework, GroupEntry, ProcessGroup};

use crate::config::{state_dir, Framework, SupervisorConfig, WorkerConfig, JOB_ID_ENV};
use crate::errors::Result;
use crate::monitor::NativeMonitor;
use serde::Serialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// File name of the captured document inside the per-rank directory.
pub const GROUP_INFO_FILE: &str = "group_info.json";

/// Reserved group-name sentinel for the default/world group.
pub const DEFAULT_GROUP: &str = "DEFAULT";

/// Owner-only mode for the per-rank output directory.
const GROUP_INFO_DIR_MODE: u32 = 0o700;

/// Mapping from communicator name to recorded group facts.
pub type GroupInfo = BTreeMap<String, GroupEntry>;

#[derive(Serialize)]
struct GroupInfoDocument<'a> {
    group_info: &'a GroupInfo,
}

/// Tuning for the capture task.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Interval between polls of the step-reached signal.
    pub poll_interval: Duration,

    /// Optional upper bound on the step wait. `None` keeps retrying for
    /// the job's own lifetime.
    pub deadline: Option<Duration>,

    /// Base directory for per-(job, rank) output.
    pub base_dir: PathBuf,

    /// Collective backend whose groups are recorded (matched
    /// case-insensitively).
    pub collective_backend: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            deadline: None,
            base_dir: state_dir().join("profiling"),
            collective_backend: "nccl".to_string(),
        }
    }
}

impl RecorderConfig {
    /// Derive recorder tuning from the node-wide supervisor configuration.
    pub fn from_supervisor(config: &SupervisorConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.check_step_period_secs),
            deadline: config.capture_deadline_secs.map(Duration::from_secs),
            base_dir: config.profiling_base_dir.clone(),
            collective_backend: config.collective_backend.clone(),
        }
    }
}

/// Captures and persists the process-group topology for one worker.
pub struct GroupInfoRecorder {
    config: RecorderConfig,
    subsystem: Option<Arc<dyn NativeMonitor>>,
    framework: Arc<dyn CollectiveFramework>,
    worker: WorkerConfig,
}

impl GroupInfoRecorder {
    pub fn new(
        config: RecorderConfig,
        subsystem: Option<Arc<dyn NativeMonitor>>,
        framework: Arc<dyn CollectiveFramework>,
        worker: WorkerConfig,
    ) -> Self {
        Self {
            config,
            subsystem,
            framework,
            worker,
        }
    }

    /// Entry point for the capture task.
    ///
    /// Runs on its own tokio task and contains every failure; the owning
    /// process never observes an error from it.
    pub async fn run(self) {
        if let Err(e) = self.capture().await {
            error!(rank = self.worker.rank, error = %e, "Group info capture failed");
        }
    }

    async fn capture(&self) -> Result<()> {
        if self.worker.framework != Framework::Torch {
            warn!(
                framework = %self.worker.framework,
                "Framework does not support group info capture"
            );
            return Ok(());
        }

        if !self.wait_step_reached().await {
            return Ok(());
        }

        info!(rank = self.worker.rank, "Capturing process-group topology");
        let group_info = self.collect();
        if group_info.is_empty() {
            debug!(
                rank = self.worker.rank,
                "No established communicators, nothing to record"
            );
            return Ok(());
        }

        let Some(dir) = self.output_dir()? else {
            return Ok(());
        };
        write_document(&dir.join(GROUP_INFO_FILE), &group_info)
    }

    /// Poll the step-reached signal until ready.
    ///
    /// Blocks only this task. Without a configured deadline the wait is
    /// bounded solely by the job's own lifetime.
    async fn wait_step_reached(&self) -> bool {
        let Some(subsystem) = &self.subsystem else {
            error!("native monitor subsystem is not loaded, skipping group info capture");
            return false;
        };

        let started = Instant::now();
        loop {
            match subsystem.step_reached() {
                Ok(true) => return true,
                Ok(false) => {
                    debug!("Not ready to write group info, retrying");
                }
                Err(e) => {
                    warn!(error = %e, "Step query failed, retrying");
                }
            }
            if let Some(deadline) = self.config.deadline {
                if started.elapsed() >= deadline {
                    warn!(
                        rank = self.worker.rank,
                        deadline_secs = deadline.as_secs(),
                        "Gave up waiting for the step-reached signal"
                    );
                    return false;
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Harvest communicator mappings from the framework's live groups.
    fn collect(&self) -> GroupInfo {
        let mut group_info = GroupInfo::new();

        if !self.framework.is_available() || !self.framework.is_initialized() {
            error!(
                rank = self.worker.rank,
                "Distributed runtime is not available or not initialized"
            );
            return group_info;
        }

        let global_rank = self.framework.global_rank();
        for group in self.framework.process_groups() {
            if !group
                .backend()
                .eq_ignore_ascii_case(&self.config.collective_backend)
            {
                continue;
            }
            // Not yet established is a normal state, not an error.
            let Some(comm_name) = group.comm_name(global_rank, false) else {
                continue;
            };
            let Some(group_rank) = group.group_rank(global_rank) else {
                debug!(comm = %comm_name, "Current rank is not a member, skipping");
                continue;
            };
            group_info.insert(
                comm_name,
                GroupEntry {
                    group_name: group.group_name(),
                    group_rank,
                    global_ranks: group.global_ranks(),
                },
            );
        }

        if let Some(default) = self.framework.default_group() {
            if let Some(comm_name) = default.comm_name(global_rank, false) {
                if let Some(group_rank) = default.group_rank(global_rank) {
                    group_info.insert(
                        comm_name,
                        GroupEntry {
                            group_name: DEFAULT_GROUP.to_string(),
                            group_rank,
                            global_ranks: default.global_ranks(),
                        },
                    );
                }
            }
        }

        group_info
    }

    /// Resolve and create `<base>/<job_id>/<rank>`.
    ///
    /// A missing job id aborts the capture without error.
    fn output_dir(&self) -> Result<Option<PathBuf>> {
        let job_id = match env::var(JOB_ID_ENV) {
            Ok(v) if !v.is_empty() => v,
            _ => {
                error!("Job id is not set, skipping group info capture");
                return Ok(None);
            }
        };

        let dir = self
            .config
            .base_dir
            .join(&job_id)
            .join(self.worker.rank.to_string());
        create_restricted_dir(&dir)?;
        Ok(Some(dir))
    }
}

/// Create `dir` (and parents) owner-only, tolerating pre-existence.
fn create_restricted_dir(dir: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(GROUP_INFO_DIR_MODE);
    }
    match builder.create(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            debug!(path = %dir.display(), "Output directory already exists");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Write the document atomically (temp file + rename).
fn write_document(path: &Path, group_info: &GroupInfo) -> Result<()> {
    let json = serde_json::to_string_pretty(&GroupInfoDocument { group_info })?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, json)?;
    fs::rename(&temp_path, path)?;

    info!(
        path = %path.display(),
        groups = group_info.len(),
        "Group info recorded"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AgentError;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    struct StubMonitor {
        step: AtomicBool,
    }

    impl StubMonitor {
        fn ready() -> Self {
            Self {
                step: AtomicBool::new(true),
            }
        }

        fn never_ready() -> Self {
            Self {
                step: AtomicBool::new(false),
            }
        }
    }

    impl NativeMonitor for StubMonitor {
        fn init_monitor(&self, _rank: u64, _disk_quota_mb: u32) -> Result<i32> {
            Ok(0)
        }
        fn start_monitor(&self) -> Result<i32> {
            Ok(0)
        }
        fn query_rank_status(&self) -> Result<Value> {
            Err(AgentError::Monitor("not implemented".to_string()))
        }
        fn step_reached(&self) -> Result<bool> {
            Ok(self.step.load(Ordering::SeqCst))
        }
    }

    struct StubGroup {
        backend: &'static str,
        name: &'static str,
        comm: Option<&'static str>,
        ranks: Vec<u64>,
    }

    impl ProcessGroup for StubGroup {
        fn backend(&self) -> String {
            self.backend.to_string()
        }
        fn group_name(&self) -> String {
            self.name.to_string()
        }
        fn comm_name(&self, _global_rank: u64, _init_comm: bool) -> Option<String> {
            self.comm.map(str::to_string)
        }
        fn group_rank(&self, global_rank: u64) -> Option<u64> {
            self.ranks.iter().position(|r| *r == global_rank).map(|p| p as u64)
        }
        fn global_ranks(&self) -> Vec<u64> {
            self.ranks.clone()
        }
    }

    struct StubFramework {
        initialized: bool,
        groups: Vec<Arc<dyn ProcessGroup>>,
        default: Option<Arc<dyn ProcessGroup>>,
    }

    impl CollectiveFramework for StubFramework {
        fn is_available(&self) -> bool {
            true
        }
        fn is_initialized(&self) -> bool {
            self.initialized
        }
        fn global_rank(&self) -> u64 {
            1
        }
        fn process_groups(&self) -> Vec<Arc<dyn ProcessGroup>> {
            self.groups.clone()
        }
        fn default_group(&self) -> Option<Arc<dyn ProcessGroup>> {
            self.default.clone()
        }
    }

    fn recorder_with(
        framework: StubFramework,
        subsystem: Arc<dyn NativeMonitor>,
        base_dir: PathBuf,
    ) -> GroupInfoRecorder {
        GroupInfoRecorder::new(
            RecorderConfig {
                poll_interval: Duration::from_millis(10),
                deadline: Some(Duration::from_millis(200)),
                base_dir,
                collective_backend: "nccl".to_string(),
            },
            Some(subsystem),
            Arc::new(framework),
            WorkerConfig::for_rank(1),
        )
    }

    #[test]
    fn test_collect_skips_foreign_backends_and_unestablished_groups() {
        let framework = StubFramework {
            initialized: true,
            groups: vec![
                Arc::new(StubGroup {
                    backend: "NCCL",
                    name: "tp",
                    comm: Some("comm-tp"),
                    ranks: vec![0, 1],
                }),
                Arc::new(StubGroup {
                    backend: "gloo",
                    name: "cpu",
                    comm: Some("comm-cpu"),
                    ranks: vec![0, 1],
                }),
                Arc::new(StubGroup {
                    backend: "nccl",
                    name: "dp",
                    comm: None,
                    ranks: vec![0, 1],
                }),
            ],
            default: Some(Arc::new(StubGroup {
                backend: "nccl",
                name: "",
                comm: Some("comm-world"),
                ranks: vec![0, 1, 2, 3],
            })),
        };
        let recorder = recorder_with(
            framework,
            Arc::new(StubMonitor::ready()),
            PathBuf::from("/unused"),
        );

        let info = recorder.collect();
        assert_eq!(info.len(), 2);
        assert_eq!(info["comm-tp"].group_name, "tp");
        assert_eq!(info["comm-tp"].group_rank, 1);
        assert_eq!(info["comm-world"].group_name, DEFAULT_GROUP);
        assert_eq!(info["comm-world"].global_ranks, vec![0, 1, 2, 3]);
        assert!(!info.contains_key("comm-cpu"));
    }

    #[test]
    fn test_collect_requires_initialized_runtime() {
        let framework = StubFramework {
            initialized: false,
            groups: vec![Arc::new(StubGroup {
                backend: "nccl",
                name: "tp",
                comm: Some("comm-tp"),
                ranks: vec![0, 1],
            })],
            default: None,
        };
        let recorder = recorder_with(
            framework,
            Arc::new(StubMonitor::ready()),
            PathBuf::from("/unused"),
        );

        assert!(recorder.collect().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_bounds_the_step_wait() {
        let framework = StubFramework {
            initialized: true,
            groups: Vec::new(),
            default: None,
        };
        let recorder = recorder_with(
            framework,
            Arc::new(StubMonitor::never_ready()),
            PathBuf::from("/unused"),
        );

        assert!(!recorder.wait_step_reached().await);
    }

    #[tokio::test]
    async fn test_missing_job_id_skips_write() {
        // JOB_ID is only set by the integration tests, which run in a
        // separate process.
        std::env::remove_var(JOB_ID_ENV);

        let temp_dir = TempDir::new().unwrap();
        let framework = StubFramework {
            initialized: true,
            groups: Vec::new(),
            default: Some(Arc::new(StubGroup {
                backend: "nccl",
                name: "",
                comm: Some("comm-world"),
                ranks: vec![0, 1],
            })),
        };
        let recorder = recorder_with(
            framework,
            Arc::new(StubMonitor::ready()),
            temp_dir.path().to_path_buf(),
        );

        recorder.run().await;
        assert!(
            fs::read_dir(temp_dir.path()).unwrap().next().is_none(),
            "no output should be written without a job id"
        );
    }

    #[test]
    fn test_write_document_is_atomic_and_wrapped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(GROUP_INFO_FILE);

        let mut info = GroupInfo::new();
        info.insert(
            "comm-world".to_string(),
            GroupEntry {
                group_name: DEFAULT_GROUP.to_string(),
                group_rank: 0,
                global_ranks: vec![0, 1],
            },
        );

        write_document(&path, &info).unwrap();

        assert!(!path.with_extension("json.tmp").exists());
        let value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["group_info"]["comm-world"]["group_rank"], 0);
        assert_eq!(
            value["group_info"]["comm-world"]["global_ranks"],
            serde_json::json!([0, 1])
        );
    }

    #[test]
    fn test_create_restricted_dir_tolerates_existing() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("job").join("0");

        create_restricted_dir(&dir).unwrap();
        create_restricted_dir(&dir).unwrap();
        assert!(dir.is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&dir).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, GROUP_INFO_DIR_MODE);
        }
    }
}
