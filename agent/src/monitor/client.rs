//! Lifecycle of the native monitor subsystem for a single node.
//!
//! Every operation reports failure as `false` plus a log entry; a monitor
//! outage must never take the node supervisor down with it.

use crate::config::WorkerConfig;
use crate::monitor::subsystem::{NativeMonitor, MONITOR_OK};
use crate::recorder::GroupInfoRecorder;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Client owning monitor initialization, startup, and status polling for
/// the local worker set.
pub struct MonitorClient {
    subsystem: Option<Arc<dyn NativeMonitor>>,
    config: WorkerConfig,
}

impl MonitorClient {
    pub fn new(subsystem: Option<Arc<dyn NativeMonitor>>, config: WorkerConfig) -> Self {
        Self { subsystem, config }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Forward rank and disk quota to the subsystem.
    ///
    /// Returns `false` when the subsystem handle is absent, reports a
    /// non-zero result code, or faults internally.
    pub fn init(&self) -> bool {
        let Some(subsystem) = &self.subsystem else {
            error!("native monitor subsystem is not loaded");
            return false;
        };

        match subsystem.init_monitor(self.config.rank, self.config.disk_quota_mb) {
            Ok(MONITOR_OK) => {
                info!(
                    rank = self.config.rank,
                    disk_quota_mb = self.config.disk_quota_mb,
                    "Monitor initialized"
                );
                true
            }
            Ok(code) => {
                warn!(code, "Failed to initialize monitor");
                false
            }
            Err(e) => {
                error!(error = %e, "Monitor initialization faulted");
                false
            }
        }
    }

    /// Start the monitoring thread for the local worker set.
    ///
    /// On success, spawns the group-info capture task in the background;
    /// the task waits for the step-reached signal on its own and never
    /// blocks the caller. Must be called within a tokio runtime.
    pub fn start(&self, recorder: GroupInfoRecorder) -> bool {
        let Some(subsystem) = &self.subsystem else {
            error!("native monitor subsystem is not loaded");
            return false;
        };

        match subsystem.start_monitor() {
            Ok(MONITOR_OK) => {
                info!(rank = self.config.rank, "Monitor client started");
                tokio::spawn(recorder.run());
                true
            }
            Ok(code) => {
                warn!(code, "Failed to start monitor client");
                false
            }
            Err(e) => {
                error!(error = %e, "Monitor startup faulted");
                false
            }
        }
    }

    /// Query the current per-rank status snapshot.
    ///
    /// Returns the raw snapshot; callers validate well-formedness with
    /// [`crate::topology::RankStatus::parse`]. `None` means the subsystem
    /// is absent or faulted, never a panic.
    pub fn poll_status(&self) -> Option<Value> {
        let Some(subsystem) = &self.subsystem else {
            error!("native monitor subsystem is not loaded");
            return None;
        };

        match subsystem.query_rank_status() {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "Rank status query failed");
                None
            }
        }
    }
}
