//! Contract with the external per-node monitor subsystem.

use crate::errors::Result;
use serde_json::Value;

/// Result code meaning success; any other value is a subsystem-defined
/// failure code, logged verbatim.
pub const MONITOR_OK: i32 = 0;

/// Boundary to the native monitor subsystem.
///
/// The subsystem is a single shared external resource whose handle may be
/// absent for the whole process lifetime; holders keep an
/// `Option<Arc<dyn NativeMonitor>>` and check for absence before every use.
/// An `Err` models an internal subsystem fault, as opposed to a non-zero
/// result code.
pub trait NativeMonitor: Send + Sync {
    /// Forward the worker rank and profiling disk quota to the subsystem.
    fn init_monitor(&self, rank: u64, disk_quota_mb: u32) -> Result<i32>;

    /// Start the subsystem's monitoring thread for the local worker set.
    fn start_monitor(&self) -> Result<i32>;

    /// Query the current per-rank status snapshot.
    ///
    /// The snapshot is loosely typed; callers validate it with
    /// [`crate::topology::RankStatus::parse`] before acting on it.
    fn query_rank_status(&self) -> Result<Value>;

    /// Whether the training loop has progressed far enough that process
    /// groups are guaranteed initialized.
    fn step_reached(&self) -> Result<bool>;
}
