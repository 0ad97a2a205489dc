//! Seam to the training framework's collective-communication state.
//!
//! The framework owns the live process groups; the recorder only reads
//! them through these traits, injected at construction time.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A live process group exposed by the training framework.
pub trait ProcessGroup: Send + Sync {
    /// Communication backend identifier (e.g. "nccl", "gloo").
    fn backend(&self) -> String;

    /// Framework-assigned group name; empty when unnamed.
    fn group_name(&self) -> String;

    /// Communicator name for `global_rank`.
    ///
    /// With `init_comm` false this must not force lazy initialization;
    /// `None` means the communicator is not established yet.
    fn comm_name(&self, global_rank: u64, init_comm: bool) -> Option<String>;

    /// This rank's position within the group, `None` when not a member.
    fn group_rank(&self, global_rank: u64) -> Option<u64>;

    /// Global ranks participating in the group, in group order.
    fn global_ranks(&self) -> Vec<u64>;
}

/// Read-only view of the framework's distributed state.
pub trait CollectiveFramework: Send + Sync {
    /// Whether the framework was built with distributed capability.
    fn is_available(&self) -> bool;

    /// Whether the distributed runtime has been initialized.
    fn is_initialized(&self) -> bool;

    /// Global rank of the current process.
    fn global_rank(&self) -> u64;

    /// Every live process group.
    fn process_groups(&self) -> Vec<Arc<dyn ProcessGroup>>;

    /// The default/world group, when one exists.
    fn default_group(&self) -> Option<Arc<dyn ProcessGroup>>;
}

/// Recorded facts about one established communicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    pub group_name: String,
    pub group_rank: u64,
    pub global_ranks: Vec<u64>,
}
