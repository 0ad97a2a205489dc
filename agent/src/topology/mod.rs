mod rank;
mod status;

pub use rank::resolve_global_ranks;
pub use status::{RankEntry, RankStatus, SnapshotError};
