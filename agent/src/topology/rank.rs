//! Global-rank resolution from the node-local environment.

use crate::config::{LOCAL_WORLD_SIZE_ENV, NODE_RANK_ENV};
use std::env;
use tracing::warn;

/// Compute the set of global ranks owned by this node.
///
/// Reads the node rank and local worker count from the environment and
/// returns `node_rank * local_world_size + i` for each local worker `i`.
/// A missing or unparseable value resolves to an empty set — the caller
/// treats that as "no ranks owned by this node", never as a fault.
pub fn resolve_global_ranks() -> Vec<u64> {
    resolve(
        env::var(NODE_RANK_ENV).ok().as_deref(),
        env::var(LOCAL_WORLD_SIZE_ENV).ok().as_deref(),
    )
}

fn resolve(node_rank: Option<&str>, local_world_size: Option<&str>) -> Vec<u64> {
    let Some(node_rank) = node_rank.and_then(|v| v.trim().parse::<u64>().ok()) else {
        warn!(
            var = NODE_RANK_ENV,
            "node rank missing or not an integer, resolving no ranks"
        );
        return Vec::new();
    };
    let Some(local_world_size) = local_world_size.and_then(|v| v.trim().parse::<u64>().ok())
    else {
        warn!(
            var = LOCAL_WORLD_SIZE_ENV,
            "local world size missing or not an integer, resolving no ranks"
        );
        return Vec::new();
    };
    if local_world_size == 0 {
        warn!(
            var = LOCAL_WORLD_SIZE_ENV,
            "local world size is zero, resolving no ranks"
        );
        return Vec::new();
    }

    (0..local_world_size)
        .map(|i| node_rank * local_world_size + i)
        .collect()
}
