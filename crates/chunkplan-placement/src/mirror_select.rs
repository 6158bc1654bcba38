//! Pool selection within a mirror and mirror preference for uploads.
//!
//! [`select_pool_type`] partitions a mirror's pools into on-premise and cloud
//! pools and decides which side an opportunistic allocation should go to.
//! [`select_preferred_mirror`] ranks mirrors so uploads land on writable
//! on-premise capacity instead of waiting on cloud latency.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::MirrorWeights;
use crate::error::{PlacementError, PlacementResult};
use crate::types::{is_pool_valid, Mirror, Pool, Tier, TieringPoolsStatus};

/// Choice function used to pick the reference pool of a mirror.
pub trait PoolPicker: Send + Sync {
    /// Returns an index in `0..len`. `len` is never zero.
    fn pick(&self, len: usize) -> usize;
}

/// Uniform random choice from the thread RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPoolPicker;

impl PoolPicker for RandomPoolPicker {
    fn pick(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Always picks the same index, clamped to the list length.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPoolPicker(pub usize);

impl PoolPicker for FixedPoolPicker {
    fn pick(&self, len: usize) -> usize {
        self.0.min(len.saturating_sub(1))
    }
}

/// Pseudo-random choice that depends only on the seed and the list length.
#[derive(Debug, Clone, Copy)]
pub struct SeededPoolPicker {
    seed: u64,
}

impl SeededPoolPicker {
    /// Creates a picker from a seed.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl PoolPicker for SeededPoolPicker {
    fn pick(&self, len: usize) -> usize {
        let mut rng = StdRng::seed_from_u64(self.seed ^ len as u64);
        rng.gen_range(0..len)
    }
}

/// Allocation view of one mirror.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MirrorStatus {
    /// On-premise pools of the mirror.
    pub regular_pools: Vec<Pool>,
    /// Cloud pools of the mirror.
    pub cloud_pools: Vec<Pool>,
    /// At least one on-premise pool is valid for allocation.
    pub regular_pools_valid: bool,
    /// At least one cloud pool is valid for allocation.
    pub cloud_pools_valid: bool,
    /// Pools used when blocks already span cloud and on-premise.
    pub picked_pools: Vec<Pool>,
}

/// Computes the allocation view of a mirror's spread pools.
///
/// A randomly picked reference pool decides which side is preferred: a cloud
/// reference prefers valid on-premise pools, an on-premise reference prefers
/// valid cloud pools, and either falls back to its own side.
pub fn select_pool_type(
    spread_pools: &[Pool],
    pools_status: &TieringPoolsStatus,
    picker: &dyn PoolPicker,
) -> PlacementResult<MirrorStatus> {
    if spread_pools.is_empty() {
        return Err(PlacementError::EmptySpreadPools);
    }

    let idx = picker.pick(spread_pools.len()).min(spread_pools.len() - 1);
    let reference = &spread_pools[idx];

    let (regular_pools, cloud_pools): (Vec<Pool>, Vec<Pool>) =
        spread_pools.iter().cloned().partition(|p| !p.is_cloud());

    let regular_pools_valid = regular_pools
        .iter()
        .any(|p| is_pool_valid(pools_status, &p.name));
    let cloud_pools_valid = cloud_pools
        .iter()
        .any(|p| is_pool_valid(pools_status, &p.name));

    let picked_pools = if reference.is_cloud() {
        if regular_pools_valid {
            regular_pools.clone()
        } else {
            cloud_pools.clone()
        }
    } else if cloud_pools_valid {
        cloud_pools.clone()
    } else {
        regular_pools.clone()
    };

    trace!(
        reference = %reference.name,
        regular_pools_valid,
        cloud_pools_valid,
        picked = picked_pools.len(),
        "Selected pool type"
    );

    Ok(MirrorStatus {
        regular_pools,
        cloud_pools,
        regular_pools_valid,
        cloud_pools_valid,
        picked_pools,
    })
}

/// Upload preference score of a mirror; lower is better.
pub fn mirror_weight(mirror: &Mirror, pools_status: &TieringPoolsStatus, weights: &MirrorWeights) -> f64 {
    let total: u32 = mirror
        .spread_pools
        .iter()
        .map(|pool| {
            let mut w = 0;
            if !is_pool_valid(pools_status, &pool.name) {
                w += weights.non_writable_pool;
            }
            if pool.is_cloud() {
                w += weights.cloud_pool;
            } else {
                w += weights.on_premise_pool;
            }
            w
        })
        .sum();

    if total == 0 {
        return 0.0;
    }
    total as f64 / mirror.spread_pools.len().max(1) as f64
}

/// Returns the single lowest-weight mirror of the tier.
///
/// Ties keep the mirror that comes first in the tier.
pub fn select_preferred_mirror<'a>(
    tier: &'a Tier,
    pools_status: &TieringPoolsStatus,
    weights: &MirrorWeights,
) -> PlacementResult<&'a Mirror> {
    let mut best: Option<(&Mirror, f64)> = None;
    for mirror in &tier.mirrors {
        let weight = mirror_weight(mirror, pools_status, weights);
        if best.map_or(true, |(_, best_weight)| weight < best_weight) {
            best = Some((mirror, weight));
        }
    }

    best.map(|(mirror, _)| mirror)
        .ok_or_else(|| PlacementError::NoMirrors {
            tier: tier.name.clone(),
        })
}
