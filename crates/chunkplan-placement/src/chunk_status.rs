//! Chunk status evaluation: the allocations and deletions that move one chunk
//! toward its tier's target placement.
//!
//! The evaluator is a pure function of its inputs apart from the reference
//! pool pick, which goes through an injectable [`PoolPicker`]. Running it twice
//! on the same snapshot with a deterministic picker yields the same decisions.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::block_health::pools_by_name;
use crate::config::PlacementConfig;
use crate::error::{PlacementError, PlacementResult};
use crate::mirror_select::{select_pool_type, select_preferred_mirror, PoolPicker, RandomPoolPicker};
use crate::spill::{resolve_blocks_group, BlocksGroup, PlacementWeights};
use crate::types::{Allocation, Block, BlockId, Chunk, FragKey, Fragment, Mirror, Tier, TieringPolicy, TieringPoolsStatus};

/// Decisions for one chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkStatus {
    /// New blocks to write, required replicas before special ones per fragment.
    pub allocations: Vec<Allocation>,
    /// Blocks to delete.
    pub deletions: Vec<Block>,
    /// Every fragment has a readable block and no data fragment is missing.
    pub accessible: bool,
    /// Data fragments the chunk lacks.
    pub missing_frags: Vec<FragKey>,
}

impl ChunkStatus {
    /// Ids of the blocks scheduled for deletion.
    pub fn deletion_ids(&self) -> Vec<&BlockId> {
        self.deletions.iter().map(|b| &b.id).collect()
    }

    /// Number of allocations tagged as special replicas.
    pub fn special_allocations(&self) -> usize {
        self.allocations.iter().filter(|a| a.special_replica).count()
    }
}

/// Data fragments `D0..D{data_fragments}` absent from the chunk.
///
/// Parity and LRC layers are not required.
pub fn get_missing_frags(chunk: &Chunk, tier: &Tier) -> Vec<FragKey> {
    let present: HashSet<FragKey> = chunk.frags.iter().map(Fragment::key).collect();
    (0..tier.data_fragments)
        .map(FragKey::data)
        .filter(|key| !present.contains(key))
        .collect()
}

/// Evaluates chunks against a single-tier policy.
#[derive(Clone)]
pub struct ChunkStatusEvaluator {
    config: PlacementConfig,
    picker: Arc<dyn PoolPicker>,
}

impl std::fmt::Debug for ChunkStatusEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStatusEvaluator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for ChunkStatusEvaluator {
    fn default() -> Self {
        Self::new(PlacementConfig::default())
    }
}

impl ChunkStatusEvaluator {
    /// Evaluator picking reference pools at random.
    pub fn new(config: PlacementConfig) -> Self {
        Self::with_picker(config, Arc::new(RandomPoolPicker))
    }

    /// Evaluator with an explicit pool choice function.
    pub fn with_picker(config: PlacementConfig, picker: Arc<dyn PoolPicker>) -> Self {
        Self { config, picker }
    }

    /// Configuration in use.
    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    /// Replica weight a fragment of `chunk` should converge to.
    pub fn max_replicas(&self, chunk: &Chunk, tier: &Tier) -> u32 {
        if chunk.is_special {
            tier.replicas.saturating_mul(self.config.special_replica_multiplier)
        } else {
            tier.replicas
        }
    }

    /// Computes allocations, deletions and accessibility for `chunk`.
    ///
    /// `for_upload` restricts evaluation to the single preferred mirror so an
    /// upload never waits on cloud pools. Blocks on the other mirrors are left
    /// alone; only blocks on pools outside every mirror of the tier are
    /// deleted as orphans.
    ///
    /// A chunk is accessible only if every participating mirror can read every
    /// fragment, so a mirror that holds no blocks yet makes the chunk
    /// inaccessible until it is built.
    ///
    /// Errors only on misconfiguration: a policy without exactly one tier, a
    /// tier without mirrors, or a mirror without pools.
    pub fn evaluate(
        &self,
        chunk: &Chunk,
        tiering: &TieringPolicy,
        for_upload: bool,
        pools_status: &TieringPoolsStatus,
    ) -> PlacementResult<ChunkStatus> {
        let tier = tiering.single_tier()?;
        if tier.mirrors.is_empty() {
            return Err(PlacementError::NoMirrors {
                tier: tier.name.clone(),
            });
        }

        let participating: Vec<&Mirror> = if for_upload {
            vec![select_preferred_mirror(tier, pools_status, &self.config.mirror_weights)?]
        } else {
            tier.mirrors.iter().collect()
        };

        let missing_frags = get_missing_frags(chunk, tier);
        let placeholders: Vec<Fragment> = missing_frags.iter().copied().map(Fragment::empty).collect();
        let frags: Vec<&Fragment> = chunk.frags.iter().chain(placeholders.iter()).collect();

        let weights = PlacementWeights::for_tier(tier, self.config.on_premise_block_weight);
        let max_replicas = self.max_replicas(chunk, tier);

        let mut status = ChunkStatus {
            accessible: true,
            ..ChunkStatus::default()
        };
        let tier_pool_names: HashSet<&str> = tier
            .mirrors
            .iter()
            .flat_map(|m| m.spread_pools.iter().map(|p| p.name.as_str()))
            .collect();
        let mut unused_blocks: Vec<&Block> = Vec::new();

        for (mirror_idx, mirror) in participating.iter().enumerate() {
            let mirror_status = select_pool_type(&mirror.spread_pools, pools_status, self.picker.as_ref())?;
            let tier_pools = pools_by_name(&mirror.spread_pools);

            for frag in &frags {
                let (used, unused): (Vec<&Block>, Vec<&Block>) = frag
                    .blocks
                    .iter()
                    .partition(|b| tier_pools.contains_key(b.pool()));

                unused_blocks.extend(unused);

                let group = BlocksGroup {
                    frag: frag.key(),
                    blocks: used,
                };
                let decision = resolve_blocks_group(&group, tier, &tier_pools, &mirror_status, weights, max_replicas);

                if decision.num_accessible == 0 {
                    debug!(chunk = %chunk.id, mirror = mirror_idx, frag = %frag.key(), "Fragment has no accessible block");
                    status.accessible = false;
                }
                status.allocations.extend(decision.allocations);
                status.deletions.extend(decision.deletions);
            }
        }

        if !missing_frags.is_empty() {
            let keys: Vec<String> = missing_frags.iter().map(|k| k.to_string()).collect();
            warn!(chunk = %chunk.id, missing = ?keys, "Chunk is missing data fragments");
            status.accessible = false;
        }

        // blocks on pools that left the tier entirely
        let mut seen: HashSet<&BlockId> = HashSet::new();
        for block in unused_blocks {
            if !tier_pool_names.contains(block.pool()) && seen.insert(&block.id) {
                status.deletions.push(block.clone());
            }
        }

        status.missing_frags = missing_frags;

        debug!(
            chunk = %chunk.id,
            for_upload,
            mirrors = participating.len(),
            allocations = status.allocations.len(),
            deletions = status.deletions.len(),
            accessible = status.accessible,
            "Evaluated chunk status"
        );

        Ok(status)
    }

    /// Accessible with nothing left to allocate, in rebuild mode.
    pub fn is_chunk_good(
        &self,
        chunk: &Chunk,
        tiering: &TieringPolicy,
        pools_status: &TieringPoolsStatus,
    ) -> PlacementResult<bool> {
        let status = self.evaluate(chunk, tiering, false, pools_status)?;
        Ok(status.accessible && status.allocations.is_empty())
    }

    /// Accessible, in rebuild mode.
    pub fn is_chunk_accessible(
        &self,
        chunk: &Chunk,
        tiering: &TieringPolicy,
        pools_status: &TieringPoolsStatus,
    ) -> PlacementResult<bool> {
        Ok(self.evaluate(chunk, tiering, false, pools_status)?.accessible)
    }
}
