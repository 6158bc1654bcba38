//! Block health predicates and block ordering.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::types::{Block, Digest, FragKey, Fragment, Layer, Pool};

/// Pools of one mirror keyed by pool name.
pub type TierPools<'a> = HashMap<&'a str, &'a Pool>;

/// Indexes a mirror's spread pools by name.
pub fn pools_by_name(pools: &[Pool]) -> TierPools<'_> {
    pools.iter().map(|p| (p.name.as_str(), p)).collect()
}

/// A block can serve reads iff its node is readable.
pub fn is_block_accessible(block: &Block) -> bool {
    block.node.readable
}

/// A block counts toward the tier iff it is accessible, its node still takes
/// writes, and its pool is still part of the tier.
pub fn is_block_good(block: &Block, tier_pools: &TierPools<'_>) -> bool {
    if !is_block_accessible(block) {
        return false;
    }

    // offline, full, or otherwise not taking writes
    if !block.node.writable {
        return false;
    }

    // pool left the policy, keep only as a read source until rebuilt
    tier_pools.contains_key(block.pool())
}

/// Read preference order: readable nodes first, then most recent heartbeat.
///
/// Ties fall back to block id so every caller sees the same order.
pub fn block_access_order(a: &Block, b: &Block) -> Ordering {
    b.node
        .readable
        .cmp(&a.node.readable)
        .then_with(|| b.node.heartbeat.cmp(&a.node.heartbeat))
        .then_with(|| a.id.cmp(&b.id))
}

/// Block record as persisted by the metadata store, carrying its fragment fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlock {
    /// The block itself.
    pub block: Block,
    /// Layer of the owning fragment.
    pub layer: Layer,
    /// LRC group index of the owning fragment.
    pub layer_n: u32,
    /// Index of the owning fragment.
    pub frag: u32,
    /// Size of the owning fragment.
    pub frag_size: u64,
    /// Digest of the owning fragment.
    pub frag_digest: Option<Digest>,
}

impl StoredBlock {
    /// Key of the owning fragment.
    pub fn frag_key(&self) -> FragKey {
        FragKey {
            layer: self.layer,
            frag: self.frag,
        }
    }
}

/// Rebuilds a chunk's fragments from its stored blocks.
///
/// Fragment fields are taken from the first block of each group. Fragments
/// come back ordered by key and blocks in [`block_access_order`].
pub fn group_blocks_into_frags(blocks: Vec<StoredBlock>) -> Vec<Fragment> {
    let mut groups: BTreeMap<FragKey, Vec<StoredBlock>> = BTreeMap::new();
    for stored in blocks {
        groups.entry(stored.frag_key()).or_default().push(stored);
    }

    groups
        .into_values()
        .filter_map(|group| {
            let first = group.first()?;
            let (layer, layer_n, frag, size) =
                (first.layer, first.layer_n, first.frag, first.frag_size);
            let digest = first.frag_digest.clone();

            let mut blocks: Vec<Block> = group.into_iter().map(|s| s.block).collect();
            blocks.sort_by(block_access_order);
            Some(Fragment {
                layer,
                layer_n,
                frag,
                size,
                digest,
                blocks,
            })
        })
        .collect()
}
