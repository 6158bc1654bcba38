//! Replica spill resolution for one fragment within one mirror.
//!
//! Each block carries a replica weight: one for an on-premise block, a full
//! `tier.replicas` for a cloud block. When the weight of the good blocks is
//! above `max_replicas` the newest surplus blocks are deleted; when it is below,
//! pools are chosen for new blocks.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::block_health::{is_block_accessible, is_block_good, TierPools};
use crate::mirror_select::MirrorStatus;
use crate::types::{Allocation, Block, FragKey, Pool, Tier};

/// Replica weight of a block by pool kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementWeights {
    /// Weight of a block on an on-premise node.
    pub on_premise_pool: u32,
    /// Weight of a block on a cloud node.
    pub cloud_pool: u32,
}

impl PlacementWeights {
    /// Weights for `tier`: one cloud replica counts as a full replica set.
    pub fn for_tier(tier: &Tier, on_premise_block_weight: u32) -> Self {
        Self {
            on_premise_pool: on_premise_block_weight,
            cloud_pool: tier.replicas,
        }
    }

    /// Weight contributed by `block`.
    pub fn block_weight(&self, block: &Block) -> u32 {
        if block.is_cloud() {
            self.cloud_pool
        } else {
            self.on_premise_pool
        }
    }
}

/// Blocks of one fragment split by [`is_block_good`].
#[derive(Debug, Clone, Default)]
pub struct BlockPartitions<'a> {
    /// Blocks that count toward the replica weight.
    pub good_blocks: Vec<&'a Block>,
    /// Blocks that must go.
    pub bad_blocks: Vec<&'a Block>,
}

impl<'a> BlockPartitions<'a> {
    /// Splits `blocks` into good and bad, keeping input order.
    pub fn partition(blocks: &[&'a Block], tier_pools: &TierPools<'_>) -> Self {
        let (good_blocks, bad_blocks) = blocks
            .iter()
            .copied()
            .partition(|b| is_block_good(b, tier_pools));
        Self {
            good_blocks,
            bad_blocks,
        }
    }

    /// Sum of the good blocks' weights.
    pub fn current_weight(&self, weights: &PlacementWeights) -> u32 {
        self.good_blocks.iter().map(|b| weights.block_weight(b)).sum()
    }

    fn any_cloud(&self) -> bool {
        self.good_blocks
            .iter()
            .chain(self.bad_blocks.iter())
            .any(|b| b.is_cloud())
    }
}

/// Inputs to a spill decision.
#[derive(Debug, Clone)]
pub struct SpillParams<'a> {
    /// Good/bad split of the fragment's blocks.
    pub partitions: &'a BlockPartitions<'a>,
    /// Allocation view of the mirror.
    pub mirror_status: &'a MirrorStatus,
    /// Block weights of the tier.
    pub weights: PlacementWeights,
    /// Replica weight the fragment should converge to.
    pub max_replicas: u32,
    /// Current replica weight of the good blocks.
    pub current_weight: u32,
}

/// Outcome of a spill decision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpillStatus {
    /// Good blocks to delete.
    pub deletions: Vec<Block>,
    /// Pools new blocks should be allocated on.
    pub allocation_pools: Vec<Pool>,
}

/// Picks surplus good blocks to delete when the weight exceeds `max_replicas`.
///
/// Blocks are ordered by creation time and evicted newest first, so the
/// longest-lived replicas survive. A block is only deleted if the remaining
/// weight still covers `max_replicas`. Cloud blocks weigh `max_replicas` here.
pub fn handle_over_spill(params: &SpillParams<'_>) -> SpillStatus {
    let mut status = SpillStatus::default();

    let mut sorted: Vec<&Block> = params.partitions.good_blocks.clone();
    sorted.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let mut current_weight = params.current_weight;
    for block in sorted.iter().rev() {
        if current_weight <= params.max_replicas {
            break;
        }

        let block_weight = if block.is_cloud() {
            params.max_replicas
        } else {
            params.weights.on_premise_pool
        };

        let covered = params
            .max_replicas
            .checked_add(block_weight)
            .is_some_and(|needed| current_weight >= needed);
        if covered {
            current_weight -= block_weight;
            status.deletions.push((*block).clone());
        }
    }

    status
}

/// Picks pools for new blocks when the weight is below `max_replicas`.
///
/// Blocks only on-premise: allocate on valid on-premise pools, or move to
/// cloud (deleting the good on-premise blocks) when only cloud is valid.
/// Any cloud block present: continue on the mirror's picked pools.
pub fn handle_under_spill(params: &SpillParams<'_>) -> SpillStatus {
    let mut status = SpillStatus::default();
    let ms = params.mirror_status;

    if !params.partitions.any_cloud() {
        if ms.regular_pools_valid {
            status.allocation_pools = ms.regular_pools.clone();
        } else if ms.cloud_pools_valid {
            status.deletions = params
                .partitions
                .good_blocks
                .iter()
                .filter(|b| !b.is_cloud())
                .map(|b| (*b).clone())
                .collect();
            status.allocation_pools = ms.cloud_pools.clone();
        } else {
            warn!(
                regular_pools = ms.regular_pools.len(),
                cloud_pools = ms.cloud_pools.len(),
                "No pool in mirror is valid for allocation"
            );
        }
    } else if !ms.picked_pools.is_empty() {
        status.allocation_pools = ms.picked_pools.clone();
    } else {
        warn!("No picked pools to continue allocation on");
    }

    status
}

/// Expands the chosen pools into allocation entries.
///
/// Minimum required replicas come first, then entries tagged
/// `special_replica` up to `max_replicas`. A cloud-only target gets exactly
/// one entry since one cloud replica covers the tier.
pub fn expand_allocations(
    pools: &[Pool],
    frag: FragKey,
    max_replicas: u32,
    tier_replicas: u32,
    current_weight: u32,
) -> Vec<Allocation> {
    if pools.is_empty() {
        return Vec::new();
    }

    let is_cloud_allocation = pools.iter().all(Pool::is_cloud);
    let num_missing = max_replicas.saturating_sub(current_weight);
    let min_replicas = if is_cloud_allocation {
        1
    } else {
        max_replicas.min(tier_replicas).saturating_sub(current_weight)
    };

    let required = (0..min_replicas).map(|_| Allocation {
        pools: pools.to_vec(),
        frag,
        special_replica: false,
    });

    let extra = if is_cloud_allocation {
        0
    } else {
        num_missing.saturating_sub(min_replicas)
    };
    let special = (0..extra).map(|_| Allocation {
        pools: pools.to_vec(),
        frag,
        special_replica: true,
    });

    required.chain(special).collect()
}

/// Result of resolving one fragment's blocks within one mirror.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupDecision {
    /// New blocks to write, required ones first.
    pub allocations: Vec<Allocation>,
    /// Blocks to delete: bad blocks, then spill deletions.
    pub deletions: Vec<Block>,
    /// Number of readable blocks in the group.
    pub num_accessible: usize,
    /// Replica weight of the good blocks.
    pub current_weight: u32,
}

/// One fragment's blocks that live on the mirror's pools.
#[derive(Debug, Clone)]
pub struct BlocksGroup<'a> {
    /// Fragment the blocks belong to.
    pub frag: FragKey,
    /// Blocks on the mirror's pools.
    pub blocks: Vec<&'a Block>,
}

/// Resolves a fragment's blocks against the target weight.
pub fn resolve_blocks_group(
    group: &BlocksGroup<'_>,
    tier: &Tier,
    tier_pools: &TierPools<'_>,
    mirror_status: &MirrorStatus,
    weights: PlacementWeights,
    max_replicas: u32,
) -> GroupDecision {
    let partitions = BlockPartitions::partition(&group.blocks, tier_pools);
    let num_accessible = group.blocks.iter().filter(|b| is_block_accessible(b)).count();
    let current_weight = partitions.current_weight(&weights);

    let params = SpillParams {
        partitions: &partitions,
        mirror_status,
        weights,
        max_replicas,
        current_weight,
    };

    let spill = if current_weight > max_replicas {
        handle_over_spill(&params)
    } else if current_weight < max_replicas {
        handle_under_spill(&params)
    } else {
        SpillStatus::default()
    };

    let mut deletions: Vec<Block> = partitions.bad_blocks.iter().map(|b| (*b).clone()).collect();
    deletions.extend(spill.deletions);

    let allocations = expand_allocations(
        &spill.allocation_pools,
        group.frag,
        max_replicas,
        tier.replicas,
        current_weight,
    );

    debug!(
        frag = %group.frag,
        current_weight,
        max_replicas,
        good = partitions.good_blocks.len(),
        bad = partitions.bad_blocks.len(),
        allocations = allocations.len(),
        deletions = deletions.len(),
        "Resolved blocks group"
    );

    GroupDecision {
        allocations,
        deletions,
        num_accessible,
        current_weight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_health::pools_by_name;
    use crate::types::{BlockId, CloudPoolInfo, Node, NodeId};

    fn node(pool: &str, cloud: bool, readable: bool, writable: bool) -> Node {
        Node {
            id: NodeId(format!("n-{}", pool)),
            name: format!("n-{}", pool),
            pool: pool.to_string(),
            ip: "10.0.0.2".to_string(),
            rpc_address: "tcp://10.0.0.2:9999".to_string(),
            readable,
            writable,
            online: readable,
            is_cloud_node: cloud,
            heartbeat: 0,
        }
    }

    fn block(id: &str, pool: &str, cloud: bool, created_at: u64) -> Block {
        Block {
            id: BlockId(id.to_string()),
            size: 4096,
            digest: None,
            node: node(pool, cloud, true, true),
            created_at,
        }
    }

    fn cloud_pool(name: &str) -> Pool {
        Pool::cloud(
            name,
            CloudPoolInfo {
                endpoint: "https://s3.example.com".to_string(),
                target_bucket: name.to_string(),
            },
        )
    }

    fn tier(replicas: u32) -> Tier {
        Tier {
            name: "t".to_string(),
            mirrors: vec![],
            replicas,
            data_fragments: 1,
        }
    }

    fn mirror_status(regular_valid: bool, cloud_valid: bool) -> MirrorStatus {
        MirrorStatus {
            regular_pools: vec![Pool::on_premise("local")],
            cloud_pools: vec![cloud_pool("s3")],
            regular_pools_valid: regular_valid,
            cloud_pools_valid: cloud_valid,
            picked_pools: vec![cloud_pool("s3")],
        }
    }

    fn ids(blocks: &[Block]) -> Vec<&str> {
        blocks.iter().map(|b| b.id.0.as_str()).collect()
    }

    #[test]
    fn test_block_weights() {
        let weights = PlacementWeights::for_tier(&tier(3), 1);
        assert_eq!(weights.block_weight(&block("a", "local", false, 0)), 1);
        assert_eq!(weights.block_weight(&block("b", "s3", true, 0)), 3);
    }

    #[test]
    fn test_over_spill_deletes_newest_first() {
        let blocks = vec![
            block("b1", "local", false, 10),
            block("b3", "local", false, 30),
            block("b2", "local", false, 20),
            block("b4", "local", false, 40),
        ];
        let refs: Vec<&Block> = blocks.iter().collect();
        let partitions = BlockPartitions {
            good_blocks: refs,
            bad_blocks: vec![],
        };
        let ms = mirror_status(true, false);
        let params = SpillParams {
            partitions: &partitions,
            mirror_status: &ms,
            weights: PlacementWeights::for_tier(&tier(2), 1),
            max_replicas: 2,
            current_weight: 4,
        };

        let status = handle_over_spill(&params);
        assert_eq!(ids(&status.deletions), vec!["b4", "b3"]);
        assert!(status.allocation_pools.is_empty());
    }

    #[test]
    fn test_over_spill_near_u32_max_keeps_cloud_block() {
        let blocks = vec![block("cloud", "s3", true, 50)];
        let refs: Vec<&Block> = blocks.iter().collect();
        let partitions = BlockPartitions {
            good_blocks: refs,
            bad_blocks: vec![],
        };
        let ms = mirror_status(true, true);
        let params = SpillParams {
            partitions: &partitions,
            mirror_status: &ms,
            weights: PlacementWeights::for_tier(&tier(2), 1),
            max_replicas: u32::MAX - 1,
            current_weight: u32::MAX,
        };

        let status = handle_over_spill(&params);
        assert!(status.deletions.is_empty());
    }

    #[test]
    fn test_over_spill_cloud_block_weighs_max_replicas() {
        let blocks = vec![
            block("cloud", "s3", true, 50),
            block("b1", "local", false, 10),
            block("b2", "local", false, 20),
        ];
        let refs: Vec<&Block> = blocks.iter().collect();
        let partitions = BlockPartitions {
            good_blocks: refs,
            bad_blocks: vec![],
        };
        let ms = mirror_status(true, true);
        let weights = PlacementWeights::for_tier(&tier(2), 1);
        let params = SpillParams {
            partitions: &partitions,
            mirror_status: &ms,
            weights,
            max_replicas: 2,
            current_weight: partitions.current_weight(&weights),
        };

        let status = handle_over_spill(&params);
        assert_eq!(ids(&status.deletions), vec!["cloud"]);
    }

    #[test]
    fn test_under_spill_on_premise_valid() {
        let blocks = vec![block("b1", "local", false, 10)];
        let refs: Vec<&Block> = blocks.iter().collect();
        let partitions = BlockPartitions {
            good_blocks: refs,
            bad_blocks: vec![],
        };
        let ms = mirror_status(true, true);
        let params = SpillParams {
            partitions: &partitions,
            mirror_status: &ms,
            weights: PlacementWeights::for_tier(&tier(3), 1),
            max_replicas: 3,
            current_weight: 1,
        };

        let status = handle_under_spill(&params);
        assert_eq!(status.allocation_pools, vec![Pool::on_premise("local")]);
        assert!(status.deletions.is_empty());
    }

    #[test]
    fn test_under_spill_only_cloud_valid_moves_to_cloud() {
        let blocks = vec![block("b1", "local", false, 10)];
        let refs: Vec<&Block> = blocks.iter().collect();
        let partitions = BlockPartitions {
            good_blocks: refs,
            bad_blocks: vec![],
        };
        let ms = mirror_status(false, true);
        let params = SpillParams {
            partitions: &partitions,
            mirror_status: &ms,
            weights: PlacementWeights::for_tier(&tier(3), 1),
            max_replicas: 3,
            current_weight: 1,
        };

        let status = handle_under_spill(&params);
        assert_eq!(status.allocation_pools, vec![cloud_pool("s3")]);
        assert_eq!(ids(&status.deletions), vec!["b1"]);
    }

    #[test]
    fn test_under_spill_nothing_valid() {
        let partitions = BlockPartitions::default();
        let ms = mirror_status(false, false);
        let params = SpillParams {
            partitions: &partitions,
            mirror_status: &ms,
            weights: PlacementWeights::for_tier(&tier(3), 1),
            max_replicas: 3,
            current_weight: 0,
        };

        let status = handle_under_spill(&params);
        assert!(status.allocation_pools.is_empty());
        assert!(status.deletions.is_empty());
    }

    #[test]
    fn test_under_spill_with_cloud_block_uses_picked_pools() {
        let blocks = vec![block("c1", "s3", true, 10)];
        let refs: Vec<&Block> = blocks.iter().collect();
        let partitions = BlockPartitions {
            good_blocks: refs,
            bad_blocks: vec![],
        };
        let ms = mirror_status(true, true);
        let params = SpillParams {
            partitions: &partitions,
            mirror_status: &ms,
            weights: PlacementWeights::for_tier(&tier(2), 1),
            max_replicas: 4,
            current_weight: 2,
        };

        let status = handle_under_spill(&params);
        assert_eq!(status.allocation_pools, ms.picked_pools);
    }

    #[test]
    fn test_expand_allocations_required_before_special() {
        let pools = vec![Pool::on_premise("local")];
        let allocs = expand_allocations(&pools, FragKey::data(0), 4, 2, 0);
        assert_eq!(allocs.len(), 4);
        let flags: Vec<bool> = allocs.iter().map(|a| a.special_replica).collect();
        assert_eq!(flags, vec![false, false, true, true]);
        assert!(allocs.iter().all(|a| a.frag == FragKey::data(0)));
    }

    #[test]
    fn test_expand_allocations_cloud_single_entry() {
        let pools = vec![cloud_pool("s3")];
        let allocs = expand_allocations(&pools, FragKey::data(1), 4, 2, 1);
        assert_eq!(allocs.len(), 1);
        assert!(!allocs[0].special_replica);
    }

    #[test]
    fn test_expand_allocations_partial() {
        let pools = vec![Pool::on_premise("local")];
        let allocs = expand_allocations(&pools, FragKey::data(0), 3, 3, 2);
        assert_eq!(allocs.len(), 1);
        assert!(!allocs[0].special_replica);
    }

    #[test]
    fn test_expand_allocations_no_pools() {
        assert!(expand_allocations(&[], FragKey::data(0), 3, 3, 0).is_empty());
    }

    #[test]
    fn test_resolve_group_bad_blocks_always_deleted() {
        let mut dead = block("dead", "local", false, 5);
        dead.node.readable = false;
        let blocks = vec![
            dead,
            block("b1", "local", false, 10),
            block("b2", "local", false, 20),
            block("b3", "local", false, 30),
        ];
        let refs: Vec<&Block> = blocks.iter().collect();
        let pools = vec![Pool::on_premise("local")];
        let tier_pools = pools_by_name(&pools);
        let t = tier(2);
        let group = BlocksGroup {
            frag: FragKey::data(0),
            blocks: refs,
        };

        let decision = resolve_blocks_group(
            &group,
            &t,
            &tier_pools,
            &mirror_status(true, false),
            PlacementWeights::for_tier(&t, 1),
            2,
        );

        assert_eq!(ids(&decision.deletions), vec!["dead", "b3"]);
        assert_eq!(decision.num_accessible, 3);
        assert_eq!(decision.current_weight, 3);
        assert!(decision.allocations.is_empty());
    }

    #[test]
    fn test_resolve_group_single_cloud_block_is_enough() {
        let blocks = vec![block("c1", "s3", true, 10)];
        let refs: Vec<&Block> = blocks.iter().collect();
        let pools = vec![cloud_pool("s3")];
        let tier_pools = pools_by_name(&pools);
        let t = tier(3);
        let group = BlocksGroup {
            frag: FragKey::data(0),
            blocks: refs,
        };

        let decision = resolve_blocks_group(
            &group,
            &t,
            &tier_pools,
            &mirror_status(true, true),
            PlacementWeights::for_tier(&t, 1),
            3,
        );

        assert_eq!(decision.current_weight, 3);
        assert!(decision.allocations.is_empty());
        assert!(decision.deletions.is_empty());
        assert_eq!(decision.num_accessible, 1);
    }
}
