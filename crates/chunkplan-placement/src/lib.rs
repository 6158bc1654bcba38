#![warn(missing_docs)]

//! ChunkPlan placement subsystem: block health, replica spill resolution and chunk status evaluation
//!
//! This crate decides, for one chunk at a time, which blocks are healthy,
//! which must be deleted and where new blocks must be allocated so every
//! fragment converges to its tier's replica target. It performs no I/O on
//! storage nodes: callers execute the returned allocations and deletions.

pub mod block_health;
pub mod chunk_status;
pub mod config;
pub mod error;
pub mod info;
pub mod mirror_select;
pub mod range;
pub mod special;
pub mod spill;
pub mod types;

pub use block_health::{block_access_order, group_blocks_into_frags, is_block_accessible, is_block_good, pools_by_name, StoredBlock, TierPools};
pub use chunk_status::{get_missing_frags, ChunkStatus, ChunkStatusEvaluator};
pub use config::{MirrorWeights, PlacementConfig};
pub use error::{PlacementError, PlacementResult};
pub use info::{block_info, block_md, chunk_health, chunk_info, frag_info, part_info, AdminContext, BlockAdminInfo, BlockInfo, BlockMd, ChunkAdminInfo, ChunkHealth, ChunkInfo, FragInfo, PartInfo};
pub use mirror_select::{mirror_weight, select_pool_type, select_preferred_mirror, FixedPoolPicker, MirrorStatus, PoolPicker, RandomPoolPicker, SeededPoolPicker};
pub use range::{find_consecutive_parts, sanitize_object_range, MemoryPartStore, ObjectRange, PartRangeQuery, PartStore};
pub use special::{SpecialChunks, SpecialContentClassifier};
pub use spill::{expand_allocations, handle_over_spill, handle_under_spill, resolve_blocks_group, BlockPartitions, BlocksGroup, GroupDecision, PlacementWeights, SpillParams, SpillStatus};
pub use types::{
    is_pool_valid, Allocation, Block, BlockId, Chunk, ChunkId, CipherInfo, CloudPoolInfo, CompressionInfo, Digest, FragKey, Fragment, Layer, Mirror, Node, NodeId, ObjectId, ObjectMd, Part, Pool, PoolStatus,
    Tier, TieringPolicy, TieringPoolsStatus,
};
