//! Core placement types: chunks, fragments, blocks, nodes and tier topology.
//!
//! All records are plain snapshots handed in by the caller. Nothing here is
//! mutated by the evaluator.

use core::fmt;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PlacementError, PlacementResult};

/// Identifier of a stored block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub String);

/// Identifier of a storage node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

/// Identifier of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(pub String);

/// Identifier of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub String);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content digest: algorithm name plus base64 value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    /// Digest algorithm, e.g. `sha384`.
    pub digest_type: String,
    /// Base64 encoded digest value.
    pub digest_b64: String,
}

/// Erasure coding layer a fragment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Layer {
    /// Data fragments (`D`).
    Data,
    /// Global parity fragments (`P`).
    Parity,
    /// Local reconstruction code fragments (`L`).
    Lrc,
}

impl Layer {
    /// Single letter used in fragment keys.
    pub fn as_char(&self) -> char {
        match self {
            Layer::Data => 'D',
            Layer::Parity => 'P',
            Layer::Lrc => 'L',
        }
    }
}

/// Unique key of a fragment within its chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FragKey {
    /// Layer of the fragment.
    pub layer: Layer,
    /// Index within the layer.
    pub frag: u32,
}

impl FragKey {
    /// Key of data fragment `frag`.
    pub fn data(frag: u32) -> Self {
        Self {
            layer: Layer::Data,
            frag,
        }
    }
}

impl fmt::Display for FragKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.layer.as_char(), self.frag)
    }
}

/// Snapshot of a storage node as seen by the placement engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier.
    pub id: NodeId,
    /// Human readable node name.
    pub name: String,
    /// Name of the pool this node belongs to.
    pub pool: String,
    /// Node IP address.
    pub ip: String,
    /// RPC address blocks are served from.
    pub rpc_address: String,
    /// Blocks on this node can be read.
    pub readable: bool,
    /// Blocks can be written to this node.
    pub writable: bool,
    /// Node is currently connected.
    pub online: bool,
    /// Node fronts a cloud pool.
    pub is_cloud_node: bool,
    /// Last heartbeat, epoch milliseconds.
    pub heartbeat: u64,
}

/// One physical copy of a fragment on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block identifier.
    pub id: BlockId,
    /// Stored size in bytes.
    pub size: u64,
    /// Digest of the stored bytes.
    pub digest: Option<Digest>,
    /// Snapshot of the node holding the block.
    pub node: Node,
    /// Creation time, epoch milliseconds.
    pub created_at: u64,
}

impl Block {
    /// Pool the block lives on, derived from its node.
    pub fn pool(&self) -> &str {
        &self.node.pool
    }

    /// True if the block lives on a cloud node.
    pub fn is_cloud(&self) -> bool {
        self.node.is_cloud_node
    }
}

/// One data or parity slice of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Layer of the fragment.
    pub layer: Layer,
    /// LRC group index, zero for the data and parity layers.
    pub layer_n: u32,
    /// Index within the layer.
    pub frag: u32,
    /// Fragment size in bytes.
    pub size: u64,
    /// Digest of the fragment bytes.
    pub digest: Option<Digest>,
    /// Blocks holding this fragment.
    pub blocks: Vec<Block>,
}

impl Fragment {
    /// Fragment with no blocks yet.
    pub fn empty(key: FragKey) -> Self {
        Self {
            layer: key.layer,
            layer_n: 0,
            frag: key.frag,
            size: 0,
            digest: None,
            blocks: Vec::new(),
        }
    }

    /// Key of the fragment.
    pub fn key(&self) -> FragKey {
        FragKey {
            layer: self.layer,
            frag: self.frag,
        }
    }
}

/// Compression applied to the chunk payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionInfo {
    /// Compression algorithm.
    pub compress_type: String,
    /// Size after compression.
    pub compress_size: u64,
}

/// Cipher applied to the chunk payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherInfo {
    /// Cipher algorithm.
    pub cipher_type: String,
    /// Base64 key.
    pub cipher_key_b64: Option<String>,
    /// Base64 IV.
    pub cipher_iv_b64: Option<String>,
    /// Base64 authentication tag.
    pub cipher_auth_tag_b64: Option<String>,
}

/// Content-addressed unit of storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk identifier.
    pub id: ChunkId,
    /// Chunk size in bytes.
    pub size: u64,
    /// Digest of the chunk payload.
    pub digest: Option<Digest>,
    /// Compression metadata, if compressed.
    pub compression: Option<CompressionInfo>,
    /// Cipher metadata, if encrypted.
    pub cipher: Option<CipherInfo>,
    /// Number of data fragments the chunk was coded with.
    pub data_frags: u32,
    /// Number of LRC fragments the chunk was coded with.
    pub lrc_frags: u32,
    /// Chunk backs a boundary part of streamable content.
    #[serde(default)]
    pub is_special: bool,
    /// Fragments of the chunk.
    pub frags: Vec<Fragment>,
}

impl Chunk {
    /// Derived copy carrying the given special flag.
    pub fn with_special(&self, is_special: bool) -> Self {
        Self {
            is_special,
            ..self.clone()
        }
    }

    /// Looks up a fragment by key.
    pub fn frag(&self, key: FragKey) -> Option<&Fragment> {
        self.frags.iter().find(|f| f.key() == key)
    }

    /// Iterates all blocks across all fragments.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.frags.iter().flat_map(|f| f.blocks.iter())
    }
}

/// Cloud target behind a cloud pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudPoolInfo {
    /// Cloud endpoint URL.
    pub endpoint: String,
    /// Bucket on the cloud endpoint.
    pub target_bucket: String,
}

/// Named storage resource group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Pool name, unique per system.
    pub name: String,
    /// Set when the pool is backed by a cloud target.
    pub cloud_pool_info: Option<CloudPoolInfo>,
}

impl Pool {
    /// On-premise pool.
    pub fn on_premise(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cloud_pool_info: None,
        }
    }

    /// Cloud pool.
    pub fn cloud(name: impl Into<String>, info: CloudPoolInfo) -> Self {
        Self {
            name: name.into(),
            cloud_pool_info: Some(info),
        }
    }

    /// True if the pool is backed by a cloud target.
    pub fn is_cloud(&self) -> bool {
        self.cloud_pool_info.is_some()
    }
}

/// Set of interchangeable pools providing one replica slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mirror {
    /// Pools blocks may be spread across.
    pub spread_pools: Vec<Pool>,
}

/// Placement policy unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Tier name.
    pub name: String,
    /// Mirrors of the tier.
    pub mirrors: Vec<Mirror>,
    /// Target on-premise replica count.
    pub replicas: u32,
    /// Number of data fragments every chunk must carry.
    pub data_fragments: u32,
}

/// Ordered list of tiers applied to a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieringPolicy {
    /// Policy name.
    pub name: String,
    /// Tiers, highest priority first.
    pub tiers: Vec<Tier>,
}

impl TieringPolicy {
    /// The one tier of a single-tier policy.
    pub fn single_tier(&self) -> PlacementResult<&Tier> {
        match self.tiers.as_slice() {
            [tier] => Ok(tier),
            tiers => Err(PlacementError::MultiTierUnsupported { tiers: tiers.len() }),
        }
    }
}

/// Allocation validity of one pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// New blocks may be allocated on the pool.
    pub valid_for_allocation: bool,
}

/// Pool name to validity, refreshed by the caller before every evaluation.
pub type TieringPoolsStatus = HashMap<String, PoolStatus>;

/// True if `pool` has a status entry marking it valid for allocation.
pub fn is_pool_valid(status: &TieringPoolsStatus, pool: &str) -> bool {
    status
        .get(pool)
        .map(|s| s.valid_for_allocation)
        .unwrap_or(false)
}

/// Object metadata needed by the special-content classifier and range helpers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMd {
    /// Object identifier.
    pub id: ObjectId,
    /// Object size in bytes.
    pub size: u64,
    /// Object content type.
    pub content_type: String,
}

/// Byte range of an object stored in one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// Owning object.
    pub obj: ObjectId,
    /// Chunk holding the bytes.
    pub chunk: ChunkId,
    /// First byte offset within the object.
    pub start: u64,
    /// End offset (exclusive) within the object.
    pub end: u64,
    /// Sequence number of the part within the object.
    pub part_sequence_number: u32,
    /// Multipart upload part number, zero for simple uploads.
    pub upload_part_number: u32,
    /// Offset of the part's bytes within the chunk.
    pub chunk_offset: u64,
    /// Part was deleted.
    #[serde(default)]
    pub deleted: bool,
}

/// A new block the caller should write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Candidate pools for the new block.
    pub pools: Vec<Pool>,
    /// Fragment the block will hold.
    pub frag: FragKey,
    /// Opportunistic replica beyond the tier minimum.
    pub special_replica: bool,
}
