//! Read-only client and admin views of parts, chunks, fragments and blocks.
//!
//! Admin views add node placement details and a chunk health label computed by
//! re-running the evaluator in rebuild mode.

use serde::{Deserialize, Serialize};

use crate::chunk_status::ChunkStatusEvaluator;
use crate::error::PlacementResult;
use crate::types::{Block, Chunk, Digest, Fragment, Layer, Part, TieringPolicy, TieringPoolsStatus};

/// Wire-safe descriptor of a block, enough to fetch it from its node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMd {
    /// Block identifier.
    pub id: String,
    /// Stored size in bytes.
    pub size: u64,
    /// Digest algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_type: Option<String>,
    /// Base64 digest value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_b64: Option<String>,
    /// RPC address of the owning node.
    pub address: String,
    /// Owning node identifier.
    pub node: String,
}

/// Placement details of a block, admin views only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAdminInfo {
    /// Pool the block lives on.
    pub pool_name: String,
    /// Name of the owning node.
    pub node_name: String,
    /// IP of the owning node.
    pub node_ip: String,
    /// Owning node fronts a cloud pool.
    pub in_cloud_pool: bool,
    /// Owning node is connected.
    pub online: bool,
}

/// Block view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Wire descriptor.
    pub block_md: BlockMd,
    /// Admin details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adminfo: Option<BlockAdminInfo>,
}

/// Fragment view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragInfo {
    /// Layer of the fragment.
    pub layer: Layer,
    /// LRC group index.
    pub layer_n: u32,
    /// Index within the layer.
    pub frag: u32,
    /// Fragment size in bytes.
    pub size: u64,
    /// Digest algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_type: Option<String>,
    /// Base64 digest value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_b64: Option<String>,
    /// Blocks of the fragment.
    pub blocks: Vec<BlockInfo>,
}

/// Health label shown on admin chunk views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkHealth {
    /// Some fragment cannot be read.
    Unavailable,
    /// Readable, but replicas are still being built.
    Building,
    /// Readable and fully replicated.
    Available,
}

impl ChunkHealth {
    /// Label as shown to users.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkHealth::Unavailable => "unavailable",
            ChunkHealth::Building => "building",
            ChunkHealth::Available => "available",
        }
    }
}

impl std::fmt::Display for ChunkHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admin details of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkAdminInfo {
    /// Current health.
    pub health: ChunkHealth,
}

/// Chunk view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// Chunk size in bytes.
    pub size: u64,
    /// Digest algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_type: Option<String>,
    /// Base64 digest value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_b64: Option<String>,
    /// Compression algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress_type: Option<String>,
    /// Size after compression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress_size: Option<u64>,
    /// Cipher algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher_type: Option<String>,
    /// Base64 cipher key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher_key_b64: Option<String>,
    /// Base64 cipher IV.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher_iv_b64: Option<String>,
    /// Base64 cipher auth tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher_auth_tag_b64: Option<String>,
    /// Number of data fragments.
    pub data_frags: u32,
    /// Number of LRC fragments.
    pub lrc_frags: u32,
    /// Fragments of the chunk.
    pub frags: Vec<FragInfo>,
    /// Admin details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adminfo: Option<ChunkAdminInfo>,
}

/// Part view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInfo {
    /// First byte offset within the object.
    pub start: u64,
    /// End offset (exclusive) within the object.
    pub end: u64,
    /// Sequence number of the part.
    pub part_sequence_number: u32,
    /// Multipart upload part number.
    pub upload_part_number: u32,
    /// Offset of the part's bytes within the chunk.
    pub chunk_offset: u64,
    /// Chunk holding the bytes.
    pub chunk: ChunkInfo,
}

/// What an admin view needs to compute chunk health.
#[derive(Debug, Clone, Copy)]
pub struct AdminContext<'a> {
    /// Evaluator used to compute health.
    pub evaluator: &'a ChunkStatusEvaluator,
    /// Tiering policy of the chunk's bucket.
    pub tiering: &'a TieringPolicy,
    /// Current pool validity.
    pub pools_status: &'a TieringPoolsStatus,
}

fn split_digest(digest: &Option<Digest>) -> (Option<String>, Option<String>) {
    match digest {
        Some(d) => (Some(d.digest_type.clone()), Some(d.digest_b64.clone())),
        None => (None, None),
    }
}

/// Wire descriptor of `block`.
pub fn block_md(block: &Block) -> BlockMd {
    let (digest_type, digest_b64) = split_digest(&block.digest);
    BlockMd {
        id: block.id.to_string(),
        size: block.size,
        digest_type,
        digest_b64,
        address: block.node.rpc_address.clone(),
        node: block.node.id.to_string(),
    }
}

/// Block view; `admin` adds node placement details.
pub fn block_info(block: &Block, admin: bool) -> BlockInfo {
    let adminfo = admin.then(|| BlockAdminInfo {
        pool_name: block.node.pool.clone(),
        node_name: block.node.name.clone(),
        node_ip: block.node.ip.clone(),
        in_cloud_pool: block.node.is_cloud_node,
        online: block.node.online,
    });
    BlockInfo {
        block_md: block_md(block),
        adminfo,
    }
}

/// Fragment view with its blocks.
pub fn frag_info(frag: &Fragment, admin: bool) -> FragInfo {
    let (digest_type, digest_b64) = split_digest(&frag.digest);
    FragInfo {
        layer: frag.layer,
        layer_n: frag.layer_n,
        frag: frag.frag,
        size: frag.size,
        digest_type,
        digest_b64,
        blocks: frag.blocks.iter().map(|b| block_info(b, admin)).collect(),
    }
}

/// Health label derived from a rebuild-mode evaluation.
pub fn chunk_health(chunk: &Chunk, ctx: &AdminContext<'_>) -> PlacementResult<ChunkHealth> {
    let status = ctx
        .evaluator
        .evaluate(chunk, ctx.tiering, false, ctx.pools_status)?;
    Ok(if !status.accessible {
        ChunkHealth::Unavailable
    } else if !status.allocations.is_empty() {
        ChunkHealth::Building
    } else {
        ChunkHealth::Available
    })
}

/// Chunk view. Passing an admin context adds block details and health.
pub fn chunk_info(chunk: &Chunk, admin: Option<&AdminContext<'_>>) -> PlacementResult<ChunkInfo> {
    let (digest_type, digest_b64) = split_digest(&chunk.digest);
    let adminfo = match admin {
        Some(ctx) => Some(ChunkAdminInfo {
            health: chunk_health(chunk, ctx)?,
        }),
        None => None,
    };

    Ok(ChunkInfo {
        size: chunk.size,
        digest_type,
        digest_b64,
        compress_type: chunk.compression.as_ref().map(|c| c.compress_type.clone()),
        compress_size: chunk.compression.as_ref().map(|c| c.compress_size),
        cipher_type: chunk.cipher.as_ref().map(|c| c.cipher_type.clone()),
        cipher_key_b64: chunk.cipher.as_ref().and_then(|c| c.cipher_key_b64.clone()),
        cipher_iv_b64: chunk.cipher.as_ref().and_then(|c| c.cipher_iv_b64.clone()),
        cipher_auth_tag_b64: chunk.cipher.as_ref().and_then(|c| c.cipher_auth_tag_b64.clone()),
        data_frags: chunk.data_frags,
        lrc_frags: chunk.lrc_frags,
        frags: chunk
            .frags
            .iter()
            .map(|f| frag_info(f, admin.is_some()))
            .collect(),
        adminfo,
    })
}

/// Part view with the chunk it points at.
pub fn part_info(part: &Part, chunk: &Chunk, admin: Option<&AdminContext<'_>>) -> PlacementResult<PartInfo> {
    Ok(PartInfo {
        start: part.start,
        end: part.end,
        part_sequence_number: part.part_sequence_number,
        upload_part_number: part.upload_part_number,
        chunk_offset: part.chunk_offset,
        chunk: chunk_info(chunk, admin)?,
    })
}
