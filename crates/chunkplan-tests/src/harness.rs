//! Test Harness - topology fixtures and test environment setup

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Once;

use chunkplan_placement::{
    Block, BlockId, Chunk, ChunkId, CloudPoolInfo, FragKey, Fragment, Mirror, Node, NodeId, PlacementConfig, Pool, PoolStatus, Tier, TieringPolicy, TieringPoolsStatus,
};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a fmt subscriber once per process, filtered by `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug)]
pub struct TestEnv {
    temp_dir: TempDir,
    test_name: String,
}

impl TestEnv {
    pub fn new(test_name: &str) -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        Self {
            temp_dir,
            test_name: test_name.to_string(),
        }
    }

    pub fn tempdir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Writes `config` as JSON into the temp dir and returns its path.
    pub fn write_config(&self, config: &PlacementConfig) -> anyhow::Result<PathBuf> {
        let path = self.temp_dir.path().join(format!("{}.json", self.test_name));
        std::fs::write(&path, serde_json::to_vec_pretty(config)?)?;
        Ok(path)
    }
}

/// Pools, nodes and pool validity of a test system.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pools: BTreeMap<String, Pool>,
    nodes: Vec<Node>,
    pools_status: TieringPoolsStatus,
}

impl Topology {
    pub fn pool(&self, name: &str) -> Option<&Pool> {
        self.pools.get(name)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.name == name)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn nodes_in_pool(&self, pool: &str) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.pool == pool).collect()
    }

    pub fn pools_status(&self) -> &TieringPoolsStatus {
        &self.pools_status
    }

    pub fn set_pool_valid(&mut self, pool: &str, valid: bool) {
        self.pools_status.insert(
            pool.to_string(),
            PoolStatus {
                valid_for_allocation: valid,
            },
        );
    }

    /// Marks a node down: unreadable, unwritable and offline.
    pub fn fail_node(&mut self, name: &str) {
        if let Some(node) = self.node_mut(name) {
            node.readable = false;
            node.writable = false;
            node.online = false;
        }
    }

    /// Single-tier policy with one mirror per entry of `mirrors`.
    pub fn policy(&self, mirrors: &[&[&str]], replicas: u32, data_fragments: u32) -> TieringPolicy {
        let mirrors = mirrors
            .iter()
            .map(|names| Mirror {
                spread_pools: names.iter().filter_map(|n| self.pool(n).cloned()).collect(),
            })
            .collect();
        TieringPolicy {
            name: "test-policy".to_string(),
            tiers: vec![Tier {
                name: "test-tier".to_string(),
                mirrors,
                replicas,
                data_fragments,
            }],
        }
    }

    /// Block with id `id` on node `node_name`.
    pub fn block_on(&self, node_name: &str, id: &str, created_at: u64) -> Block {
        let node = self
            .node(node_name)
            .cloned()
            .unwrap_or_else(|| panic!("unknown node {}", node_name));
        block(id, node, created_at)
    }
}

pub struct TopologyBuilder {
    topology: Topology,
}

impl TopologyBuilder {
    pub fn new() -> Self {
        Self {
            topology: Topology::default(),
        }
    }

    /// Adds an on-premise pool with `nodes` healthy nodes named `{pool}-n{i}`.
    pub fn on_premise_pool(mut self, name: &str, nodes: usize) -> Self {
        self.add_pool(Pool::on_premise(name), nodes, false);
        self
    }

    /// Adds a cloud pool fronted by one cloud node.
    pub fn cloud_pool(mut self, name: &str) -> Self {
        let pool = Pool::cloud(
            name,
            CloudPoolInfo {
                endpoint: "https://s3.test.local".to_string(),
                target_bucket: format!("{}-bucket", name),
            },
        );
        self.add_pool(pool, 1, true);
        self
    }

    fn add_pool(&mut self, pool: Pool, nodes: usize, cloud: bool) {
        for i in 0..nodes {
            let name = format!("{}-n{}", pool.name, i);
            self.topology.nodes.push(Node {
                id: NodeId(format!("id-{}", name)),
                name: name.clone(),
                pool: pool.name.clone(),
                ip: format!("10.1.{}.{}", self.topology.pools.len(), i + 1),
                rpc_address: format!("tcp://{}:9999", name),
                readable: true,
                writable: true,
                online: true,
                is_cloud_node: cloud,
                heartbeat: 1_000,
            });
        }
        self.topology.set_pool_valid(&pool.name, true);
        self.topology.pools.insert(pool.name.clone(), pool);
    }

    pub fn build(self) -> Topology {
        self.topology
    }
}

impl Default for TopologyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn block(id: &str, node: Node, created_at: u64) -> Block {
    Block {
        id: BlockId(id.to_string()),
        size: 4096,
        digest: None,
        node,
        created_at,
    }
}

pub fn data_frag(frag: u32, blocks: Vec<Block>) -> Fragment {
    Fragment {
        size: 4096,
        blocks,
        ..Fragment::empty(FragKey::data(frag))
    }
}

pub fn chunk(id: &str, frags: Vec<Fragment>) -> Chunk {
    Chunk {
        id: ChunkId(id.to_string()),
        size: 4096 * frags.len().max(1) as u64,
        digest: None,
        compression: None,
        cipher: None,
        data_frags: frags.len() as u32,
        lrc_frags: 0,
        is_special: false,
        frags,
    }
}
