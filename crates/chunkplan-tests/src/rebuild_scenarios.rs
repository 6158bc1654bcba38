//! Rebuild scenarios - executes evaluator decisions against a simulated cluster
//!
//! Each round refreshes node snapshots, evaluates the chunk, writes the
//! allocated blocks and removes the deleted ones. A scenario converges once an
//! evaluation asks for nothing.

use std::collections::HashSet;

use chunkplan_placement::{Block, BlockId, Chunk, ChunkStatus, ChunkStatusEvaluator, PlacementResult, TieringPolicy};
use tracing::debug;

use crate::harness::{block, Topology};

#[derive(Debug, Clone)]
pub struct RebuildReport {
    pub rounds: u32,
    pub converged: bool,
    pub blocks_written: u64,
    pub blocks_deleted: u64,
    pub skipped_allocations: u64,
    pub final_status: ChunkStatus,
    pub chunk: Chunk,
}

pub struct RebuildSimulator {
    pub topology: Topology,
    pub tiering: TieringPolicy,
    evaluator: ChunkStatusEvaluator,
    clock: u64,
    next_block: u64,
}

impl RebuildSimulator {
    pub fn new(topology: Topology, tiering: TieringPolicy, evaluator: ChunkStatusEvaluator) -> Self {
        Self {
            topology,
            tiering,
            evaluator,
            clock: 1_000,
            next_block: 0,
        }
    }

    /// Replaces every block's node snapshot with the current node state.
    pub fn refresh(&self, chunk: &Chunk) -> Chunk {
        let mut chunk = chunk.clone();
        for frag in &mut chunk.frags {
            for b in &mut frag.blocks {
                if let Some(node) = self.topology.nodes().iter().find(|n| n.id == b.node.id) {
                    b.node = node.clone();
                }
            }
        }
        chunk
    }

    pub fn evaluate(&self, chunk: &Chunk) -> PlacementResult<ChunkStatus> {
        self.evaluator
            .evaluate(chunk, &self.tiering, false, self.topology.pools_status())
    }

    /// Writes allocations first, then removes deletions.
    ///
    /// Returns the new chunk and the number of allocations that found no node.
    pub fn apply(&mut self, chunk: &Chunk, status: &ChunkStatus) -> (Chunk, u64) {
        let mut chunk = chunk.clone();
        let mut skipped = 0;

        for alloc in &status.allocations {
            let holders: HashSet<String> = chunk
                .frag(alloc.frag)
                .map(|f| f.blocks.iter().map(|b| b.node.id.0.clone()).collect())
                .unwrap_or_default();

            let target = alloc
                .pools
                .iter()
                .filter(|p| chunkplan_placement::is_pool_valid(self.topology.pools_status(), &p.name))
                .flat_map(|p| self.topology.nodes_in_pool(&p.name))
                .filter(|n| n.readable && n.writable)
                .min_by_key(|n| holders.contains(&n.id.0))
                .cloned();

            let Some(node) = target else {
                skipped += 1;
                continue;
            };

            self.next_block += 1;
            self.clock += 1;
            let new_block = block(&format!("built-{}", self.next_block), node, self.clock);
            match chunk.frags.iter_mut().find(|f| f.key() == alloc.frag) {
                Some(frag) => frag.blocks.push(new_block),
                None => chunk.frags.push(chunkplan_placement::Fragment {
                    blocks: vec![new_block],
                    ..chunkplan_placement::Fragment::empty(alloc.frag)
                }),
            }
        }

        let doomed: HashSet<&BlockId> = status.deletions.iter().map(|b| &b.id).collect();
        for frag in &mut chunk.frags {
            frag.blocks.retain(|b: &Block| !doomed.contains(&b.id));
        }
        chunk.frags.sort_by_key(|f| f.key());

        (chunk, skipped)
    }

    /// Runs rebuild rounds until nothing is left to do or `max_rounds` is hit.
    pub fn converge(&mut self, chunk: &Chunk, max_rounds: u32) -> PlacementResult<RebuildReport> {
        let mut current = self.refresh(chunk);
        let mut report = RebuildReport {
            rounds: 0,
            converged: false,
            blocks_written: 0,
            blocks_deleted: 0,
            skipped_allocations: 0,
            final_status: ChunkStatus::default(),
            chunk: current.clone(),
        };

        while report.rounds < max_rounds {
            let status = self.evaluate(&current)?;
            if status.allocations.is_empty() && status.deletions.is_empty() {
                report.converged = true;
                report.final_status = status;
                break;
            }

            report.rounds += 1;
            let (next, skipped) = self.apply(&current, &status);
            report.blocks_written += (status.allocations.len() as u64) - skipped;
            report.blocks_deleted += status.deletions.len() as u64;
            report.skipped_allocations += skipped;
            debug!(
                round = report.rounds,
                allocations = status.allocations.len(),
                deletions = status.deletions.len(),
                skipped,
                "Applied rebuild round"
            );
            report.final_status = status;
            current = self.refresh(&next);
        }

        report.chunk = current;
        Ok(report)
    }
}
