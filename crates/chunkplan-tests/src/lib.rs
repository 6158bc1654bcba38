//! ChunkPlan Test & Validation Infrastructure
//!
//! This crate provides cross-module testing utilities for the ChunkPlan placement engine.
//! It includes topology fixtures, concurrency and determinism checks, and a rebuild
//! simulator that executes evaluator decisions until a chunk converges.

pub mod harness;
pub mod rebuild_scenarios;

pub use concurrency_tests::{evaluate_all, ConcurrentEvaluationTest, ConcurrentTestResult, EvaluationSnapshot};
pub use harness::{block, chunk, data_frag, init_tracing, TestEnv, Topology, TopologyBuilder};
pub use rebuild_scenarios::{RebuildReport, RebuildSimulator};
