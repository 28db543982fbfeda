// src/miner/mod.rs
//! Core mining functionality
//!
//! This module contains all components related to the hashing process:
//! - The DUCO-S1 algorithm implementation
//! - Worker threads walking disjoint nonce ranges
//! - The pool that partitions units, races workers and collects results

/// DUCO-S1 algorithm implementation
///
/// SHA-1 over `last_block_hash + username + nonce` with a hex-prefix
/// target, pre-seeded per work unit.
pub mod algorithm;

/// Worker thread implementation
///
/// Contains the worker logic that performs the actual hash computations.
/// Workers own exclusive nonce ranges and poll cooperative cancellation.
pub mod worker;

/// Worker pool implementation
///
/// Handles nonce-space partitioning, fan-out of work units to workers,
/// first-solution-wins collection and pool shutdown.
pub mod pool;

// Re-export main components for cleaner imports
pub use self::algorithm::DucoS1;
pub use self::pool::{DispatchOutcome, WorkerPool, partition_nonce_space};
pub use self::worker::{HashWorker, WorkerOutcome};
