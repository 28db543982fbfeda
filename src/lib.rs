//! Duco Miner - multi-core proof-of-work mining engine in Rust
//!
//! This crate provides the mining core behind a thin host shell (GUI,
//! service or CLI) for a Duino-Coin style job protocol:
//! - Parallel SHA-1 (DUCO-S1) search across cores × threads workers
//! - HTTP(S)+JSON job client with bounded retry and backoff
//! - Start/stop session lifecycle with cooperative cancellation
//! - Progress reporting to the host through an injected event sink
//!
//! The host boundary is [`host`]: fire-and-forget `start_mining` and
//! `stop_mining`, a synchronous `get_debug_info`, and the reserved
//! `"STOPPED"` terminal event.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Miner core implementation: algorithm, workers and the worker pool
pub mod miner;

/// Network communication with the job server
pub mod network;

/// Session lifecycle: state machine, events, host-facing sink
pub mod session;

/// Statistics collection and reporting functionality
pub mod stats;

/// Utility functions, error handling and cancellation
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Process-wide host boundary (start/stop/debug-info)
pub mod host;

/// Shared type definitions
pub mod types;

// Core exports
pub use config::MinerConfig;
pub use miner::{DispatchOutcome, DucoS1, HashWorker, WorkerPool};
pub use network::{Backoff, HttpJobClient, JobSource};
pub use session::{DebugSnapshot, EventSink, MinerEvent, MiningSession, STOPPED_EVENT};
pub use stats::{MiningStats, StatsReporter};
pub use types::{
    Credentials, HashRateSample, SessionState, Solution, SubmitOutcome, WorkUnit,
};
pub use utils::{CancelToken, MinerError, init_logging};
