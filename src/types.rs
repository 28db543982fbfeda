// src/types.rs
use crate::utils::error::MinerError;
use std::fmt;

/// Mining credentials supplied by the host when a session starts
///
/// Immutable for the lifetime of a session. Validated before any network
/// or thread activity begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account name credited for accepted solutions
    pub username: String,
    /// Number of CPU cores to mine on
    pub cores: usize,
    /// Worker threads launched per core
    pub threads_per_core: usize,
}

impl Credentials {
    /// Creates a new set of credentials
    pub fn new(username: impl Into<String>, cores: usize, threads_per_core: usize) -> Self {
        Credentials {
            username: username.into(),
            cores,
            threads_per_core,
        }
    }

    /// Checks that the credentials can drive a session
    ///
    /// # Errors
    /// Returns `MinerError::InvalidInput` if the username is empty (after
    /// trimming) or either parallelism figure is zero.
    pub fn validate(&self) -> Result<(), MinerError> {
        if self.username.trim().is_empty() {
            return Err(MinerError::InvalidInput("username must not be empty".into()));
        }
        if self.cores == 0 {
            return Err(MinerError::InvalidInput("core count must be at least 1".into()));
        }
        if self.threads_per_core == 0 {
            return Err(MinerError::InvalidInput(
                "threads per core must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Total worker thread count for these credentials (cores × threads)
    pub fn worker_count(&self) -> usize {
        self.cores * self.threads_per_core
    }
}

/// A unit of work issued by the job server
///
/// Consumed at most once: a solved and submitted unit is discarded and a
/// fresh one is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// Hash of the previous block, seed of every candidate input
    pub last_block_hash: String,
    /// Lowercase-hex prefix the solution digest must start with
    ///
    /// An empty target matches any digest.
    pub target: String,
    /// Server-assigned difficulty, scales the nonce search space
    pub difficulty: u64,
}

impl WorkUnit {
    /// Number of candidate nonces in this unit (`0 ..= difficulty * 100`)
    pub fn nonce_span(&self) -> u64 {
        self.difficulty.saturating_mul(100).saturating_add(1)
    }
}

/// A winning nonce found by a single worker
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Block hash of the unit this solution belongs to
    pub last_block_hash: String,
    /// Nonce whose digest met the target (sent to the server as a decimal string)
    pub nonce: u64,
    /// Seconds the worker searched before finding the nonce
    pub elapsed_seconds: f64,
    /// Worker that produced the solution
    pub worker_id: usize,
    /// The worker's average hashrate while searching this unit
    pub hashrate: f64,
}

/// Periodic per-worker hashrate measurement
///
/// Folded into an aggregate total by [`crate::stats::StatsReporter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HashRateSample {
    /// Worker the sample came from
    pub worker_id: usize,
    /// Hashes per second over the worker's last measurement window
    pub hashes_per_second: f64,
}

/// Verdict returned by the job server for a submitted solution
///
/// A rejection is an ordinary outcome, not an error: the unit is discarded
/// and mining continues on a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The server accepted the solution
    Accepted,
    /// The server rejected the solution
    Rejected,
}

/// Lifecycle state of a [`crate::session::MiningSession`]
///
/// Transitions run `Idle|Stopped → Starting → Running → Stopping → Stopped`,
/// with `Failed` reachable from `Starting` or `Running` on unrecoverable
/// errors. Exactly one writer mutates the state; readers take lock-free
/// snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Session constructed, never started
    Idle,
    /// Start accepted, first job not yet fetched
    Starting,
    /// Main fetch/dispatch/submit loop is live
    Running,
    /// Stop requested, teardown in progress
    Stopping,
    /// Clean shutdown complete
    Stopped,
    /// Unrecoverable error ended the session
    Failed(String),
}

impl SessionState {
    /// True while the session owns live threads (start accepted, teardown
    /// not yet complete)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Starting | SessionState::Running | SessionState::Stopping
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Starting => write!(f, "Starting"),
            SessionState::Running => write!(f, "Running"),
            SessionState::Stopping => write!(f, "Stopping"),
            SessionState::Stopped => write!(f, "Stopped"),
            SessionState::Failed(reason) => write!(f, "Failed: {}", reason),
        }
    }
}
