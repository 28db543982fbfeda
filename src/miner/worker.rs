// src/miner/worker.rs
//! Worker thread implementation
//!
//! Handles the actual mining work by walking an assigned nonce range in
//! ascending order. Each worker owns its range exclusively, polls the
//! dispatch cancellation token at a bounded interval, emits periodic
//! hashrate samples, and reports exactly one terminal outcome back to
//! the pool.

use crate::miner::algorithm::DucoS1;
use crate::types::{HashRateSample, Solution, WorkUnit};
use crate::utils::cancel::CancelToken;
use crossbeam_channel::Sender;
use std::ops::Range;
use std::time::{Duration, Instant};

/// How many hashes a worker computes between cancellation checks
///
/// At realistic SHA-1 throughput this is well under a millisecond of
/// work, which bounds how stale a stop request can get.
pub(crate) const CANCEL_POLL_HASHES: u64 = 10_000;

/// Minimum spacing between two hashrate samples from one worker
const SAMPLE_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Terminal report a worker sends the pool when its search ends
///
/// Every worker run produces exactly one of these, so the dispatcher can
/// count completions instead of guessing.
#[derive(Debug, Clone)]
pub enum WorkerOutcome {
    /// The worker found a nonce meeting the target
    Solved(Solution),
    /// The worker's whole range was searched without a match
    Exhausted {
        /// Worker that drained its range
        worker_id: usize,
    },
    /// The worker observed cancellation and wound down early
    Cancelled {
        /// Worker that was cancelled
        worker_id: usize,
    },
    /// The worker died; its range counts as unsearched
    Fault {
        /// Worker that faulted
        worker_id: usize,
        /// Human-readable failure description
        reason: String,
    },
}

/// Worker that performs mining computations over one nonce sub-range
///
/// Workers never touch the network; they are pure CPU loops. The pool
/// assigns disjoint ranges, so no hashing state is shared between
/// workers.
pub struct HashWorker {
    /// Index of this worker within the pool
    id: usize,
    /// Exclusive nonce sub-range assigned by the pool
    range: Range<u64>,
    /// Per-dispatch cancellation token, polled every [`CANCEL_POLL_HASHES`]
    cancel: CancelToken,
    /// Channel for the single terminal outcome
    outcome_tx: Sender<WorkerOutcome>,
    /// Channel for periodic hashrate samples
    sample_tx: Sender<HashRateSample>,
}

impl HashWorker {
    /// Creates a new worker for one dispatch
    ///
    /// # Arguments
    /// * `id` - Worker index within the pool
    /// * `range` - Exclusive nonce sub-range to search
    /// * `cancel` - Token cancelling this dispatch
    /// * `outcome_tx` - Channel for the terminal outcome
    /// * `sample_tx` - Channel for hashrate samples
    pub fn new(
        id: usize,
        range: Range<u64>,
        cancel: CancelToken,
        outcome_tx: Sender<WorkerOutcome>,
        sample_tx: Sender<HashRateSample>,
    ) -> Self {
        HashWorker {
            id,
            range,
            cancel,
            outcome_tx,
            sample_tx,
        }
    }

    /// Searches the assigned range for a solution to `unit`
    ///
    /// Walks nonces in ascending order, which makes the outcome a pure
    /// function of (unit, username, range): the lowest solving nonce in
    /// the range wins, or the range exhausts.
    ///
    /// Terminates on the first of: solution found, range exhausted,
    /// cancellation observed. Sends exactly one [`WorkerOutcome`].
    pub fn run(&self, unit: &WorkUnit, username: &str) {
        let algo = DucoS1::new(unit, username);
        let started = Instant::now();
        let mut last_sample = started;
        let mut hashes_at_last_sample: u64 = 0;
        let mut hashes: u64 = 0;
        let mut nonce = self.range.start;

        let outcome = loop {
            if hashes % CANCEL_POLL_HASHES == 0 {
                if self.cancel.is_cancelled() {
                    break WorkerOutcome::Cancelled { worker_id: self.id };
                }
                let since_sample = last_sample.elapsed();
                if since_sample >= SAMPLE_MIN_INTERVAL {
                    self.emit_sample(hashes - hashes_at_last_sample, since_sample);
                    last_sample = Instant::now();
                    hashes_at_last_sample = hashes;
                }
            }

            if nonce >= self.range.end {
                break WorkerOutcome::Exhausted { worker_id: self.id };
            }

            if let Some(digest) = algo.try_nonce(nonce) {
                let elapsed = started.elapsed().as_secs_f64();
                let hashrate = if elapsed > 0.0 {
                    (hashes + 1) as f64 / elapsed
                } else {
                    0.0
                };
                log::debug!(
                    "worker {} solved nonce {} -> {} after {} hashes",
                    self.id,
                    nonce,
                    hex::encode(digest),
                    hashes + 1
                );
                break WorkerOutcome::Solved(Solution {
                    last_block_hash: unit.last_block_hash.clone(),
                    nonce,
                    elapsed_seconds: elapsed,
                    worker_id: self.id,
                    hashrate,
                });
            }

            nonce += 1;
            hashes += 1;
        };

        // Final sample so the aggregate does not go stale on short units
        let since_sample = last_sample.elapsed();
        if hashes > hashes_at_last_sample && since_sample > Duration::ZERO {
            self.emit_sample(hashes - hashes_at_last_sample, since_sample);
        }

        if self.outcome_tx.send(outcome).is_err() {
            log::debug!("worker {} outcome dropped, pool already gone", self.id);
        }
    }

    /// Sends one hashrate sample; dropped silently if the listener is gone
    fn emit_sample(&self, hashes: u64, window: Duration) {
        let sample = HashRateSample {
            worker_id: self.id,
            hashes_per_second: hashes as f64 / window.as_secs_f64(),
        };
        let _ = self.sample_tx.send(sample);
    }
}
