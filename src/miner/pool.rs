// src/miner/pool.rs
//! Worker pool implementation
//!
//! Owns the fixed set of hash workers for a session. For every work unit
//! the pool partitions the nonce space into disjoint per-worker ranges,
//! fans the unit out to one thread per range, returns the first solution
//! found and cancels the losing siblings. Individual worker faults are
//! absorbed; only a pool where every worker faults fails the dispatch.

use crate::miner::worker::{HashWorker, WorkerOutcome};
use crate::types::{HashRateSample, Solution, WorkUnit};
use crate::utils::cancel::CancelToken;
use crate::utils::error::MinerError;
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::ops::Range;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How often the dispatcher wakes to propagate external cancellation
/// into the per-unit token
const DISPATCH_TICK: Duration = Duration::from_millis(50);

/// Upper bound on how long [`WorkerPool::shutdown`] waits for an active
/// dispatch to drain; workers poll cancellation far more often than this
const SHUTDOWN_WAIT_MAX: Duration = Duration::from_secs(2);

/// Sleep slice while waiting for an active dispatch to drain
const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// Result of dispatching one work unit to the pool
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Exactly one winning solution; siblings were cancelled
    Solved(Solution),
    /// Every range was searched, no nonce met the target
    Exhausted,
    /// The dispatch was cancelled (session stop or pool shutdown)
    Cancelled,
}

/// Splits a nonce span into `workers` contiguous, disjoint ranges
///
/// Deterministic in (span, workers): worker `i` always receives the same
/// range, independent of thread scheduling. The first `span % workers`
/// ranges are one nonce longer; when `workers > span` the tail ranges are
/// empty. The union of all ranges is exactly `0..span`.
pub fn partition_nonce_space(span: u64, workers: usize) -> Vec<Range<u64>> {
    let n = workers as u64;
    if n == 0 {
        return Vec::new();
    }
    let chunk = span / n;
    let remainder = span % n;
    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0u64;
    for i in 0..n {
        let len = chunk + u64::from(i < remainder);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// Coordinates hash workers across work units
///
/// The pool is configured once per session (`cores × threads` workers)
/// and then drives one dispatch at a time from the session's control
/// thread.
pub struct WorkerPool {
    /// Target parallelism, `cores × threads_per_core`
    workers: usize,
    /// Pool-wide shutdown token; ends any in-flight dispatch
    shutdown: CancelToken,
    /// True while a dispatch is running
    active: Arc<AtomicBool>,
    /// Channel the workers publish hashrate samples on
    sample_tx: Sender<HashRateSample>,
}

impl WorkerPool {
    /// Creates a pool with a single worker; call [`WorkerPool::configure`]
    /// before dispatching
    ///
    /// # Arguments
    /// * `sample_tx` - Channel hashrate samples are forwarded on
    pub fn new(sample_tx: Sender<HashRateSample>) -> Self {
        WorkerPool {
            workers: 1,
            shutdown: CancelToken::new(),
            active: Arc::new(AtomicBool::new(false)),
            sample_tx,
        }
    }

    /// Sets the pool's parallelism
    ///
    /// # Errors
    /// - `InvalidInput` when either figure is zero
    /// - `InvalidState` when a dispatch is currently active
    pub fn configure(&mut self, cores: usize, threads_per_core: usize) -> Result<(), MinerError> {
        if self.active.load(Ordering::Acquire) {
            return Err(MinerError::InvalidState(
                "worker pool cannot be reconfigured while dispatching".into(),
            ));
        }
        if cores == 0 || threads_per_core == 0 {
            return Err(MinerError::InvalidInput(
                "pool parallelism must be at least 1x1".into(),
            ));
        }
        self.workers = cores * threads_per_core;
        Ok(())
    }

    /// Number of workers launched per dispatch
    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Searches one work unit with the full pool
    ///
    /// Partitions the unit's nonce span into disjoint per-worker ranges,
    /// launches one thread per range and blocks until all workers have
    /// terminated. The first solution received wins and cancels the
    /// remaining workers; late solutions for the same unit are discarded.
    ///
    /// `session_cancel` is the caller's stop signal; it is propagated
    /// into the per-unit token so workers only ever poll one flag.
    ///
    /// # Errors
    /// `WorkerFault` only when every worker faulted; individual faults
    /// are logged and treated as "no solution from that range".
    pub fn dispatch(
        &self,
        unit: &WorkUnit,
        username: &str,
        session_cancel: &CancelToken,
    ) -> Result<DispatchOutcome, MinerError> {
        let _active = ActiveGuard::hold(&self.active);

        let ranges = partition_nonce_space(unit.nonce_span(), self.workers);
        let token = CancelToken::new();
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded();

        let mut handles = Vec::with_capacity(self.workers);
        for (id, range) in ranges.into_iter().enumerate() {
            let worker = HashWorker::new(
                id,
                range,
                token.clone(),
                outcome_tx.clone(),
                self.sample_tx.clone(),
            );
            let fault_tx = outcome_tx.clone();
            let unit = unit.clone();
            let username = username.to_string();
            let spawned = std::thread::Builder::new()
                .name(format!("hash-worker-{}", id))
                .spawn(move || {
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| worker.run(&unit, &username)))
                    {
                        let _ = fault_tx.send(WorkerOutcome::Fault {
                            worker_id: id,
                            reason: panic_reason(panic),
                        });
                    }
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    token.cancel();
                    for handle in handles.drain(..) {
                        let _ = handle.join();
                    }
                    return Err(MinerError::WorkerFault(format!(
                        "failed to spawn worker thread {}: {}",
                        id, e
                    )));
                }
            }
        }
        drop(outcome_tx);

        let mut solution: Option<Solution> = None;
        let mut faults = 0usize;
        let mut finished = 0usize;
        while finished < self.workers {
            match outcome_rx.recv_timeout(DISPATCH_TICK) {
                Ok(WorkerOutcome::Solved(found)) => {
                    finished += 1;
                    if solution.is_none() {
                        log::info!(
                            "worker {} found nonce {} in {:.2}s",
                            found.worker_id,
                            found.nonce,
                            found.elapsed_seconds
                        );
                        token.cancel();
                        solution = Some(found);
                    } else {
                        log::debug!("discarding late solution from worker {}", found.worker_id);
                    }
                }
                Ok(WorkerOutcome::Exhausted { worker_id }) => {
                    finished += 1;
                    log::debug!("worker {} exhausted its range", worker_id);
                }
                Ok(WorkerOutcome::Cancelled { .. }) => finished += 1,
                Ok(WorkerOutcome::Fault { worker_id, reason }) => {
                    finished += 1;
                    faults += 1;
                    log::warn!(
                        "worker {} faulted ({}), continuing without its range",
                        worker_id,
                        reason
                    );
                }
                Err(RecvTimeoutError::Timeout) => {
                    if session_cancel.is_cancelled() || self.shutdown.is_cancelled() {
                        token.cancel();
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        for handle in handles {
            let _ = handle.join();
        }

        if let Some(solution) = solution {
            Ok(DispatchOutcome::Solved(solution))
        } else if session_cancel.is_cancelled() || self.shutdown.is_cancelled() {
            Ok(DispatchOutcome::Cancelled)
        } else if faults == self.workers {
            Err(MinerError::WorkerFault(format!(
                "all {} workers faulted",
                self.workers
            )))
        } else {
            Ok(DispatchOutcome::Exhausted)
        }
    }

    /// Cancels all active workers and waits for the in-flight dispatch to
    /// drain
    ///
    /// Workers check cancellation every few thousand hashes, so the wait
    /// is bounded by [`SHUTDOWN_WAIT_MAX`] with plenty of margin. A pool
    /// that has been shut down stays dead; sessions build a fresh pool on
    /// start.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let deadline = Instant::now() + SHUTDOWN_WAIT_MAX;
        while self.active.load(Ordering::Acquire) && Instant::now() < deadline {
            std::thread::sleep(SHUTDOWN_POLL);
        }
        if self.active.load(Ordering::Acquire) {
            log::warn!("worker pool still draining after {:?}", SHUTDOWN_WAIT_MAX);
        }
    }
}

/// RAII marker for the pool's active-dispatch flag
///
/// Clears the flag on every exit path, including panics, so `shutdown`
/// cannot wait on a dispatch that already unwound.
struct ActiveGuard {
    flag: Arc<AtomicBool>,
}

impl ActiveGuard {
    fn hold(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::Release);
        ActiveGuard { flag: flag.clone() }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Renders a panic payload into a loggable string
fn panic_reason(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "worker panicked".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    const LAST_BLOCK_HASH: &str = "ba29a15896fd2d792d5c4b60668bf2b9feebc51d";

    fn unit(target: &str, difficulty: u64) -> WorkUnit {
        WorkUnit {
            last_block_hash: LAST_BLOCK_HASH.into(),
            target: target.into(),
            difficulty,
        }
    }

    fn pool_with(workers: (usize, usize)) -> WorkerPool {
        let (sample_tx, _sample_rx) = unbounded();
        // receiver is dropped; workers tolerate a closed sample channel
        let mut pool = WorkerPool::new(sample_tx);
        pool.configure(workers.0, workers.1).unwrap();
        pool
    }

    #[test]
    fn partition_is_union_complete_and_disjoint() {
        for (span, workers) in [(1u64, 1usize), (10, 3), (4501, 4), (100, 100), (3, 8)] {
            let ranges = partition_nonce_space(span, workers);
            assert_eq!(ranges.len(), workers, "span {} workers {}", span, workers);
            let mut expected_start = 0u64;
            for range in &ranges {
                assert_eq!(range.start, expected_start, "ranges must be contiguous");
                assert!(range.end >= range.start);
                expected_start = range.end;
            }
            assert_eq!(expected_start, span, "ranges must cover the whole span");
        }
    }

    #[test]
    fn partition_spreads_remainder_evenly() {
        let ranges = partition_nonce_space(10, 3);
        let lens: Vec<u64> = ranges.iter().map(|r| r.end - r.start).collect();
        assert_eq!(lens, vec![4, 3, 3]);
    }

    #[test]
    fn partition_with_more_workers_than_nonces() {
        let ranges = partition_nonce_space(3, 8);
        let occupied: Vec<_> = ranges.iter().filter(|r| !r.is_empty()).collect();
        assert_eq!(occupied.len(), 3);
        assert!(ranges.iter().skip(3).all(|r| r.is_empty()));
    }

    #[test]
    fn dispatch_returns_the_unique_solution() {
        // nonce 4242 is the only match for this prefix within the span,
        // so the winner is deterministic no matter which worker runs first
        let pool = pool_with((2, 2));
        let outcome = pool
            .dispatch(&unit("7135182", 45), "alice", &CancelToken::new())
            .unwrap();
        match outcome {
            DispatchOutcome::Solved(solution) => assert_eq!(solution.nonce, 4242),
            other => panic!("expected solution, got {:?}", other),
        }
    }

    #[test]
    fn dispatch_with_trivial_target_yields_exactly_one_solution() {
        // every nonce matches an empty target; N workers race and exactly
        // one solution must come back
        let pool = pool_with((2, 2));
        let outcome = pool
            .dispatch(&unit("", 100), "alice", &CancelToken::new())
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Solved(_)));
    }

    #[test]
    fn dispatch_reports_exhaustion() {
        let pool = pool_with((2, 1));
        let outcome = pool
            .dispatch(&unit("fedcba9876", 5), "alice", &CancelToken::new())
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Exhausted));
    }

    #[test]
    fn session_cancellation_ends_dispatch_quickly() {
        let pool = Arc::new(pool_with((2, 2)));
        let cancel = CancelToken::new();
        let canceller = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });
        let started = Instant::now();
        let outcome = pool
            .dispatch(&unit("fedcba9876fedcba9876", 1_000_000_000), "alice", &cancel)
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Cancelled));
        assert!(started.elapsed() < SHUTDOWN_WAIT_MAX);
    }

    #[test]
    fn shutdown_drains_an_active_dispatch() {
        let pool = Arc::new(pool_with((1, 2)));
        let dispatcher = Arc::clone(&pool);
        let handle = std::thread::spawn(move || {
            dispatcher.dispatch(
                &unit("fedcba9876fedcba9876", 1_000_000_000),
                "alice",
                &CancelToken::new(),
            )
        });
        std::thread::sleep(Duration::from_millis(50));
        pool.shutdown();
        let outcome = handle.join().unwrap().unwrap();
        assert!(matches!(outcome, DispatchOutcome::Cancelled));
    }

    #[test]
    fn configure_rejects_zero_parallelism() {
        let (sample_tx, _rx) = unbounded();
        let mut pool = WorkerPool::new(sample_tx);
        assert!(pool.configure(0, 1).is_err());
        assert!(pool.configure(1, 0).is_err());
        assert!(pool.configure(3, 2).is_ok());
        assert_eq!(pool.worker_count(), 6);
    }
}
