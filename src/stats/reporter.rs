// src/stats/reporter.rs
use crate::types::{HashRateSample, SubmitOutcome};
use crate::utils::cancel::CancelToken;
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Snapshot of a session's mining statistics
#[derive(Debug, Clone, Default)]
pub struct MiningStats {
    /// Aggregate hashrate across all workers (hashes per second)
    pub hashrate: f64,
    /// Number of solutions accepted by the job server
    pub shares_accepted: u64,
    /// Number of solutions rejected by the job server
    pub shares_rejected: u64,
    /// Seconds since the reporter (and its session) started
    pub uptime_seconds: u64,
}

/// Shared aggregation state behind the reporter
///
/// Samples arrive from many workers but are folded by a single listener
/// thread; the summed total is published through an atomic so readers
/// never take the map lock.
struct StatsInner {
    /// Latest rate per worker id
    rates: Mutex<HashMap<usize, f64>>,
    /// f64 bit-pattern of the summed hashrate, for lock-free reads
    total_bits: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    start_time: Instant,
}

/// Collects and reports mining statistics
///
/// Cheap to clone; clones share the underlying counters.
#[derive(Clone)]
pub struct StatsReporter {
    inner: Arc<StatsInner>,
    /// Interval at which stats are logged by the reporting thread
    report_interval: Duration,
}

impl StatsReporter {
    /// Creates a new StatsReporter with the specified reporting interval
    ///
    /// # Arguments
    /// * `report_interval` - How often the reporting thread logs statistics
    pub fn new(report_interval: Duration) -> Self {
        StatsReporter {
            inner: Arc::new(StatsInner {
                rates: Mutex::new(HashMap::new()),
                total_bits: AtomicU64::new(0f64.to_bits()),
                accepted: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
                start_time: Instant::now(),
            }),
            report_interval,
        }
    }

    /// Creates and returns a channel sender for hashrate samples
    ///
    /// The reporter listens for samples on a background thread and folds
    /// them into the aggregate total. A fresh sample from a worker
    /// replaces that worker's previous rate. The listener exits once all
    /// senders are dropped.
    pub fn sample_sender(&self) -> Sender<HashRateSample> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.start_sample_listener(rx);
        tx
    }

    /// Records the server's verdict for one submitted solution
    pub fn record_submit(&self, outcome: SubmitOutcome) {
        match outcome {
            SubmitOutcome::Accepted => self.inner.accepted.fetch_add(1, Ordering::Relaxed),
            SubmitOutcome::Rejected => self.inner.rejected.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Current aggregate hashrate across all workers, lock-free
    pub fn total_hashrate(&self) -> f64 {
        f64::from_bits(self.inner.total_bits.load(Ordering::Relaxed))
    }

    /// Gets the current mining statistics
    ///
    /// # Returns
    /// A snapshot of the current statistics; safe to call concurrently
    /// with any mining activity
    pub fn snapshot(&self) -> MiningStats {
        MiningStats {
            hashrate: self.total_hashrate(),
            shares_accepted: self.inner.accepted.load(Ordering::Relaxed),
            shares_rejected: self.inner.rejected.load(Ordering::Relaxed),
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Starts the periodic reporting of statistics
    ///
    /// Spawns a background thread that logs stats at the configured
    /// interval until `cancel` fires.
    pub fn start_reporting(&self, cancel: CancelToken) {
        let reporter = self.clone();
        let spawned = std::thread::Builder::new()
            .name("stats-reporter".into())
            .spawn(move || {
                while cancel.sleep_unless_cancelled(reporter.report_interval) {
                    let stats = reporter.snapshot();
                    log::info!(
                        "Hashrate: {:.2} H/s | Accepted/Rejected: {}/{} | Uptime: {}s",
                        stats.hashrate,
                        stats.shares_accepted,
                        stats.shares_rejected,
                        stats.uptime_seconds
                    );
                }
            });
        if let Err(e) = spawned {
            log::warn!("failed to spawn stats reporting thread: {}", e);
        }
    }

    /// Starts a listener folding hashrate samples on a background thread
    fn start_sample_listener(&self, receiver: Receiver<HashRateSample>) {
        let inner = self.inner.clone();
        let spawned = std::thread::Builder::new()
            .name("stats-samples".into())
            .spawn(move || {
                for sample in receiver {
                    let total: f64 = {
                        let mut rates = match inner.rates.lock() {
                            Ok(rates) => rates,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        rates.insert(sample.worker_id, sample.hashes_per_second);
                        rates.values().sum()
                    };
                    inner.total_bits.store(total.to_bits(), Ordering::Relaxed);
                }
            });
        if let Err(e) = spawned {
            log::warn!("failed to spawn stats listener thread: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_for_total(reporter: &StatsReporter, expected: f64) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if (reporter.total_hashrate() - expected).abs() < f64::EPSILON {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!(
            "aggregate never reached {} (got {})",
            expected,
            reporter.total_hashrate()
        );
    }

    #[test]
    fn samples_from_distinct_workers_sum() {
        let reporter = StatsReporter::new(Duration::from_secs(3600));
        let tx = reporter.sample_sender();
        tx.send(HashRateSample {
            worker_id: 0,
            hashes_per_second: 100.0,
        })
        .unwrap();
        tx.send(HashRateSample {
            worker_id: 1,
            hashes_per_second: 50.0,
        })
        .unwrap();
        wait_for_total(&reporter, 150.0);
    }

    #[test]
    fn fresh_sample_replaces_a_worker_rate() {
        let reporter = StatsReporter::new(Duration::from_secs(3600));
        let tx = reporter.sample_sender();
        tx.send(HashRateSample {
            worker_id: 0,
            hashes_per_second: 100.0,
        })
        .unwrap();
        wait_for_total(&reporter, 100.0);
        tx.send(HashRateSample {
            worker_id: 0,
            hashes_per_second: 250.0,
        })
        .unwrap();
        wait_for_total(&reporter, 250.0);
    }

    #[test]
    fn submit_outcomes_are_counted() {
        let reporter = StatsReporter::new(Duration::from_secs(3600));
        reporter.record_submit(SubmitOutcome::Accepted);
        reporter.record_submit(SubmitOutcome::Accepted);
        reporter.record_submit(SubmitOutcome::Rejected);
        let stats = reporter.snapshot();
        assert_eq!(stats.shares_accepted, 2);
        assert_eq!(stats.shares_rejected, 1);
    }

    #[test]
    fn clones_share_counters() {
        let reporter = StatsReporter::new(Duration::from_secs(3600));
        let clone = reporter.clone();
        clone.record_submit(SubmitOutcome::Accepted);
        assert_eq!(reporter.snapshot().shares_accepted, 1);
    }
}
