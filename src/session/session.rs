// src/session/session.rs
use crate::config::MinerConfig;
use crate::miner::pool::{DispatchOutcome, WorkerPool};
use crate::network::backoff::Backoff;
use crate::network::job_client::JobSource;
use crate::session::events::{EventSink, MinerEvent};
use crate::stats::StatsReporter;
use crate::types::{Credentials, SessionState, Solution, SubmitOutcome};
use crate::utils::cancel::CancelToken;
use crate::utils::error::MinerError;
use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

/// Read-only snapshot of a session for the host's debug query
///
/// Serialized to pretty JSON at the host boundary, so every field stays
/// human-readable.
#[derive(Debug, Clone, Serialize)]
pub struct DebugSnapshot {
    /// Current lifecycle state
    pub state: String,
    /// Username of the active credentials, if a session ever started
    pub username: Option<String>,
    /// Total worker threads per dispatch (cores × threads)
    pub workers: usize,
    /// Aggregate hashrate across all workers
    pub hashrate: f64,
    /// Solutions accepted by the server
    pub shares_accepted: u64,
    /// Solutions rejected by the server
    pub shares_rejected: u64,
    /// Seconds since the session started
    pub uptime_seconds: u64,
}

impl Default for DebugSnapshot {
    fn default() -> Self {
        DebugSnapshot {
            state: SessionState::Idle.to_string(),
            username: None,
            workers: 0,
            hashrate: 0.0,
            shares_accepted: 0,
            shares_rejected: 0,
            uptime_seconds: 0,
        }
    }
}

/// Per-run resources, rebuilt on every start
///
/// Kept behind an ArcSwap so the debug query can read them without
/// touching the control thread's locks. Clones share the underlying
/// token, reporter and pool.
#[derive(Clone)]
struct SessionRuntime {
    credentials: Credentials,
    cancel: CancelToken,
    stats: StatsReporter,
    pool: Arc<WorkerPool>,
    started_at: Instant,
}

/// Either a value, or notice that the session was cancelled mid-retry
enum Retried<T> {
    Done(T),
    Cancelled,
}

/// Top-level mining state machine
///
/// Owns the fetch → dispatch → submit loop on a dedicated control thread
/// and reports progress through the injected [`EventSink`]. State
/// transitions are serialized by a single lock; state reads are lock-free
/// snapshots, so `debug_snapshot` never blocks on the mining loop.
///
/// Stop latency: workers observe cancellation within one poll interval
/// (well under a second); the worst case adds one in-flight HTTP call
/// bounded by the configured request timeout.
pub struct MiningSession {
    /// State shared with the control thread
    inner: Arc<SessionInner>,
    /// Control thread handle, joined on stop and before restart
    control: Mutex<Option<JoinHandle<()>>>,
}

/// The parts of a session the control thread shares with its owner
struct SessionInner {
    config: MinerConfig,
    job_source: Arc<dyn JobSource>,
    sink: Arc<dyn EventSink>,
    /// Lifecycle state; written under `transition_lock`, read lock-free
    state: ArcSwap<SessionState>,
    /// Serializes every state transition
    transition_lock: Mutex<()>,
    /// Resources of the current (or last) run
    runtime: ArcSwap<Option<SessionRuntime>>,
    /// Guard making the terminal event unique per lifecycle
    terminal_emitted: AtomicBool,
}

impl MiningSession {
    /// Creates an idle session
    ///
    /// # Arguments
    /// * `config` - Networking and retry tuning
    /// * `job_source` - The job server adapter to mine against
    /// * `sink` - Host channel progress events are delivered to
    pub fn new(
        config: MinerConfig,
        job_source: Arc<dyn JobSource>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        MiningSession {
            inner: Arc::new(SessionInner {
                config,
                job_source,
                sink,
                state: ArcSwap::from_pointee(SessionState::Idle),
                transition_lock: Mutex::new(()),
                runtime: ArcSwap::from_pointee(None),
                terminal_emitted: AtomicBool::new(false),
            }),
            control: Mutex::new(None),
        }
    }

    /// Starts mining with the given credentials
    ///
    /// Valid only from `Idle` or `Stopped`. Credentials are validated
    /// before any state change, network call or thread spawn; a second
    /// start while the session is active is rejected, not queued.
    ///
    /// # Errors
    /// - `InvalidInput` for unusable credentials
    /// - `InvalidState` when the session is not startable
    /// - `Io` when the control thread cannot be spawned
    pub fn start(&self, credentials: Credentials) -> Result<(), MinerError> {
        credentials.validate()?;

        let inner = &self.inner;
        let _guard = lock_ignoring_poison(&inner.transition_lock);
        let previous = inner.state.load_full();
        match *previous {
            SessionState::Idle | SessionState::Stopped => {}
            ref other => {
                return Err(MinerError::InvalidState(format!(
                    "cannot start while {}",
                    other
                )));
            }
        }

        // A Stopped session's control thread has exited; reap it before
        // the restart.
        if let Some(handle) = lock_ignoring_poison(&self.control).take() {
            let _ = handle.join();
        }
        inner.terminal_emitted.store(false, Ordering::SeqCst);

        let stats = StatsReporter::new(inner.config.report_interval());
        let sample_tx = stats.sample_sender();
        let mut pool = WorkerPool::new(sample_tx);
        pool.configure(credentials.cores, credentials.threads_per_core)?;

        let cancel = CancelToken::new();
        stats.start_reporting(cancel.clone());

        let runtime = SessionRuntime {
            credentials,
            cancel,
            stats,
            pool: Arc::new(pool),
            started_at: Instant::now(),
        };
        inner.runtime.store(Arc::new(Some(runtime)));
        inner.state.store(Arc::new(SessionState::Starting));

        let control_inner = Arc::clone(inner);
        match std::thread::Builder::new()
            .name("mining-control".into())
            .spawn(move || control_inner.run_loop())
        {
            Ok(handle) => {
                *lock_ignoring_poison(&self.control) = Some(handle);
                Ok(())
            }
            Err(e) => {
                inner.state.store(previous);
                Err(e.into())
            }
        }
    }

    /// Stops the session and waits for clean teardown
    ///
    /// Valid from `Starting` or `Running`; anything else is a no-op, so
    /// re-entrant stops are safe. Blocks until all workers and the
    /// control thread have exited, then emits the terminal event.
    pub fn stop(&self) {
        let inner = &self.inner;
        {
            let _guard = lock_ignoring_poison(&inner.transition_lock);
            match **inner.state.load() {
                SessionState::Starting | SessionState::Running => {
                    inner.state.store(Arc::new(SessionState::Stopping));
                }
                _ => return,
            }
        }

        if let Some(runtime) = inner.runtime_snapshot() {
            runtime.cancel.cancel();
            runtime.pool.shutdown();
        }
        if let Some(handle) = lock_ignoring_poison(&self.control).take() {
            let _ = handle.join();
        }

        inner.try_transition(
            |s| matches!(s, SessionState::Stopping),
            SessionState::Stopped,
        );
        log::info!("mining session stopped");
        inner.emit_terminal();
    }

    /// Current lifecycle state (cloned snapshot)
    pub fn state(&self) -> SessionState {
        (**self.inner.state.load()).clone()
    }

    /// True while the session owns live threads
    pub fn is_active(&self) -> bool {
        self.inner.state.load().is_active()
    }

    /// Read-only snapshot for the host's debug query
    ///
    /// Callable concurrently with any other operation; reads only atomics
    /// and lock-free snapshots, never the mining loop's locks.
    pub fn debug_snapshot(&self) -> DebugSnapshot {
        let inner = &self.inner;
        let state = inner.state.load().to_string();
        match inner.runtime_snapshot() {
            Some(runtime) => {
                let stats = runtime.stats.snapshot();
                DebugSnapshot {
                    state,
                    username: Some(runtime.credentials.username.clone()),
                    workers: runtime.credentials.worker_count(),
                    hashrate: stats.hashrate,
                    shares_accepted: stats.shares_accepted,
                    shares_rejected: stats.shares_rejected,
                    uptime_seconds: runtime.started_at.elapsed().as_secs(),
                }
            }
            None => DebugSnapshot {
                state,
                ..DebugSnapshot::default()
            },
        }
    }
}

impl SessionInner {
    /// The fetch → dispatch → submit loop, run on the control thread
    fn run_loop(&self) {
        let runtime = match self.runtime_snapshot() {
            Some(runtime) => runtime,
            None => return,
        };
        let username = runtime.credentials.username.clone();
        let mut last_report = Instant::now();

        loop {
            if runtime.cancel.is_cancelled() {
                break;
            }

            let unit = match self.with_retry(&runtime, "Job fetch", || {
                self.job_source.fetch_job(&username)
            }) {
                Ok(Retried::Done(unit)) => unit,
                Ok(Retried::Cancelled) => break,
                Err(reason) => {
                    self.fail(reason);
                    return;
                }
            };

            if matches!(**self.state.load(), SessionState::Starting) {
                if !self.try_transition(
                    |s| matches!(s, SessionState::Starting),
                    SessionState::Running,
                ) {
                    break; // a stop raced the first fetch
                }
                self.emit(MinerEvent::Started);
            }

            match runtime.pool.dispatch(&unit, &username, &runtime.cancel) {
                Ok(DispatchOutcome::Solved(solution)) => {
                    self.emit(MinerEvent::Solved);
                    match self.submit(&runtime, &username, &solution) {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(reason) => {
                            self.fail(reason);
                            return;
                        }
                    }
                }
                Ok(DispatchOutcome::Exhausted) => {
                    log::debug!("no solution in any assigned range, fetching a fresh unit");
                }
                Ok(DispatchOutcome::Cancelled) => break,
                Err(e) => {
                    self.fail(format!("worker pool failed: {}", e));
                    return;
                }
            }

            if last_report.elapsed() >= self.config.report_interval() {
                let rate = runtime.stats.total_hashrate();
                if let Err(e) = self.job_source.report_hashrate(&username, rate) {
                    log::warn!("hashrate report failed: {}", e);
                }
                last_report = Instant::now();
            }
        }
    }

    /// Submits one solution, with retries; records and reports the verdict
    ///
    /// # Returns
    /// - `Ok(true)` to keep mining
    /// - `Ok(false)` when cancelled mid-retry
    /// - `Err(reason)` when the retry budget is exhausted
    fn submit(
        &self,
        runtime: &SessionRuntime,
        username: &str,
        solution: &Solution,
    ) -> Result<bool, String> {
        let outcome = self.with_retry(runtime, "Solution submit", || {
            self.job_source.submit_solution(username, solution)
        })?;
        match outcome {
            Retried::Done(verdict) => {
                runtime.stats.record_submit(verdict);
                match verdict {
                    SubmitOutcome::Accepted => self.emit(MinerEvent::Accepted),
                    SubmitOutcome::Rejected => self.emit(MinerEvent::Rejected),
                }
                Ok(true)
            }
            Retried::Cancelled => Ok(false),
        }
    }

    /// Runs `op` until success, cancellation or budget exhaustion
    ///
    /// Transient failures consume the retry budget and emit one progress
    /// message per attempt, with exponentially growing sleeps. A server
    /// rate limit is honored (capped) without consuming the budget.
    /// Non-transient errors end the session immediately.
    fn with_retry<T>(
        &self,
        runtime: &SessionRuntime,
        what: &'static str,
        mut op: impl FnMut() -> Result<T, MinerError>,
    ) -> Result<Retried<T>, String> {
        let mut backoff = Backoff::new(self.config.backoff_base(), self.config.backoff_cap());
        let budget = self.config.retry_budget;
        let mut attempt = 0u32;
        loop {
            if runtime.cancel.is_cancelled() {
                return Ok(Retried::Cancelled);
            }
            match op() {
                Ok(value) => return Ok(Retried::Done(value)),
                Err(MinerError::RateLimited(delay)) => {
                    let wait = delay.min(self.config.backoff_cap());
                    log::info!("server rate limit, {} waits {}s", what, wait.as_secs());
                    if !runtime.cancel.sleep_unless_cancelled(wait) {
                        return Ok(Retried::Cancelled);
                    }
                }
                Err(e) if e.is_transient() => {
                    attempt += 1;
                    self.emit(MinerEvent::Retry {
                        what,
                        attempt,
                        budget,
                        reason: e.to_string(),
                    });
                    if attempt >= budget {
                        return Err(format!("{} failed after {} attempts: {}", what, attempt, e));
                    }
                    if !runtime.cancel.sleep_unless_cancelled(backoff.next_delay()) {
                        return Ok(Retried::Cancelled);
                    }
                }
                Err(e) => return Err(format!("{} failed: {}", what, e)),
            }
        }
    }

    /// Moves the session to `Failed` and delivers the final two events
    ///
    /// A concurrent stop wins the transition race; in that case the stop
    /// path owns the terminal event and this becomes a quiet exit.
    fn fail(&self, reason: String) {
        let failed = self.try_transition(
            |s| matches!(s, SessionState::Starting | SessionState::Running),
            SessionState::Failed(reason.clone()),
        );
        if failed {
            log::error!("mining session failed: {}", reason);
            self.emit(MinerEvent::Fatal { reason });
            self.emit_terminal();
        }
    }

    /// Applies a transition under the lock when `allowed` approves the
    /// current state
    fn try_transition(&self, allowed: impl Fn(&SessionState) -> bool, to: SessionState) -> bool {
        let _guard = lock_ignoring_poison(&self.transition_lock);
        let current = self.state.load_full();
        if allowed(&current) {
            self.state.store(Arc::new(to));
            true
        } else {
            false
        }
    }

    /// Renders and delivers one progress event
    fn emit(&self, event: MinerEvent) {
        let message = event.to_string();
        log::debug!("event: {}", message);
        self.sink.emit(&message);
    }

    /// Delivers the terminal event at most once per lifecycle
    fn emit_terminal(&self) {
        if !self.terminal_emitted.swap(true, Ordering::SeqCst) {
            self.sink.emit_terminal();
        }
    }

    /// Clones the current runtime handle, if any run ever started
    fn runtime_snapshot(&self) -> Option<SessionRuntime> {
        self.runtime.load().as_ref().clone()
    }
}

/// Locks a mutex, recovering the guard if a panicking thread poisoned it
///
/// The session's locks only protect short state transitions, so the data
/// cannot be left half-written.
fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::events::STOPPED_EVENT;
    use crate::types::WorkUnit;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const LAST_BLOCK_HASH: &str = "ba29a15896fd2d792d5c4b60668bf2b9feebc51d";

    /// Sink recording every message for ordering assertions
    struct RecordingSink {
        events: Mutex<Vec<String>>,
        terminals: AtomicUsize,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(RecordingSink {
                events: Mutex::new(Vec::new()),
                terminals: AtomicUsize::new(0),
            })
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn terminals(&self) -> usize {
            self.terminals.load(Ordering::SeqCst)
        }

        fn wait_for(&self, message: &str) {
            let deadline = Instant::now() + Duration::from_secs(10);
            while Instant::now() < deadline {
                if self.events().iter().any(|e| e == message) {
                    return;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            panic!("never saw '{}', events: {:?}", message, self.events());
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&self, message: &str) {
            self.events.lock().unwrap().push(message.to_string());
        }

        fn emit_terminal(&self) {
            self.terminals.fetch_add(1, Ordering::SeqCst);
            self.emit(STOPPED_EVENT);
        }
    }

    /// Job source handing out one easy unit forever
    struct EasySource {
        accept: bool,
        fetch_calls: AtomicUsize,
    }

    impl EasySource {
        fn new(accept: bool) -> Arc<Self> {
            Arc::new(EasySource {
                accept,
                fetch_calls: AtomicUsize::new(0),
            })
        }
    }

    impl JobSource for EasySource {
        fn fetch_job(&self, _username: &str) -> Result<WorkUnit, MinerError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(WorkUnit {
                last_block_hash: LAST_BLOCK_HASH.into(),
                target: String::new(),
                difficulty: 1,
            })
        }

        fn submit_solution(
            &self,
            _username: &str,
            _solution: &Solution,
        ) -> Result<SubmitOutcome, MinerError> {
            if self.accept {
                Ok(SubmitOutcome::Accepted)
            } else {
                Ok(SubmitOutcome::Rejected)
            }
        }

        fn report_hashrate(&self, _username: &str, _rate: f64) -> Result<(), MinerError> {
            Ok(())
        }
    }

    /// Job source whose fetches always fail with a network error
    struct FailingSource {
        fetch_calls: AtomicUsize,
    }

    impl FailingSource {
        fn new() -> Arc<Self> {
            Arc::new(FailingSource {
                fetch_calls: AtomicUsize::new(0),
            })
        }
    }

    impl JobSource for FailingSource {
        fn fetch_job(&self, _username: &str) -> Result<WorkUnit, MinerError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Err(MinerError::Network("connection refused".into()))
        }

        fn submit_solution(
            &self,
            _username: &str,
            _solution: &Solution,
        ) -> Result<SubmitOutcome, MinerError> {
            Err(MinerError::Network("connection refused".into()))
        }

        fn report_hashrate(&self, _username: &str, _rate: f64) -> Result<(), MinerError> {
            Ok(())
        }
    }

    fn fast_config() -> MinerConfig {
        MinerConfig {
            retry_budget: 3,
            backoff_base_ms: 1,
            backoff_cap_secs: 1,
            report_interval_secs: 3600,
            ..MinerConfig::default()
        }
    }

    fn session(source: Arc<dyn JobSource>, sink: Arc<RecordingSink>) -> MiningSession {
        MiningSession::new(fast_config(), source, sink)
    }

    fn index_of(events: &[String], needle: &str) -> usize {
        events
            .iter()
            .position(|e| e == needle)
            .unwrap_or_else(|| panic!("'{}' missing from {:?}", needle, events))
    }

    #[test]
    fn full_scenario_start_mine_stop() {
        let sink = RecordingSink::new();
        let mining = session(EasySource::new(true), sink.clone());

        mining
            .start(Credentials::new("alice", 2, 2))
            .expect("start must succeed");
        sink.wait_for("Solution accepted");
        mining.stop();

        assert_eq!(mining.state(), SessionState::Stopped);
        assert_eq!(sink.terminals(), 1);

        let events = sink.events();
        let started = index_of(&events, "Mining service started.");
        let solved = index_of(&events, "Block solved! Submitting...");
        let accepted = index_of(&events, "Solution accepted");
        assert!(started < solved && solved < accepted);
        assert_eq!(events.last().map(String::as_str), Some(STOPPED_EVENT));
    }

    #[test]
    fn repeated_network_errors_fail_after_the_budget() {
        let sink = RecordingSink::new();
        let source = FailingSource::new();
        let mining = session(source.clone(), sink.clone());

        mining.start(Credentials::new("alice", 1, 1)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while !matches!(mining.state(), SessionState::Failed(_)) {
            assert!(Instant::now() < deadline, "session never failed");
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 3);
        let events = sink.events();
        let retries = events
            .iter()
            .filter(|e| e.starts_with("Job fetch failed"))
            .count();
        assert_eq!(retries, 3, "one message per attempt: {:?}", events);
        assert!(events.iter().any(|e| e.starts_with("Mining failed:")));
        assert_eq!(events.last().map(String::as_str), Some(STOPPED_EVENT));
        assert_eq!(sink.terminals(), 1);
    }

    #[test]
    fn invalid_credentials_do_no_work() {
        let sink = RecordingSink::new();
        let source = EasySource::new(true);
        let mining = session(source.clone(), sink.clone());

        let err = mining.start(Credentials::new("", 2, 2)).unwrap_err();
        assert!(matches!(err, MinerError::InvalidInput(_)));
        assert!(mining.start(Credentials::new("alice", 0, 2)).is_err());
        assert!(mining.start(Credentials::new("alice", 2, 0)).is_err());

        assert_eq!(mining.state(), SessionState::Idle);
        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 0);
        assert!(sink.events().is_empty());
        assert_eq!(sink.terminals(), 0);
    }

    #[test]
    fn second_start_is_rejected_while_active() {
        let sink = RecordingSink::new();
        let mining = session(EasySource::new(true), sink.clone());

        mining.start(Credentials::new("alice", 1, 1)).unwrap();
        let err = mining.start(Credentials::new("bob", 1, 1)).unwrap_err();
        assert!(matches!(err, MinerError::InvalidState(_)));
        mining.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let sink = RecordingSink::new();
        let mining = session(EasySource::new(true), sink.clone());

        mining.start(Credentials::new("alice", 1, 1)).unwrap();
        sink.wait_for("Mining service started.");
        mining.stop();
        mining.stop();
        mining.stop();

        assert_eq!(mining.state(), SessionState::Stopped);
        assert_eq!(sink.terminals(), 1);
    }

    #[test]
    fn stop_during_starting_is_clean() {
        let sink = RecordingSink::new();
        // failing fetches with a large budget keep the session in Starting
        let config = MinerConfig {
            retry_budget: 1000,
            backoff_base_ms: 50,
            backoff_cap_secs: 1,
            report_interval_secs: 3600,
            ..MinerConfig::default()
        };
        let mining = MiningSession::new(config, FailingSource::new(), sink.clone());

        mining.start(Credentials::new("alice", 1, 1)).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        mining.stop();

        assert_eq!(mining.state(), SessionState::Stopped);
        assert_eq!(sink.terminals(), 1);
        assert_eq!(sink.events().last().map(String::as_str), Some(STOPPED_EVENT));
    }

    #[test]
    fn rejected_solutions_are_not_fatal() {
        let sink = RecordingSink::new();
        let mining = session(EasySource::new(false), sink.clone());

        mining.start(Credentials::new("alice", 1, 1)).unwrap();
        sink.wait_for("Solution rejected, retrying");
        mining.stop();

        assert_eq!(mining.state(), SessionState::Stopped);
        assert!(mining.debug_snapshot().shares_rejected >= 1);
        assert_eq!(sink.terminals(), 1);
    }

    #[test]
    fn session_can_restart_after_stop() {
        let sink = RecordingSink::new();
        let mining = session(EasySource::new(true), sink.clone());

        mining.start(Credentials::new("alice", 1, 1)).unwrap();
        sink.wait_for("Mining service started.");
        mining.stop();
        assert_eq!(mining.state(), SessionState::Stopped);

        mining.start(Credentials::new("alice", 1, 1)).unwrap();
        assert!(mining.is_active());
        mining.stop();
        assert_eq!(mining.state(), SessionState::Stopped);
        assert_eq!(sink.terminals(), 2);
    }

    #[test]
    fn debug_snapshot_reflects_the_run() {
        let sink = RecordingSink::new();
        let mining = session(EasySource::new(true), sink.clone());

        let idle = mining.debug_snapshot();
        assert_eq!(idle.state, "Idle");
        assert_eq!(idle.username, None);

        mining.start(Credentials::new("alice", 2, 2)).unwrap();
        sink.wait_for("Mining service started.");
        let running = mining.debug_snapshot();
        assert_eq!(running.username.as_deref(), Some("alice"));
        assert_eq!(running.workers, 4);

        mining.stop();
        assert_eq!(mining.debug_snapshot().state, "Stopped");
    }
}
