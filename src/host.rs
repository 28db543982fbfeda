// src/host.rs
//! Process-wide host boundary
//!
//! The calling convention a host process (GUI shell, CLI, service
//! wrapper) uses to drive the engine: fire-and-forget start and stop,
//! plus a synchronous debug query. At most one session is live at a
//! time; starting another while one is active is rejected, not queued.
//!
//! Errors never surface through return values here. They are delivered
//! as messages on the injected [`EventSink`], and any failed start is
//! closed out with the terminal event so a host keyed on `"STOPPED"`
//! always unlatches.

use crate::config::MinerConfig;
use crate::network::job_client::{HttpJobClient, JobSource};
use crate::session::events::EventSink;
use crate::session::session::{DebugSnapshot, MiningSession};
use crate::types::Credentials;
use lazy_static::lazy_static;
use std::sync::{Arc, Mutex};

lazy_static! {
    /// The single live session slot for this process
    static ref ACTIVE_SESSION: Mutex<Option<Arc<MiningSession>>> = Mutex::new(None);
}

/// Starts mining with the default configuration
///
/// See [`start_mining_with`].
pub fn start_mining(sink: Arc<dyn EventSink>, username: &str, cores: usize, threads: usize) {
    start_mining_with(MinerConfig::default(), sink, username, cores, threads);
}

/// Starts a mining session against the configured job server
///
/// Fire-and-forget: validation and thread spawn happen synchronously and
/// quickly, the mining itself runs on background threads. All failures
/// are reported through `sink`.
///
/// # Arguments
/// * `config` - Networking and retry tuning
/// * `sink` - Channel progress events are delivered to
/// * `username` - Account credited for accepted solutions
/// * `cores` - CPU cores to mine on
/// * `threads` - Worker threads per core
pub fn start_mining_with(
    config: MinerConfig,
    sink: Arc<dyn EventSink>,
    username: &str,
    cores: usize,
    threads: usize,
) {
    let mut slot = lock_slot();
    if let Some(existing) = slot.as_ref() {
        if existing.is_active() {
            sink.emit("A mining session is already running");
            return;
        }
    }

    let job_source: Arc<dyn JobSource> = match HttpJobClient::new(&config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            sink.emit(&format!("Mining failed to start: {}", e));
            sink.emit_terminal();
            return;
        }
    };

    let session = Arc::new(MiningSession::new(config, job_source, sink.clone()));
    match session.start(Credentials::new(username, cores, threads)) {
        Ok(()) => *slot = Some(session),
        Err(e) => {
            sink.emit(&format!("Mining failed to start: {}", e));
            sink.emit_terminal();
        }
    }
}

/// Stops the live session, if any
///
/// Fire-and-forget: teardown (worker drain, control thread join) runs on
/// a detached thread; the terminal event signals completion to the host.
pub fn stop_mining() {
    let session = lock_slot().clone();
    if let Some(session) = session {
        let spawned = std::thread::Builder::new()
            .name("mining-stop".into())
            .spawn(move || session.stop());
        if let Err(e) = spawned {
            log::error!("failed to spawn stop thread: {}", e);
        }
    }
}

/// Synchronous, human-readable snapshot of the live session
///
/// Never blocks on the mining loop. With no session ever started it
/// reports an idle snapshot.
pub fn get_debug_info() -> String {
    let session = lock_slot().clone();
    let snapshot = match session {
        Some(session) => session.debug_snapshot(),
        None => DebugSnapshot::default(),
    };
    serde_json::to_string_pretty(&snapshot)
        .unwrap_or_else(|e| format!("{{ \"error\": \"failed to serialize debug info: {}\" }}", e))
}

/// Locks the session slot, recovering from a poisoned lock
///
/// The slot only holds an `Option<Arc>`; a panic while swapping it
/// cannot leave it inconsistent.
fn lock_slot() -> std::sync::MutexGuard<'static, Option<Arc<MiningSession>>> {
    match ACTIVE_SESSION.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
