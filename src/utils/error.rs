// src/utils/error.rs
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the mining engine
///
/// This enum represents all error conditions the engine distinguishes.
/// Transient variants (network, protocol, rate limiting) are retried with
/// bounded backoff by the session; everything else either fails a call
/// synchronously or ends the session.
#[derive(Error, Debug)]
pub enum MinerError {
    /// Bad credentials or parameters, rejected before any work starts
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Transient connectivity failure (connect, timeout, HTTP 5xx)
    #[error("network error: {0}")]
    Network(String),

    /// Malformed or invalid data from the job server
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Server asked for backoff; carries the delay to honor
    #[error("rate limited by server, retry after {}s", .0.as_secs())]
    RateLimited(Duration),

    /// A worker thread failed; isolated unless every worker faults
    #[error("worker fault: {0}")]
    WorkerFault(String),

    /// Operation not permitted in the session's current state
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// Configuration file or parameter errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Thread communication channel errors
    #[error("channel error: {0}")]
    Channel(String),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl MinerError {
    /// True for errors the session absorbs and retries with backoff
    /// rather than failing outright
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MinerError::Network(_) | MinerError::Protocol(_) | MinerError::RateLimited(_)
        )
    }
}

/// Converts HTTP client errors into MinerError
///
/// Body-decode failures mean the server answered with something other than
/// the expected JSON and are classified as protocol violations; everything
/// else (DNS, connect, timeout) is a network error.
impl From<reqwest::Error> for MinerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            MinerError::Protocol(format!("undecodable server response: {}", e))
        } else {
            MinerError::Network(e.to_string())
        }
    }
}

/// Converts JSON serialization/deserialization errors into MinerError
impl From<serde_json::Error> for MinerError {
    fn from(e: serde_json::Error) -> Self {
        MinerError::Protocol(format!("JSON error: {}", e))
    }
}

/// Converts crossbeam channel send errors into MinerError
///
/// Raised when the receiving side of an inter-thread channel has gone away.
impl<T> From<crossbeam_channel::SendError<T>> for MinerError {
    fn from(e: crossbeam_channel::SendError<T>) -> Self {
        MinerError::Channel(format!("send failed: {}", e))
    }
}
