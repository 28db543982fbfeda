// src/network/mod.rs
//! Network communication components
//!
//! This module handles all interaction with the remote job server. It
//! provides:
//! - `JobSource`: the trait the session mines against
//! - `HttpJobClient`: the HTTP(S)+JSON adapter used in production
//! - `Backoff`: the bounded exponential retry schedule
//!
//! Network calls happen exclusively on the session's control thread;
//! hash workers never block on I/O.

/// Job server client implementation
///
/// Fetches work units, submits solutions and reports hashrate over
/// HTTP(S) with JSON payloads.
pub mod job_client;

/// Bounded exponential backoff schedule for transient failures
pub mod backoff;

// Re-export main components for cleaner imports
pub use backoff::Backoff;
pub use job_client::{HttpJobClient, JobSource};
