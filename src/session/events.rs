// src/session/events.rs
//! Host-facing event channel
//!
//! The session reports progress to its host through an injected
//! [`EventSink`]. Internally events are structured ([`MinerEvent`]); at
//! the boundary they become the human-readable strings the host displays.
//! The literal `"STOPPED"` string is reserved: it is the one terminal
//! signal a host may key its own state on, and it is always the last
//! event of a session lifecycle.

use std::fmt;

/// Reserved terminal event string, always the final event of a session
///
/// Hosts compare against this exact literal, so it must never change.
pub const STOPPED_EVENT: &str = "STOPPED";

/// Output channel the session reports progress through
///
/// Implemented by the host and injected at session construction. The
/// session guarantees ordering: all events for one submission happen
/// before the next unit's events, and the terminal event happens after
/// every other event, exactly once per lifecycle.
pub trait EventSink: Send + Sync {
    /// Delivers one progress message to the host
    fn emit(&self, message: &str);

    /// Delivers the terminal signal
    ///
    /// The default forwards the [`STOPPED_EVENT`] sentinel through
    /// [`EventSink::emit`], which suits hosts with a single string
    /// channel.
    fn emit_terminal(&self) {
        self.emit(STOPPED_EVENT);
    }
}

/// Structured progress event, rendered to a boundary string on emission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MinerEvent {
    /// First job fetched, the session is live
    Started,
    /// A worker solved the current unit; submission follows
    Solved,
    /// The server accepted the submitted solution
    Accepted,
    /// The server rejected the submitted solution; a fresh unit is fetched
    Rejected,
    /// A transient failure; the operation will be retried
    Retry {
        /// Operation that failed ("Job fetch", "Solution submit")
        what: &'static str,
        /// Failed attempts so far, starting at 1
        attempt: u32,
        /// Attempts allowed before the session fails
        budget: u32,
        /// Human-readable cause
        reason: String,
    },
    /// Unrecoverable error; the terminal event follows immediately
    Fatal {
        /// Human-readable cause
        reason: String,
    },
}

impl fmt::Display for MinerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinerEvent::Started => write!(f, "Mining service started."),
            MinerEvent::Solved => write!(f, "Block solved! Submitting..."),
            MinerEvent::Accepted => write!(f, "Solution accepted"),
            MinerEvent::Rejected => write!(f, "Solution rejected, retrying"),
            MinerEvent::Retry {
                what,
                attempt,
                budget,
                reason,
            } => write!(f, "{} failed (attempt {}/{}): {}", what, attempt, budget, reason),
            MinerEvent::Fatal { reason } => write!(f, "Mining failed: {}", reason),
        }
    }
}
