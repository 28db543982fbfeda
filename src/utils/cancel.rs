// src/utils/cancel.rs
//! Cooperative cancellation token
//!
//! Workers and the session control loop never get terminated forcibly;
//! they poll a shared token at bounded intervals and wind down on their
//! own. One writer flips the flag, any number of readers observe it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Granularity at which [`CancelToken::sleep_unless_cancelled`] re-checks
/// the flag
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Shared cancellation flag polled cooperatively by worker threads
///
/// Cloning the token clones the handle, not the flag: all clones observe
/// the same cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh, uncancelled token
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Requests cancellation; observed by every clone of this token
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// True once cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Sleeps for `duration`, waking early on cancellation
    ///
    /// The sleep is sliced so a stop request never waits behind a long
    /// backoff delay.
    ///
    /// # Returns
    /// `true` if the full duration elapsed, `false` if cancellation cut
    /// the sleep short
    pub fn sleep_unless_cancelled(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        assert!(!CancelToken::new().is_cancelled());
    }

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn sleep_completes_when_uncancelled() {
        let token = CancelToken::new();
        assert!(token.sleep_unless_cancelled(Duration::from_millis(10)));
    }

    #[test]
    fn sleep_aborts_quickly_on_cancellation() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = std::thread::spawn(move || {
            let start = Instant::now();
            let completed = waiter.sleep_unless_cancelled(Duration::from_secs(30));
            (completed, start.elapsed())
        });
        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
        let (completed, elapsed) = handle.join().unwrap();
        assert!(!completed);
        assert!(elapsed < Duration::from_secs(2));
    }
}
