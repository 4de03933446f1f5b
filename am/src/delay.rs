//! Single-shot cancellable delay
//!
//! Used to race a request's timeout against its response. A delay can be
//! run once; cancelling it before it elapses makes `run` return
//! [`DelayOutcome::Cancelled`] instead of [`DelayOutcome::Elapsed`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

/// How a call to [`Delay::run`] finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayOutcome {
    /// The full duration passed without a cancel
    Elapsed,
    /// `cancel` was called before the duration passed
    Cancelled,
    /// `run` had already been called on this delay
    AlreadyStarted,
}

/// A timer that can be started once and cancelled before it fires
#[derive(Debug)]
pub struct Delay {
    duration: Duration,
    started: AtomicBool,
    cancelled: AtomicBool,
    notify: Notify,
}

impl Delay {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Wait for the delay to elapse or be cancelled
    ///
    /// Only the first call waits. Later calls return `AlreadyStarted`
    /// immediately and leave the running timer alone.
    pub async fn run(&self) -> DelayOutcome {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Delay::run: already started");
            return DelayOutcome::AlreadyStarted;
        }
        if self.cancelled.load(Ordering::SeqCst) {
            return DelayOutcome::Cancelled;
        }

        tokio::select! {
            _ = tokio::time::sleep(self.duration) => {
                // A cancel that lands in the same tick still wins
                if self.cancelled.load(Ordering::SeqCst) {
                    DelayOutcome::Cancelled
                } else {
                    DelayOutcome::Elapsed
                }
            }
            _ = self.notify.notified() => DelayOutcome::Cancelled,
        }
    }

    /// Prevent a pending `run` from elapsing; harmless to repeat
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!(duration_ms = self.duration.as_millis() as u64, "Delay::cancel: cancelled");
            // notify_one stores a permit, so a cancel before the first poll is not lost
            self.notify.notify_one();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
