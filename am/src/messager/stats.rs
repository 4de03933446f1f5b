//! Request statistics

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of the monotonic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Requests passed to invoke
    pub total: u64,
    /// Inbound messages counted as handled
    pub success: u64,
    /// Requests rejected by their timeout
    pub timeout: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    total: AtomicU64,
    success: AtomicU64,
    timeout: AtomicU64,
}

impl Counters {
    pub(crate) fn record_sent(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> Statistics {
        Statistics {
            total: self.total.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            timeout: self.timeout.load(Ordering::Relaxed),
        }
    }
}
