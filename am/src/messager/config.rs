//! Messager configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Engine-level settings, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MessagerConfig {
    /// Default request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Subscribe to the transport as soon as the messager is built
    #[serde(default = "default_true")]
    pub auto_subscribe: bool,

    /// Drop a timed-out request from the table so a late reply cannot match it
    #[serde(default = "default_true")]
    pub clear_timeout_requests: bool,

    /// Age after which pending entries are swept on the next invoke
    #[serde(default)]
    pub expired_time_ms: Option<u64>,

    /// Report timeouts through the diagnostic sink
    #[serde(default = "default_true")]
    pub enable_log: bool,

    /// Warn about inbound messages nobody consumed
    #[serde(default = "default_true")]
    pub log_unhandled_events: bool,

    /// Hooks win over the builtin operations
    #[serde(default = "default_true")]
    pub prefer_hooks: bool,
}

fn default_timeout_ms() -> u64 {
    debug!("default_timeout_ms: called");
    5000
}

fn default_true() -> bool {
    true
}

impl Default for MessagerConfig {
    fn default() -> Self {
        debug!("MessagerConfig::default: called");
        Self {
            timeout_ms: 5000,
            auto_subscribe: true,
            clear_timeout_requests: true,
            expired_time_ms: None,
            enable_log: true,
            log_unhandled_events: true,
            prefer_hooks: true,
        }
    }
}

impl MessagerConfig {
    /// Default request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Sweep age as a Duration, if sweeping is enabled
    pub fn expired_time(&self) -> Option<Duration> {
        self.expired_time_ms.map(Duration::from_millis)
    }
}
