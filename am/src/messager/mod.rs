//! Correlation engine
//!
//! Turns one-way sends into awaitable request/response calls.

mod config;
mod core;
mod options;
mod stats;

pub use config::MessagerConfig;
pub use core::Messager;
pub use options::{InvokeOptions, TIMEOUT_MESSAGE};
pub use stats::Statistics;
