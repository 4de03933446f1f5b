//! AsyncMessager - request/response over fire-and-forget transports
//!
//! A transport that can only send a message and deliver inbound messages
//! (a worker bridge, a window channel, a socket) has no idea which reply
//! belongs to which request. [`Messager`] adds that: `invoke` sends a
//! payload and waits for the matching response, with timeouts, scopes and
//! statistics. Every inbound message is also broadcast to an [`EventHub`],
//! so code that only observes message types can react to pushes.
//!
//! # Core Concepts
//!
//! - **Message type**: the key requests and responses are partitioned by
//! - **Request id**: exact correlation between a request and its response
//! - **Scope**: coarser correlation for one of several channels
//! - **FIFO fallback**: with neither, the oldest pending request wins
//!
//! # Modules
//!
//! - [`messager`] - Correlation engine
//! - [`hub`] - Typed multi-listener pub/sub
//! - [`pending`] - Pending request table
//! - [`strategy`] - Hooks and built-in operations
//! - [`delay`] - Cancellable timeout
//! - [`transport`] - Reference transports (in-process channels, Unix socket)
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use asyncmessager::{Hooks, InvokeOptions, Messager, MessagerConfig};
//! use asyncmessager::transport::channel;
//!
//! let (client, server) = channel::pair(64);
//! let messager = Messager::new(MessagerConfig::default(), Hooks::with_transport(Arc::new(client)));
//! let reply = messager.invoke(json!({"type": "ping"}), InvokeOptions::new()).await?;
//! ```

pub mod cli;
pub mod config;
pub mod delay;
pub mod diagnostics;
pub mod error;
pub mod hub;
pub mod message;
pub mod messager;
pub mod pending;
pub mod strategy;
pub mod transport;

pub use diagnostics::{Diagnostics, TracingDiagnostics};
pub use error::{MessagerError, Result};
pub use hub::{Event, EventHub, Listener, listener};
pub use message::{MessageType, MessageTypes};
pub use messager::{InvokeOptions, Messager, MessagerConfig, Statistics};
pub use strategy::{Hooks, Operation, Strategy};
pub use transport::Transport;
