//! Per-call invoke options

use std::time::Duration;

use serde_json::{Map, Value, json};

/// Message used when a request times out
pub const TIMEOUT_MESSAGE: &str = "request timed out";

/// Options for a single [`Messager::invoke`](super::Messager::invoke)
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    /// Overrides the configured timeout; zero means "use the default"
    pub timeout: Option<Duration>,
    /// Send without waiting for a response
    pub send_only: bool,
    /// Merged over the default timeout body when the request times out
    pub fallback: Value,
    /// Extra positional arguments handed to the send operation
    pub args: Vec<Value>,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            send_only: false,
            fallback: json!({ "message": TIMEOUT_MESSAGE }),
            args: Vec::new(),
        }
    }
}

impl InvokeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_ms(self, ms: u64) -> Self {
        self.timeout(Duration::from_millis(ms))
    }

    pub fn send_only(mut self) -> Self {
        self.send_only = true;
        self
    }

    pub fn fallback(mut self, fallback: Value) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The effective timeout given the engine default
    pub(crate) fn effective_timeout(&self, default: Duration) -> Duration {
        match self.timeout {
            Some(t) if !t.is_zero() => t,
            _ => default,
        }
    }

    /// Body carried by a timeout rejection
    ///
    /// Object fallbacks are merged over `{"message": "request timed out"}`;
    /// anything else leaves the default body untouched.
    pub(crate) fn timeout_payload(&self) -> Value {
        let mut body = Map::new();
        body.insert("message".to_string(), Value::String(TIMEOUT_MESSAGE.to_string()));
        if let Value::Object(fallback) = &self.fallback {
            for (key, value) in fallback {
                body.insert(key.clone(), value.clone());
            }
        }
        Value::Object(body)
    }
}
