//! Event hub - typed multi-listener pub/sub registry
//!
//! Listeners are registered per [`MessageType`] and invoked in registration
//! order on [`EventHub::emit`]. The same listener may be registered more
//! than once; each registration is delivered independently.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::debug;

use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::message::{MessageType, MessageTypes};

/// Value bound to a registration and handed back on every delivery
pub type ListenerContext = Arc<dyn Any + Send + Sync>;

/// Callback invoked for each emitted event
pub type Listener = Arc<dyn Fn(&Event<'_>) + Send + Sync>;

/// What a listener sees when an event is emitted
pub struct Event<'a> {
    pub message_type: &'a MessageType,
    pub payload: &'a Value,
    /// Extra positional arguments passed to `emit`
    pub args: &'a [Value],
    context: Option<&'a ListenerContext>,
}

impl Event<'_> {
    /// The context bound at registration, downcast to `T`
    pub fn context<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.context.and_then(|ctx| ctx.downcast_ref::<T>())
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }
}

/// Wrap a closure as a [`Listener`]
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Event<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
struct Registration {
    listener: Listener,
    context: Option<ListenerContext>,
}

/// Multi-listener registry keyed by message type
pub struct EventHub {
    handlers: RwLock<HashMap<MessageType, Vec<Registration>>>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self::with_diagnostics(Arc::new(TracingDiagnostics))
    }

    pub fn with_diagnostics(diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            diagnostics,
        }
    }

    /// Register `listener` under every listed type
    pub fn on(&self, types: impl Into<MessageTypes>, listener: Listener, context: Option<ListenerContext>) {
        let types = types.into();
        if types.is_empty() {
            self.diagnostics.error("EventHub::on: at least one message type is required");
            return;
        }

        let Ok(mut handlers) = self.handlers.write() else {
            self.diagnostics.error("EventHub::on: registry lock poisoned");
            return;
        };
        for message_type in &types {
            debug!(%message_type, "EventHub::on: registering listener");
            handlers.entry(message_type.clone()).or_default().push(Registration {
                listener: listener.clone(),
                context: context.clone(),
            });
        }
    }

    /// Remove the first registration of `listener` under every listed type
    ///
    /// Types left without listeners are dropped from the registry. Unknown
    /// types and listeners are ignored.
    pub fn off(&self, types: impl Into<MessageTypes>, listener: &Listener) {
        let types = types.into();
        if types.is_empty() {
            self.diagnostics.error("EventHub::off: at least one message type is required");
            return;
        }

        let Ok(mut handlers) = self.handlers.write() else {
            self.diagnostics.error("EventHub::off: registry lock poisoned");
            return;
        };
        for message_type in &types {
            let Some(registrations) = handlers.get_mut(message_type) else {
                continue;
            };
            if let Some(index) = registrations
                .iter()
                .position(|r| Arc::ptr_eq(&r.listener, listener))
            {
                debug!(%message_type, "EventHub::off: removing listener");
                registrations.remove(index);
            }
            if registrations.is_empty() {
                handlers.remove(message_type);
            }
        }
    }

    /// True if at least one listener is registered for `message_type`
    pub fn has(&self, message_type: &MessageType) -> bool {
        self.listener_count(message_type) > 0
    }

    pub fn listener_count(&self, message_type: &MessageType) -> usize {
        self.handlers
            .read()
            .map(|h| h.get(message_type).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Invoke every listener for `message_type` in registration order
    ///
    /// A panicking listener is reported and skipped; the rest still run.
    /// Returns the number of listeners that completed normally.
    pub fn emit(&self, message_type: &MessageType, payload: &Value, args: &[Value]) -> usize {
        // Snapshot so listeners can call on/off without deadlocking
        let registrations = match self.handlers.read() {
            Ok(handlers) => match handlers.get(message_type) {
                Some(registrations) => registrations.clone(),
                None => return 0,
            },
            Err(_) => {
                self.diagnostics.error("EventHub::emit: registry lock poisoned");
                return 0;
            }
        };

        debug!(%message_type, listeners = registrations.len(), "EventHub::emit");
        let mut delivered = 0;
        for registration in &registrations {
            let event = Event {
                message_type,
                payload,
                args,
                context: registration.context.as_ref(),
            };
            match catch_unwind(AssertUnwindSafe(|| (registration.listener)(&event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    self.diagnostics
                        .error(&format!("EventHub::emit: listener for {} panicked: {}", message_type, reason));
                }
            }
        }
        delivered
    }
}
