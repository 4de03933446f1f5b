//! Messager - request/response correlation over a one-way transport
//!
//! Outbound requests are registered in a [`PendingTable`] and raced against
//! a [`Delay`]. Inbound messages are broadcast to the [`EventHub`] and then
//! matched against the table.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::debug;

use super::config::MessagerConfig;
use super::options::InvokeOptions;
use super::stats::{Counters, Statistics};
use crate::delay::{Delay, DelayOutcome};
use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::error::{MessagerError, Result};
use crate::hub::{EventHub, Listener, ListenerContext};
use crate::message::{self, MessageType, MessageTypes, REQUEST_ID_FIELD};
use crate::pending::{Completion, PendingRequest, PendingTable};
use crate::strategy::{Hooks, InboundHandler, Operation, Strategy, Unsubscribe};

/// Correlation engine; clones share the same state
#[derive(Clone)]
pub struct Messager {
    inner: Arc<Inner>,
}

struct Inner {
    config: MessagerConfig,
    strategy: Strategy,
    hub: EventHub,
    table: Mutex<PendingTable>,
    counters: Counters,
    unsubscribe: Mutex<Option<Unsubscribe>>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let slot = self.unsubscribe.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(unsubscribe) = slot.take() {
            debug!("Messager: dropped while subscribed, unsubscribing");
            unsubscribe();
        }
    }
}

/// How the race between a response and the timer ended
enum Race {
    Completed(Completion),
    Dropped,
    Timer(DelayOutcome),
}

/// Drops an invoke's table entry unless disarmed
struct PendingGuard<'a> {
    table: &'a Mutex<PendingTable>,
    message_type: &'a MessageType,
    ticket: u64,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed && lock(self.table).remove_ticket(self.message_type, self.ticket).is_some() {
            debug!(message_type = %self.message_type, ticket = self.ticket, "Messager::invoke: removed pending entry");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Messager {
    /// Build a messager that reports through `tracing`
    pub fn new(config: MessagerConfig, hooks: Hooks) -> Self {
        Self::with_diagnostics(config, hooks, Arc::new(TracingDiagnostics))
    }

    pub fn with_diagnostics(config: MessagerConfig, hooks: Hooks, diagnostics: Arc<dyn Diagnostics>) -> Self {
        debug!(?config, ?hooks, "Messager::new: called");
        let strategy = Strategy::resolve(&hooks, config.prefer_hooks, diagnostics.as_ref());
        let messager = Self {
            inner: Arc::new(Inner {
                hub: EventHub::with_diagnostics(diagnostics.clone()),
                table: Mutex::new(PendingTable::new()),
                counters: Counters::default(),
                unsubscribe: Mutex::new(None),
                config,
                strategy,
                diagnostics,
            }),
        };

        if messager.inner.config.auto_subscribe
            && messager.inner.strategy.has(Operation::Subscribe)
            && let Err(e) = messager.subscribe()
        {
            messager
                .inner
                .diagnostics
                .error(&format!("Messager::new: subscribe failed: {}", e));
        }
        messager
    }

    pub fn config(&self) -> &MessagerConfig {
        &self.inner.config
    }

    /// Hand the inbound handler to the subscribe operation
    ///
    /// Does nothing if already subscribed.
    pub fn subscribe(&self) -> Result<()> {
        if self.is_subscribed() {
            debug!("Messager::subscribe: already subscribed");
            return Ok(());
        }

        let unsubscribe = self.inner.strategy.subscribe(self.inbound_handler())?;
        let mut slot = lock(&self.inner.unsubscribe);
        if slot.is_some() {
            // Lost a race with another subscribe; keep the first
            drop(slot);
            unsubscribe();
            return Ok(());
        }
        *slot = Some(unsubscribe);
        debug!("Messager::subscribe: subscribed");
        Ok(())
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.inner.unsubscribe).is_some()
    }

    /// Handler that feeds inbound messages into [`Messager::on_message`]
    ///
    /// Holds only a weak reference, so a transport keeping the handler does
    /// not keep the messager alive.
    pub fn inbound_handler(&self) -> InboundHandler {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        Arc::new(move |payload: Value| match weak.upgrade() {
            Some(inner) => Messager { inner }.on_message(payload),
            None => debug!("Messager::inbound_handler: messager gone, dropping message"),
        })
    }

    /// Pair a payload with its request id
    ///
    /// A string `requestId` already present is kept. When the field is
    /// missing an id is derived and written into the returned payload. A
    /// present field of another kind is left alone and yields no id.
    pub fn prepare_request(&self, mut payload: Value) -> (Value, Option<String>) {
        let existing = payload
            .get(REQUEST_ID_FIELD)
            .map(|value| value.as_str().map(String::from));
        match existing {
            Some(request_id) => (payload, request_id),
            None => {
                let request_id = self.inner.strategy.request_id(&payload);
                if let (Some(id), Value::Object(map)) = (&request_id, &mut payload) {
                    map.insert(REQUEST_ID_FIELD.to_string(), Value::String(id.clone()));
                }
                (payload, request_id)
            }
        }
    }

    /// Send `payload` and wait for the matching response
    ///
    /// Resolves with `None` for send-only calls. Otherwise resolves with the
    /// matched (post-processed) response, or fails with a timeout carrying
    /// the fallback body.
    pub async fn invoke(&self, payload: Value, options: InvokeOptions) -> Result<Option<Value>> {
        let inner = &self.inner;
        inner.counters.record_sent();

        if inner.config.clear_timeout_requests
            && let Some(max_age) = inner.config.expired_time()
        {
            self.sweep_expired(max_age);
        }

        let (payload, request_id) = self.prepare_request(payload);
        let timeout = options.effective_timeout(inner.config.timeout());
        let message_type = inner.strategy.request_type(&payload);
        debug!(?message_type, ?request_id, ?timeout, send_only = options.send_only, "Messager::invoke: called");

        if options.send_only {
            inner.strategy.request(&payload, request_id.as_deref(), &options.args)?;
            return Ok(None);
        }

        let Some(message_type) = message_type else {
            if inner.config.enable_log {
                inner
                    .diagnostics
                    .warn(&format!("Request has no usable message type: payload={}", payload));
            }
            return Err(MessagerError::MissingMessageType);
        };

        let delay = Arc::new(Delay::new(timeout));
        let (tx, mut rx) = oneshot::channel::<Completion>();
        let entry = PendingRequest::new(
            request_id.clone(),
            message::scope_of(&payload),
            Box::new({
                let delay = delay.clone();
                move |completion| {
                    // Deliver before cancelling so a cancelled timer always finds the result
                    let _ = tx.send(completion);
                    delay.cancel();
                }
            }),
        );
        let ticket = entry.ticket();
        lock(&inner.table).add(message_type.clone(), entry)?;
        // Removes the entry if this future is dropped before it resolves
        let mut guard = PendingGuard {
            table: &inner.table,
            message_type: &message_type,
            ticket,
            armed: true,
        };

        if let Err(e) = inner.strategy.request(&payload, request_id.as_deref(), &options.args) {
            debug!(%message_type, error = %e, "Messager::invoke: send failed, dropping pending entry");
            return Err(e);
        }

        let timer = delay.run();
        tokio::pin!(timer);
        let race = tokio::select! {
            biased;
            completion = &mut rx => match completion {
                Ok(completion) => Race::Completed(completion),
                Err(_) => Race::Dropped,
            },
            outcome = &mut timer => Race::Timer(outcome),
        };

        match race {
            Race::Completed(completion) => return completion.map(Some),
            // Swept from the table; the request's own timer still decides
            Race::Dropped => {
                timer.await;
            }
            Race::Timer(_) => match rx.try_recv() {
                Ok(completion) => return completion.map(Some),
                Err(TryRecvError::Closed) => {}
                Err(TryRecvError::Empty) => {
                    guard.armed = inner.config.clear_timeout_requests;
                    if inner.config.clear_timeout_requests
                        && lock(&inner.table).remove_ticket(&message_type, ticket).is_none()
                        && let Ok(completion) = rx.await
                    {
                        // A matcher took the entry first and delivered
                        return completion.map(Some);
                    }
                }
            },
        }

        drop(guard);
        inner.counters.record_timeout();
        if inner.config.enable_log {
            inner.diagnostics.info(&format!(
                "Request timed out: type={} request_id={} payload={}",
                message_type,
                request_id.as_deref().unwrap_or("-"),
                payload
            ));
        }

        Err(MessagerError::Timeout {
            message_type,
            request_id,
            payload: options.timeout_payload(),
        })
    }

    /// Process one inbound message from the transport
    ///
    /// Identity fields are read from the raw message, before the response
    /// hook runs. Listeners and the matched caller see the processed payload.
    pub fn on_message(&self, raw: Value) {
        let inner = &self.inner;
        let message_type = inner.strategy.response_type(&raw);
        let response_id = inner.strategy.response_id(&raw);
        let scope = inner.strategy.response_scope(&raw);
        debug!(?message_type, ?response_id, ?scope, "Messager::on_message: called");

        let payload = inner.strategy.on_response(message_type.as_ref(), raw);

        let Some(message_type) = message_type else {
            self.unhandled(None, response_id.as_deref(), None);
            return;
        };

        inner.hub.emit(&message_type, &payload, &[]);

        let entry = lock(&inner.table).remove(&message_type, scope.as_deref(), response_id.as_deref());
        if entry.is_none() && !inner.hub.has(&message_type) && inner.config.log_unhandled_events {
            self.unhandled(Some(&message_type), response_id.as_deref(), Some(&payload));
            return;
        }

        inner.counters.record_success();
        if let Some(entry) = entry {
            debug!(%message_type, ticket = entry.ticket(), "Messager::on_message: matched pending request");
            entry.complete(Ok(payload));
        }
    }

    fn unhandled(&self, message_type: Option<&MessageType>, response_id: Option<&str>, payload: Option<&Value>) {
        let inner = &self.inner;
        match message_type {
            Some(message_type) => inner.diagnostics.warn(&format!(
                "No pending request or listener for type={} request_id={} payload={}",
                message_type,
                response_id.unwrap_or("-"),
                payload.unwrap_or(&Value::Null)
            )),
            // Nothing to broadcast or match against
            None if inner.config.log_unhandled_events => {
                inner.diagnostics.warn("Inbound message has no message type")
            }
            None => inner.counters.record_success(),
        }
    }

    fn sweep_expired(&self, max_age: Duration) {
        let swept = lock(&self.inner.table).sweep_expired(max_age);
        if !swept.is_empty() {
            debug!(count = swept.len(), ?max_age, "Messager::sweep_expired: dropped stale requests");
        }
    }

    /// Register a listener for the given types
    pub fn on(&self, types: impl Into<MessageTypes>, listener: Listener, context: Option<ListenerContext>) {
        self.inner.hub.on(types, listener, context)
    }

    pub fn off(&self, types: impl Into<MessageTypes>, listener: &Listener) {
        self.inner.hub.off(types, listener)
    }

    pub fn has(&self, message_type: &MessageType) -> bool {
        self.inner.hub.has(message_type)
    }

    pub fn hub(&self) -> &EventHub {
        &self.inner.hub
    }

    pub fn statistics(&self) -> Statistics {
        self.inner.counters.snapshot()
    }

    /// Number of requests waiting for a response
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.table).len()
    }

    /// Unsubscribe and reject every pending request with `Destroyed`
    ///
    /// Only acts while subscribed, so repeated calls are no-ops.
    pub fn destroy(&self) {
        let Some(unsubscribe) = lock(&self.inner.unsubscribe).take() else {
            debug!("Messager::destroy: not subscribed");
            return;
        };
        unsubscribe();

        let drained = lock(&self.inner.table).drain();
        debug!(pending = drained.len(), "Messager::destroy: rejecting pending requests");
        for entry in drained {
            entry.complete(Err(MessagerError::Destroyed));
        }
    }
}

impl std::fmt::Debug for Messager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messager")
            .field("config", &self.inner.config)
            .field("subscribed", &self.is_subscribed())
            .field("pending", &self.pending_count())
            .field("statistics", &self.statistics())
            .finish()
    }
}
