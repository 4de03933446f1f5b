//! Strategy resolution for the extensible operations
//!
//! Every operation the messager performs on a payload (deriving ids, types
//! and scopes, post-processing responses, subscribing and sending) comes
//! from one of two sources: caller-supplied [`Hooks`] or the built-in
//! defaults. A [`Strategy`] picks one implementation per operation, once,
//! when the messager is constructed.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::diagnostics::Diagnostics;
use crate::error::{MessagerError, Result};
use crate::message::{self, MessageType};
use crate::transport::Transport;

/// Handler the transport calls for every inbound message
pub type InboundHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Teardown returned by a subscribe operation
pub type Unsubscribe = Box<dyn FnOnce() + Send>;

pub type SubscribeFn = Arc<dyn Fn(InboundHandler) -> Result<Unsubscribe> + Send + Sync>;
pub type RequestFn = Arc<dyn Fn(&Value, Option<&str>, &[Value]) -> Result<()> + Send + Sync>;
pub type IdFn = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;
pub type TypeFn = Arc<dyn Fn(&Value) -> Option<MessageType> + Send + Sync>;
pub type ScopeFn = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;
pub type OnResponseFn = Arc<dyn Fn(Option<&MessageType>, Value) -> Value + Send + Sync>;

/// The extensible operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Subscribe,
    RequestId,
    RequestType,
    ResponseId,
    ResponseType,
    ResponseScope,
    OnResponse,
    Request,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::Subscribe,
        Operation::RequestId,
        Operation::RequestType,
        Operation::ResponseId,
        Operation::ResponseType,
        Operation::ResponseScope,
        Operation::OnResponse,
        Operation::Request,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Subscribe => "subscribe",
            Operation::RequestId => "request_id",
            Operation::RequestType => "request_type",
            Operation::ResponseId => "response_id",
            Operation::ResponseType => "response_type",
            Operation::ResponseScope => "response_scope",
            Operation::OnResponse => "on_response",
            Operation::Request => "request",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Caller-supplied implementations; every field is optional
#[derive(Clone, Default)]
pub struct Hooks {
    pub subscribe: Option<SubscribeFn>,
    pub request_id: Option<IdFn>,
    pub request_type: Option<TypeFn>,
    pub response_id: Option<IdFn>,
    pub response_type: Option<TypeFn>,
    pub response_scope: Option<ScopeFn>,
    pub on_response: Option<OnResponseFn>,
    pub request: Option<RequestFn>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default behaviors: field readers and uuid ids, no transport
    pub fn builtin() -> Self {
        Self {
            subscribe: None,
            request_id: Some(Arc::new(|_: &Value| Some(message::new_request_id()))),
            request_type: Some(Arc::new(message::message_type_of)),
            response_id: Some(Arc::new(message::request_id_of)),
            response_type: Some(Arc::new(message::message_type_of)),
            response_scope: Some(Arc::new(message::scope_of)),
            on_response: Some(Arc::new(|_: Option<&MessageType>, payload: Value| payload)),
            request: None,
        }
    }

    /// Hooks whose subscribe and request operations go through `transport`
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        let sub = transport.clone();
        Self::new()
            .subscribe(move |handler| sub.subscribe(handler))
            .request(move |payload, request_id, args| transport.send(payload, request_id, args))
    }

    pub fn subscribe<F>(mut self, f: F) -> Self
    where
        F: Fn(InboundHandler) -> Result<Unsubscribe> + Send + Sync + 'static,
    {
        self.subscribe = Some(Arc::new(f));
        self
    }

    pub fn request<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, Option<&str>, &[Value]) -> Result<()> + Send + Sync + 'static,
    {
        self.request = Some(Arc::new(f));
        self
    }

    pub fn request_id<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        self.request_id = Some(Arc::new(f));
        self
    }

    pub fn request_type<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Option<MessageType> + Send + Sync + 'static,
    {
        self.request_type = Some(Arc::new(f));
        self
    }

    pub fn response_id<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        self.response_id = Some(Arc::new(f));
        self
    }

    pub fn response_type<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Option<MessageType> + Send + Sync + 'static,
    {
        self.response_type = Some(Arc::new(f));
        self
    }

    pub fn response_scope<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        self.response_scope = Some(Arc::new(f));
        self
    }

    pub fn on_response<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&MessageType>, Value) -> Value + Send + Sync + 'static,
    {
        self.on_response = Some(Arc::new(f));
        self
    }

    /// True if this source provides `op`
    pub fn provides(&self, op: Operation) -> bool {
        match op {
            Operation::Subscribe => self.subscribe.is_some(),
            Operation::RequestId => self.request_id.is_some(),
            Operation::RequestType => self.request_type.is_some(),
            Operation::ResponseId => self.response_id.is_some(),
            Operation::ResponseType => self.response_type.is_some(),
            Operation::ResponseScope => self.response_scope.is_some(),
            Operation::OnResponse => self.on_response.is_some(),
            Operation::Request => self.request.is_some(),
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let provided: Vec<_> = Operation::ALL.iter().filter(|op| self.provides(**op)).collect();
        f.debug_struct("Hooks").field("provided", &provided).finish()
    }
}

/// One resolved implementation per operation
#[derive(Clone)]
pub struct Strategy {
    resolved: Hooks,
}

impl Strategy {
    /// Pick an implementation for every operation
    ///
    /// With `prefer_hooks` the caller's hooks win and the builtins fill the
    /// gaps; without it the builtins win and hooks only supply what has no
    /// builtin. Operations missing from both are reported and left absent.
    pub fn resolve(hooks: &Hooks, prefer_hooks: bool, diagnostics: &dyn Diagnostics) -> Self {
        let builtin = Hooks::builtin();
        let (primary, secondary) = if prefer_hooks {
            (hooks, &builtin)
        } else {
            (&builtin, hooks)
        };

        fn pick<T: Clone>(
            op: Operation,
            primary: &Option<T>,
            secondary: &Option<T>,
            diagnostics: &dyn Diagnostics,
        ) -> Option<T> {
            let found = primary.clone().or_else(|| secondary.clone());
            if found.is_none() {
                diagnostics.error(&format!(
                    "Operation {} could not be resolved; supply it through Hooks",
                    op
                ));
            }
            found
        }

        let resolved = Hooks {
            subscribe: pick(Operation::Subscribe, &primary.subscribe, &secondary.subscribe, diagnostics),
            request_id: pick(Operation::RequestId, &primary.request_id, &secondary.request_id, diagnostics),
            request_type: pick(Operation::RequestType, &primary.request_type, &secondary.request_type, diagnostics),
            response_id: pick(Operation::ResponseId, &primary.response_id, &secondary.response_id, diagnostics),
            response_type: pick(
                Operation::ResponseType,
                &primary.response_type,
                &secondary.response_type,
                diagnostics,
            ),
            response_scope: pick(
                Operation::ResponseScope,
                &primary.response_scope,
                &secondary.response_scope,
                diagnostics,
            ),
            on_response: pick(Operation::OnResponse, &primary.on_response, &secondary.on_response, diagnostics),
            request: pick(Operation::Request, &primary.request, &secondary.request, diagnostics),
        };
        debug!(?resolved, prefer_hooks, "Strategy::resolve: resolved");

        Self { resolved }
    }

    pub fn has(&self, op: Operation) -> bool {
        self.resolved.provides(op)
    }

    pub fn request_id(&self, payload: &Value) -> Option<String> {
        self.resolved.request_id.as_ref().and_then(|f| f(payload))
    }

    pub fn request_type(&self, payload: &Value) -> Option<MessageType> {
        self.resolved.request_type.as_ref().and_then(|f| f(payload))
    }

    pub fn response_id(&self, payload: &Value) -> Option<String> {
        self.resolved.response_id.as_ref().and_then(|f| f(payload))
    }

    pub fn response_type(&self, payload: &Value) -> Option<MessageType> {
        self.resolved.response_type.as_ref().and_then(|f| f(payload))
    }

    pub fn response_scope(&self, payload: &Value) -> Option<String> {
        self.resolved.response_scope.as_ref().and_then(|f| f(payload))
    }

    /// Post-process an inbound payload; passes it through when absent
    pub fn on_response(&self, message_type: Option<&MessageType>, payload: Value) -> Value {
        match &self.resolved.on_response {
            Some(f) => f(message_type, payload),
            None => payload,
        }
    }

    pub fn subscribe(&self, handler: InboundHandler) -> Result<Unsubscribe> {
        match &self.resolved.subscribe {
            Some(f) => f(handler),
            None => Err(MessagerError::NotImplemented(Operation::Subscribe)),
        }
    }

    pub fn request(&self, payload: &Value, request_id: Option<&str>, args: &[Value]) -> Result<()> {
        match &self.resolved.request {
            Some(f) => f(payload, request_id, args),
            None => Err(MessagerError::NotImplemented(Operation::Request)),
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy").field("resolved", &self.resolved).finish()
    }
}
