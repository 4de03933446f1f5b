//! Pending request table
//!
//! Holds one FIFO queue of outstanding requests per message type. An inbound
//! response is matched by request id first, then by scope, then by taking
//! the head of the queue.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{MessagerError, Result};
use crate::message::MessageType;

/// Outcome delivered to a pending request's completion callback
pub type Completion = Result<Value>;

/// Callback run when a pending request is resolved or rejected
pub type OnComplete = Box<dyn FnOnce(Completion) + Send>;

static NEXT_TICKET: AtomicU64 = AtomicU64::new(1);

/// An outstanding request waiting for its response
pub struct PendingRequest {
    ticket: u64,
    request_id: Option<String>,
    scope: Option<String>,
    created_at: Instant,
    on_complete: OnComplete,
}

impl PendingRequest {
    pub fn new(request_id: Option<String>, scope: Option<String>, on_complete: OnComplete) -> Self {
        Self {
            ticket: NEXT_TICKET.fetch_add(1, Ordering::Relaxed),
            request_id,
            scope,
            created_at: Instant::now(),
            on_complete,
        }
    }

    /// Process-unique handle for this entry
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Run the completion callback, consuming the entry
    pub fn complete(self, outcome: Completion) {
        (self.on_complete)(outcome)
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("ticket", &self.ticket)
            .field("request_id", &self.request_id)
            .field("scope", &self.scope)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Outstanding requests partitioned by message type
#[derive(Debug, Default)]
pub struct PendingTable {
    queues: HashMap<MessageType, VecDeque<PendingRequest>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` to the queue for `message_type`
    ///
    /// Fails if another live entry under the same type carries the same
    /// request id.
    pub fn add(&mut self, message_type: MessageType, entry: PendingRequest) -> Result<()> {
        if let Some(request_id) = entry.request_id()
            && self.contains_id(&message_type, request_id)
        {
            return Err(MessagerError::DuplicateRequestId {
                message_type,
                request_id: request_id.to_string(),
            });
        }

        debug!(%message_type, request_id = ?entry.request_id, scope = ?entry.scope, "PendingTable::add");
        self.queues.entry(message_type).or_default().push_back(entry);
        Ok(())
    }

    /// Remove the entry an inbound response refers to
    ///
    /// A defined `request_id` is matched exactly and `scope` is ignored.
    /// Otherwise a defined `scope` is matched exactly. With neither, the
    /// oldest entry is taken.
    pub fn remove(
        &mut self,
        message_type: &MessageType,
        scope: Option<&str>,
        request_id: Option<&str>,
    ) -> Option<PendingRequest> {
        let queue = self.queues.get_mut(message_type)?;

        let entry = match (request_id, scope) {
            (Some(id), _) => {
                let index = queue.iter().position(|e| e.request_id() == Some(id))?;
                queue.remove(index)
            }
            (None, Some(scope)) => {
                let index = queue.iter().position(|e| e.scope() == Some(scope))?;
                queue.remove(index)
            }
            (None, None) => queue.pop_front(),
        };

        self.prune(message_type);
        entry
    }

    /// Remove the exact entry with `ticket`
    pub fn remove_ticket(&mut self, message_type: &MessageType, ticket: u64) -> Option<PendingRequest> {
        let queue = self.queues.get_mut(message_type)?;
        let index = queue.iter().position(|e| e.ticket == ticket)?;
        let entry = queue.remove(index);
        self.prune(message_type);
        entry
    }

    pub fn contains_id(&self, message_type: &MessageType, request_id: &str) -> bool {
        self.queues
            .get(message_type)
            .is_some_and(|q| q.iter().any(|e| e.request_id() == Some(request_id)))
    }

    /// Number of entries across all types
    pub fn len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Number of types with at least one entry
    pub fn type_count(&self) -> usize {
        self.queues.len()
    }

    /// Take every entry out of the table
    pub fn drain(&mut self) -> Vec<PendingRequest> {
        self.queues.drain().flat_map(|(_, q)| q).collect()
    }

    /// Take out every entry older than `max_age`
    pub fn sweep_expired(&mut self, max_age: Duration) -> Vec<PendingRequest> {
        let mut expired = Vec::new();
        for queue in self.queues.values_mut() {
            let (old, fresh): (VecDeque<_>, VecDeque<_>) = queue.drain(..).partition(|e| e.age() > max_age);
            *queue = fresh;
            expired.extend(old);
        }
        self.queues.retain(|_, q| !q.is_empty());
        if !expired.is_empty() {
            debug!(count = expired.len(), "PendingTable::sweep_expired: removed stale entries");
        }
        expired
    }

    fn prune(&mut self, message_type: &MessageType) {
        if self.queues.get(message_type).is_some_and(VecDeque::is_empty) {
            self.queues.remove(message_type);
        }
    }
}
