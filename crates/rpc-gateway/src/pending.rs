//! Pending-call registry pairing outbound request ids with waiters.
//!
//! Every outbound request inserts an entry here before it hits the wire.
//! The dispatcher completes or fails the entry from the pump task, the
//! watchdog evicts stale entries, and the disconnect path drains whatever
//! is left. Each waiter is signalled exactly once: the terminal transition
//! removes the entry and fires its oneshot in one step.

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{GatewayError, GatewayResult};
use crate::transport::MessageId;

/// Receiver half handed to the caller awaiting a response.
pub type CallReceiver = oneshot::Receiver<GatewayResult<Value>>;

struct PendingCall {
    tx: oneshot::Sender<GatewayResult<Value>>,
    created_at: Instant,
}

/// Registry of requests awaiting their correlated responses.
pub struct PendingCallRegistry {
    calls: scc::HashMap<MessageId, PendingCall>,
}

impl PendingCallRegistry {
    pub fn new() -> Self {
        Self {
            calls: scc::HashMap::new(),
        }
    }

    /// Register a new pending call.
    ///
    /// Returns `None` if the id is already pending; ids are allocated by a
    /// strictly increasing counter, so this only trips after a 32-bit wrap
    /// onto a still-outstanding call.
    pub fn insert(&self, id: MessageId) -> Option<CallReceiver> {
        let (tx, rx) = oneshot::channel();
        let call = PendingCall {
            tx,
            created_at: Instant::now(),
        };
        if self.calls.insert(id, call).is_err() {
            return None;
        }
        Some(rx)
    }

    /// Complete a pending call with a response value.
    ///
    /// Returns `true` if the call was still pending.
    pub fn complete(&self, id: MessageId, result: Value) -> bool {
        if let Some((_, call)) = self.calls.remove(&id) {
            let _ = call.tx.send(Ok(result));
            return true;
        }
        false
    }

    /// Fail a pending call.
    ///
    /// Returns `true` if the call was still pending.
    pub fn fail(&self, id: MessageId, error: GatewayError) -> bool {
        if let Some((_, call)) = self.calls.remove(&id) {
            let _ = call.tx.send(Err(error));
            return true;
        }
        false
    }

    /// Abandon a pending call without signalling the waiter.
    ///
    /// Used when the send itself failed and the caller already holds the
    /// error.
    pub fn remove(&self, id: MessageId) -> bool {
        self.calls.remove(&id).is_some()
    }

    /// Fail every call older than `threshold` with [`GatewayError::Timedout`].
    ///
    /// Returns the number of evicted calls.
    pub fn evict_older_than(&self, threshold: Duration) -> usize {
        let now = Instant::now();
        let mut expired = Vec::new();
        self.calls.retain(|id, call| {
            if now.duration_since(call.created_at) > threshold {
                expired.push(*id);
            }
            true
        });

        let mut evicted = 0;
        for id in expired {
            if self.fail(id, GatewayError::Timedout) {
                evicted += 1;
            }
        }
        evicted
    }

    /// Fail every outstanding call with the given error.
    ///
    /// Called on connection loss and on disconnect.
    pub fn fail_all(&self, error: GatewayError) {
        let mut ids = Vec::new();
        self.calls.retain(|id, _| {
            ids.push(*id);
            true
        });
        for id in ids {
            self.fail(id, error);
        }
    }

    /// Number of outstanding calls.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether no calls are outstanding.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl Default for PendingCallRegistry {
    fn default() -> Self {
        Self::new()
    }
}
