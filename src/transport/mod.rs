//! Transport layer abstraction for the Bayeux client.
//!
//! The session engine is transport-agnostic: concrete carriers
//! (long-polling HTTP, WebSocket, in-process test doubles) implement
//! [`ClientTransport`] and hand results back through a
//! [`TransportListener`]. The engine binds exactly one transport at a
//! time and swaps it when a handshake renegotiates the connection type.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              BayeuxClient                │
//! │         (Transport-Agnostic)            │
//! └──────────────────┬──────────────────────┘
//!                    │ negotiate(version, offered)
//!          ┌────────┴────────┐
//!          ▼                 ▼
//! ┌─────────────────┐ ┌─────────────────┐
//! │  long-polling   │ │    websocket    │
//! │   (HTTP/1.1)    │ │  (full duplex)  │
//! └─────────────────┘ └─────────────────┘
//! ```
//!
//! `send` is an enqueue: blocking I/O belongs to transport-owned tasks,
//! and both delivered batches and failures come back asynchronously via
//! the registered listeners.

mod registry;

pub use registry::TransportRegistry;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::BayeuxError;
use crate::protocol::Message;

/// Callbacks a transport uses to surface results.
pub trait TransportListener: Send + Sync {
    /// A batch of messages arrived from the broker
    fn on_messages(&self, messages: &[Message]);

    /// A send failed; `attempted` holds the messages that were in flight
    fn on_failure(&self, cause: &BayeuxError, attempted: &[Message]);
}

/// Contract a concrete message carrier must fulfill.
///
/// Lifecycle: a transport starts uninitialized, is `init`ed when bound to
/// the session, and `destroy`ed when unbound. Only one transport is bound
/// at a time.
pub trait ClientTransport: Send + Sync {
    /// Wire name, e.g. `long-polling` or `websocket`
    fn name(&self) -> &str;

    /// Whether this transport can speak the given Bayeux version
    fn supports_version(&self, version: &str) -> bool;

    /// Prepare the transport for use
    fn init(&self);

    /// Release the transport's resources; terminal
    fn destroy(&self);

    /// Enqueue a batch for delivery to the broker.
    ///
    /// Must not block: results arrive through the listeners.
    fn send(&self, messages: Vec<Message>);

    /// Register a listener for inbound batches and failures
    fn add_listener(&self, listener: Arc<dyn TransportListener>);

    /// Remove a previously registered listener
    fn remove_listener(&self, listener: &Arc<dyn TransportListener>);

    /// Create an empty message bound to this transport's conventions
    fn new_message(&self) -> Message {
        Message::new()
    }
}

/// Transport lifecycle states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportState {
    /// Constructed but not yet bound
    #[default]
    Uninitialized,
    /// Bound to the session and ready to send
    Initialized,
    /// Unbound and released; terminal
    Destroyed,
}

/// Copy-on-write listener fan-out, for transport implementors.
///
/// Keeps the add/remove/notify bookkeeping out of each concrete
/// transport.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Arc<Vec<Arc<dyn TransportListener>>>>,
}

impl ListenerSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Add a listener; idempotent by handle identity
    pub fn add(&self, listener: Arc<dyn TransportListener>) {
        let mut guard = self.listeners.write();
        if guard.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return;
        }
        let mut next = guard.as_ref().clone();
        next.push(listener);
        *guard = Arc::new(next);
    }

    /// Remove a listener by handle identity
    pub fn remove(&self, listener: &Arc<dyn TransportListener>) {
        let mut guard = self.listeners.write();
        let mut next = guard.as_ref().clone();
        next.retain(|l| !Arc::ptr_eq(l, listener));
        *guard = Arc::new(next);
    }

    /// Deliver a batch to every listener
    pub fn notify_messages(&self, messages: &[Message]) {
        let snapshot = self.listeners.read().clone();
        for listener in snapshot.iter() {
            listener.on_messages(messages);
        }
    }

    /// Report a failure to every listener
    pub fn notify_failure(&self, cause: &BayeuxError, attempted: &[Message]) {
        let snapshot = self.listeners.read().clone();
        for listener in snapshot.iter() {
            listener.on_failure(cause, attempted);
        }
    }

    /// Whether any listener is registered
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}
