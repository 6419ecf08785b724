//! Extension pipeline for inbound and outbound messages.
//!
//! Extensions are user-supplied filters invoked in registration order for
//! both directions. Each hook may pass the message on (possibly
//! transformed), veto it, or fail; a failing extension is isolated and
//! acts as identity so that one faulty extension can never poison the
//! session.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::protocol::Message;

/// A message filter with hooks for each direction and message class.
///
/// Every hook takes the message by value and returns:
/// - `Ok(Some(message))`: pass it on, possibly transformed
/// - `Ok(None)`: veto, dropping the message and skipping remaining extensions
/// - `Err(_)`: fault, logged; the unmodified message proceeds
///
/// The default implementations pass every message through unchanged.
pub trait Extension: Send + Sync {
    /// Inbound application message
    fn incoming(&self, message: Message) -> Result<Option<Message>> {
        Ok(Some(message))
    }

    /// Outbound application message
    fn outgoing(&self, message: Message) -> Result<Option<Message>> {
        Ok(Some(message))
    }

    /// Inbound meta message
    fn incoming_meta(&self, message: Message) -> Result<Option<Message>> {
        Ok(Some(message))
    }

    /// Outbound meta message
    fn outgoing_meta(&self, message: Message) -> Result<Option<Message>> {
        Ok(Some(message))
    }
}

#[derive(Debug, Clone, Copy)]
enum Hook {
    Incoming,
    Outgoing,
    IncomingMeta,
    OutgoingMeta,
}

/// Ordered extension chain with copy-on-write registration.
///
/// Mutation swaps an `Arc` snapshot; traversals capture the snapshot once,
/// so an extension added mid-flight is not seen by in-flight messages.
pub struct ExtensionPipeline {
    extensions: RwLock<Arc<Vec<Arc<dyn Extension>>>>,
}

impl ExtensionPipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self {
            extensions: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Append an extension
    pub fn add(&self, extension: Arc<dyn Extension>) {
        let mut guard = self.extensions.write();
        let mut next = guard.as_ref().clone();
        next.push(extension);
        *guard = Arc::new(next);
    }

    /// Remove an extension by handle identity; returns whether it was present
    pub fn remove(&self, extension: &Arc<dyn Extension>) -> bool {
        let mut guard = self.extensions.write();
        let mut next = guard.as_ref().clone();
        let before = next.len();
        next.retain(|e| !Arc::ptr_eq(e, extension));
        let removed = next.len() != before;
        if removed {
            *guard = Arc::new(next);
        }
        removed
    }

    /// Number of registered extensions
    pub fn len(&self) -> usize {
        self.extensions.read().len()
    }

    /// Whether the pipeline is empty
    pub fn is_empty(&self) -> bool {
        self.extensions.read().is_empty()
    }

    /// Run the inbound chain; `None` when the message was vetoed
    pub fn incoming(&self, message: Message, meta: bool) -> Option<Message> {
        let hook = if meta { Hook::IncomingMeta } else { Hook::Incoming };
        self.apply(message, hook)
    }

    /// Run the outbound chain; `None` when the message was vetoed
    pub fn outgoing(&self, message: Message, meta: bool) -> Option<Message> {
        let hook = if meta { Hook::OutgoingMeta } else { Hook::Outgoing };
        self.apply(message, hook)
    }

    fn apply(&self, mut message: Message, hook: Hook) -> Option<Message> {
        let snapshot = self.extensions.read().clone();
        for extension in snapshot.iter() {
            // Kept so a faulting extension can act as identity
            let fallback = message.clone();
            let result = match hook {
                Hook::Incoming => extension.incoming(message),
                Hook::Outgoing => extension.outgoing(message),
                Hook::IncomingMeta => extension.incoming_meta(message),
                Hook::OutgoingMeta => extension.outgoing_meta(message),
            };
            match result {
                Ok(Some(next)) => message = next,
                Ok(None) => {
                    tracing::debug!(
                        channel = fallback.channel().unwrap_or("<none>"),
                        hook = ?hook,
                        "extension vetoed message"
                    );
                    return None;
                }
                Err(error) => {
                    tracing::warn!(
                        %error,
                        hook = ?hook,
                        "extension failed, passing message through unchanged"
                    );
                    message = fallback;
                }
            }
        }
        Some(message)
    }
}

impl Default for ExtensionPipeline {
    fn default() -> Self {
        Self::new()
    }
}
