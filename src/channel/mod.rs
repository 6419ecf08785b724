//! Channel and subscriber registries.
//!
//! Channels are stored flat, keyed by name; wildcard patterns are only
//! evaluated at dispatch time. Listener lists are copy-on-write so that
//! subscription changes made while a message is being delivered never
//! affect the in-flight delivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::error::Result;
use crate::protocol::{ChannelId, ChannelKind, Message, MetaChannel};

/// A subscriber callback.
///
/// Errors are logged and isolated: a failing listener never affects other
/// listeners or the session.
pub trait MessageListener: Send + Sync {
    /// Called once per delivery with the routed message
    fn on_message(&self, message: &Message) -> Result<()>;
}

impl<F> MessageListener for F
where
    F: Fn(&Message) -> Result<()> + Send + Sync,
{
    fn on_message(&self, message: &Message) -> Result<()> {
        self(message)
    }
}

/// A channel with its subscriber set.
pub struct Channel {
    id: ChannelId,
    seq: u64,
    listeners: RwLock<Arc<Vec<Arc<dyn MessageListener>>>>,
}

impl Channel {
    fn new(id: ChannelId, seq: u64) -> Self {
        Self {
            id,
            seq,
            listeners: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// The channel identifier
    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    /// Add a listener; idempotent by handle identity.
    ///
    /// Returns `true` when this registration made the listener set
    /// non-empty (the caller then owes the broker a subscribe).
    pub fn add_listener(&self, listener: Arc<dyn MessageListener>) -> bool {
        let mut guard = self.listeners.write();
        if guard.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }
        let was_empty = guard.is_empty();
        let mut next = guard.as_ref().clone();
        next.push(listener);
        *guard = Arc::new(next);
        was_empty
    }

    /// Remove one registration by handle identity.
    ///
    /// Returns `true` when this removal emptied the listener set.
    pub fn remove_listener(&self, listener: &Arc<dyn MessageListener>) -> bool {
        let mut guard = self.listeners.write();
        let mut next = guard.as_ref().clone();
        let before = next.len();
        next.retain(|l| !Arc::ptr_eq(l, listener));
        if next.len() == before {
            return false;
        }
        let now_empty = next.is_empty();
        *guard = Arc::new(next);
        now_empty
    }

    /// Whether any listener is registered
    pub fn has_listeners(&self) -> bool {
        !self.listeners.read().is_empty()
    }

    fn contains(&self, listener: &Arc<dyn MessageListener>) -> bool {
        self.listeners.read().iter().any(|l| Arc::ptr_eq(l, listener))
    }

    /// Deliver a message to the current subscribers.
    ///
    /// Iterates a snapshot, so a listener added during delivery is not
    /// seen; each listener's live membership is re-checked, so one removed
    /// during delivery is not invoked further.
    pub(crate) fn deliver(&self, message: &Message) {
        let snapshot = self.listeners.read().clone();
        for listener in snapshot.iter() {
            if !self.contains(listener) {
                continue;
            }
            if let Err(error) = listener.on_message(message) {
                tracing::warn!(
                    channel = self.id.name(),
                    %error,
                    "listener failed while handling message"
                );
            }
        }
    }
}

/// Canonical storage of channels, keyed by name.
pub struct ChannelRegistry {
    channels: DashMap<String, Arc<Channel>>,
    next_seq: AtomicU64,
}

impl ChannelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Look up a channel by name, optionally creating it.
    ///
    /// The name is validated; invalid names error out.
    pub fn get(&self, name: &str, create: bool) -> Result<Option<Arc<Channel>>> {
        let id = ChannelId::parse(name)?;
        if let Some(existing) = self.channels.get(id.name()) {
            return Ok(Some(existing.clone()));
        }
        if !create {
            return Ok(None);
        }
        let channel = self
            .channels
            .entry(id.name().to_owned())
            .or_insert_with(|| {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                Arc::new(Channel::new(id, seq))
            })
            .clone();
        Ok(Some(channel))
    }

    /// All channels matching a concrete channel, most specific first:
    /// the exact channel, then `/p/*` patterns, then `/p/**` patterns.
    /// Within a bucket the order is registration order.
    pub fn matching(&self, concrete: &ChannelId) -> Vec<Arc<Channel>> {
        let mut result = Vec::new();
        if let Some(exact) = self.channels.get(concrete.name()) {
            result.push(exact.clone());
        }

        let mut singles: Vec<Arc<Channel>> = Vec::new();
        let mut deeps: Vec<Arc<Channel>> = Vec::new();
        for entry in self.channels.iter() {
            let channel = entry.value();
            match channel.id().kind() {
                ChannelKind::SingleWildcard if channel.id().matches(concrete) => {
                    singles.push(channel.clone());
                }
                ChannelKind::DeepWildcard if channel.id().matches(concrete) => {
                    deeps.push(channel.clone());
                }
                _ => {}
            }
        }
        singles.sort_by_key(|c| c.seq);
        deeps.sort_by_key(|c| c.seq);

        result.extend(singles);
        result.extend(deeps);
        result
    }

    /// Channels that currently have subscribers, in registration order
    pub fn with_listeners(&self) -> Vec<Arc<Channel>> {
        let mut channels: Vec<Arc<Channel>> = self
            .channels
            .iter()
            .filter(|entry| entry.value().has_listeners())
            .map(|entry| entry.value().clone())
            .collect();
        channels.sort_by_key(|c| c.seq);
        channels
    }

    /// Number of stored channels
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The five meta channels, pre-built and indexed by kind.
///
/// Meta subscribers receive the raw reply message for their kind.
pub struct MetaChannelRegistry {
    channels: [Arc<Channel>; 5],
}

impl MetaChannelRegistry {
    /// Build the registry with all five meta channels
    pub fn new() -> Self {
        let channels = MetaChannel::ALL.map(|kind| {
            let id = ChannelId::parse(kind.channel_name())
                .unwrap_or_else(|_| unreachable!("meta channel names are valid"));
            Arc::new(Channel::new(id, kind as u64))
        });
        Self { channels }
    }

    /// The channel for a meta kind
    pub fn channel(&self, kind: MetaChannel) -> &Arc<Channel> {
        &self.channels[kind as usize]
    }

    /// Deliver a reply to the subscribers of its meta kind
    pub fn notify(&self, kind: MetaChannel, message: &Message) {
        self.channel(kind).deliver(message);
    }
}

impl Default for MetaChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
