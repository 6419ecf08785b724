//! Session lifecycle and the public client API.
//!
//! [`BayeuxClient`] is a cheap-to-clone handle. All protocol state is
//! mutated by a single driver task; API calls validate synchronously,
//! enqueue an event, and return. Transports and timers feed the same
//! event queue, so every state change is serialized.
//!
//! # State Machine
//!
//! | State           | Description                        | Valid Transitions             |
//! |-----------------|------------------------------------|-------------------------------|
//! | `Disconnected`  | No session; handshake possible     | → Handshaking                 |
//! | `Handshaking`   | Handshake sent, awaiting reply     | → Connected, Disconnected     |
//! | `Connected`     | Session established, long-polling  | → Disconnecting, Disconnected, Handshaking |
//! | `Disconnecting` | Disconnect sent, awaiting reply    | → Disconnected                |
//!
//! # Usage
//!
//! ```rust,ignore
//! use bayeux_client::{BayeuxClient, Config};
//!
//! let client = BayeuxClient::new(Config::default());
//! client.register_transport(my_transport);
//! client.handshake()?;
//!
//! let chat = client.channel("/chat/rust")?;
//! chat.subscribe(std::sync::Arc::new(|message: &bayeux_client::Message| {
//!     println!("got {:?}", message.data());
//!     Ok(())
//! }));
//! chat.publish(serde_json::json!({"text": "hello"}))?;
//! ```

mod driver;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::channel::{Channel, ChannelRegistry, MessageListener, MetaChannelRegistry};
use crate::config::Config;
use crate::error::{BayeuxError, Result};
use crate::extension::{Extension, ExtensionPipeline};
use crate::protocol::{Message, MetaChannel};
use crate::transport::{ClientTransport, TransportRegistry};

use driver::{Event, SessionDriver};

/// Completion callback for a subscribe/unsubscribe round-trip.
///
/// Receives `Ok(())` on acknowledgement or the broker's error string.
pub type SubscribeCallback = Box<dyn FnOnce(std::result::Result<(), String>) + Send + 'static>;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// No session with the broker
    Disconnected = 0,
    /// Handshake sent, reply outstanding
    Handshaking = 1,
    /// Session established
    Connected = 2,
    /// Disconnect sent, reply outstanding
    Disconnecting = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Handshaking,
            2 => SessionState::Connected,
            3 => SessionState::Disconnecting,
            _ => SessionState::Disconnected,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Handshaking => "handshaking",
            SessionState::Connected => "connected",
            SessionState::Disconnecting => "disconnecting",
        };
        name.fmt(f)
    }
}

/// Observer for session-level failures.
///
/// Receives protocol violations, transport failures and unsuccessful meta
/// replies that are not tied to a specific callback.
pub trait ErrorListener: Send + Sync {
    /// Called with the failure and the triggering message, when there is one
    fn on_session_error(&self, error: &BayeuxError, message: Option<&Message>);
}

impl<F> ErrorListener for F
where
    F: Fn(&BayeuxError, Option<&Message>) + Send + Sync,
{
    fn on_session_error(&self, error: &BayeuxError, message: Option<&Message>) {
        self(error, message)
    }
}

/// Shared state readable from any thread; mutated only by the driver.
pub(crate) struct Shared {
    pub(crate) config: Config,
    state: AtomicU8,
    client_id: RwLock<Option<String>>,
    pub(crate) channels: ChannelRegistry,
    pub(crate) meta_channels: MetaChannelRegistry,
    pub(crate) transports: TransportRegistry,
    pub(crate) extensions: ExtensionPipeline,
    error_listeners: RwLock<Arc<Vec<Arc<dyn ErrorListener>>>>,
    events: mpsc::UnboundedSender<Event>,
}

impl Shared {
    pub(crate) fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, next: SessionState) {
        let previous = self.state.swap(next as u8, Ordering::AcqRel);
        let previous = SessionState::from_u8(previous);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "session state change");
        }
    }

    fn try_transition(&self, from: SessionState, to: SessionState) -> Result<()> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|current| {
                BayeuxError::InvalidState(format!(
                    "expected {from}, session is {}",
                    SessionState::from_u8(current)
                ))
            })?;
        tracing::debug!(from = %from, to = %to, "session state change");
        Ok(())
    }

    pub(crate) fn client_id(&self) -> Option<String> {
        self.client_id.read().clone()
    }

    pub(crate) fn set_client_id(&self, client_id: Option<String>) {
        *self.client_id.write() = client_id;
    }

    fn post(&self, event: Event) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| BayeuxError::InvalidState("session driver stopped".to_string()))
    }

    pub(crate) fn notify_error(&self, error: &BayeuxError, message: Option<&Message>) {
        let snapshot = self.error_listeners.read().clone();
        for listener in snapshot.iter() {
            listener.on_session_error(error, message);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Timer tasks hold sender clones, so the queue does not close on
        // its own; tell the driver directly that the last handle is gone.
        let _ = self.events.send(Event::Shutdown);
    }
}

/// A Bayeux client session.
///
/// Handles are cheap clones of one underlying session. Dropping the last
/// handle shuts the driver down and destroys any bound transport.
#[derive(Clone)]
pub struct BayeuxClient {
    shared: Arc<Shared>,
}

impl BayeuxClient {
    /// Create a client and spawn its driver task.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(config: Config) -> Self {
        let (events, inbox) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            config,
            state: AtomicU8::new(SessionState::Disconnected as u8),
            client_id: RwLock::new(None),
            channels: ChannelRegistry::new(),
            meta_channels: MetaChannelRegistry::new(),
            transports: TransportRegistry::new(),
            extensions: ExtensionPipeline::new(),
            error_listeners: RwLock::new(Arc::new(Vec::new())),
            events: events.clone(),
        });

        let driver = SessionDriver::new(Arc::downgrade(&shared), inbox, events);
        tokio::spawn(driver.run());

        Self { shared }
    }

    /// Register a transport; registration order is preference order
    pub fn register_transport(&self, transport: Arc<dyn ClientTransport>) {
        self.shared.transports.add(transport);
    }

    /// Initiate the handshake.
    ///
    /// Only legal while disconnected; the session moves to `Handshaking`
    /// before this returns and the request is sent asynchronously.
    pub fn handshake(&self) -> Result<()> {
        self.shared
            .try_transition(SessionState::Disconnected, SessionState::Handshaking)?;
        self.shared.post(Event::Handshake { scheduled: false })
    }

    /// Terminate the session.
    ///
    /// Legal from any state except `Disconnected`. Cancels any pending
    /// reconnect; if the broker's reply does not arrive within the
    /// configured disconnect timeout the session is torn down anyway.
    pub fn disconnect(&self) -> Result<()> {
        if self.shared.state() == SessionState::Disconnected {
            return Err(BayeuxError::InvalidState(
                "cannot disconnect, session is disconnected".to_string(),
            ));
        }
        self.shared.post(Event::Disconnect)
    }

    /// The current session state
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// The broker-assigned client id, once connected
    pub fn client_id(&self) -> Option<String> {
        self.shared.client_id()
    }

    /// Look up (or create) an application channel.
    ///
    /// Meta channels are reserved; use [`meta_channel`](Self::meta_channel)
    /// to observe them.
    pub fn channel(&self, name: &str) -> Result<ClientChannel> {
        // Validate before touching the registry so a rejected name never
        // creates a stray entry
        if crate::protocol::ChannelId::parse(name)?.is_meta() {
            return Err(BayeuxError::InvalidChannel(format!(
                "{name} is a meta channel"
            )));
        }
        let channel = self
            .shared
            .channels
            .get(name, true)?
            .ok_or_else(|| BayeuxError::InvalidChannel(name.to_string()))?;
        Ok(ClientChannel {
            shared: self.shared.clone(),
            channel,
        })
    }

    /// The observer channel for a meta kind.
    ///
    /// Listeners added here receive the raw reply messages for that kind.
    pub fn meta_channel(&self, kind: MetaChannel) -> Arc<Channel> {
        self.shared.meta_channels.channel(kind).clone()
    }

    /// Append an extension to the pipeline
    pub fn add_extension(&self, extension: Arc<dyn Extension>) {
        self.shared.extensions.add(extension);
    }

    /// Remove an extension; returns whether it was registered
    pub fn remove_extension(&self, extension: &Arc<dyn Extension>) -> bool {
        self.shared.extensions.remove(extension)
    }

    /// Register a session-level error listener
    pub fn add_error_listener(&self, listener: Arc<dyn ErrorListener>) {
        let mut guard = self.shared.error_listeners.write();
        let mut next = guard.as_ref().clone();
        next.push(listener);
        *guard = Arc::new(next);
    }

    /// Run `work` with transport flushes deferred.
    ///
    /// Messages produced while the batch is open are handed to the
    /// transport as a single batch when the outermost `batch` call ends.
    pub fn batch<R>(&self, work: impl FnOnce() -> R) -> R {
        let _ = self.shared.post(Event::BatchBegin);
        let result = work();
        let _ = self.shared.post(Event::BatchEnd);
        result
    }
}

/// Handle over one application channel.
pub struct ClientChannel {
    shared: Arc<Shared>,
    channel: Arc<Channel>,
}

impl ClientChannel {
    /// The channel name
    pub fn name(&self) -> &str {
        self.channel.id().name()
    }

    /// Subscribe a listener.
    ///
    /// Local registration is immediate and idempotent; the first listener
    /// on the channel triggers one `/meta/subscribe` round-trip (deferred
    /// until the session is connected).
    pub fn subscribe(&self, listener: Arc<dyn MessageListener>) {
        self.subscribe_inner(listener, None)
    }

    /// Subscribe with a completion callback for the broker round-trip.
    ///
    /// A rejected subscribe keeps the local registration; the callback
    /// receives the broker's error.
    pub fn subscribe_with(&self, listener: Arc<dyn MessageListener>, callback: SubscribeCallback) {
        self.subscribe_inner(listener, Some(callback))
    }

    fn subscribe_inner(&self, listener: Arc<dyn MessageListener>, callback: Option<SubscribeCallback>) {
        let first = self.channel.add_listener(listener);
        if first {
            let _ = self.shared.post(Event::Subscribe {
                channel: self.name().to_owned(),
                callback,
            });
        } else if let Some(callback) = callback {
            // Already subscribed at the broker; nothing left to wait for
            callback(Ok(()));
        }
    }

    /// Remove a listener; the last removal triggers `/meta/unsubscribe`
    pub fn unsubscribe(&self, listener: &Arc<dyn MessageListener>) {
        self.unsubscribe_inner(listener, None)
    }

    /// Remove a listener, with a completion callback for the round-trip
    pub fn unsubscribe_with(&self, listener: &Arc<dyn MessageListener>, callback: SubscribeCallback) {
        self.unsubscribe_inner(listener, Some(callback))
    }

    fn unsubscribe_inner(&self, listener: &Arc<dyn MessageListener>, callback: Option<SubscribeCallback>) {
        let last = self.channel.remove_listener(listener);
        if last {
            let _ = self.shared.post(Event::Unsubscribe {
                channel: self.name().to_owned(),
                callback,
            });
        } else if let Some(callback) = callback {
            callback(Ok(()));
        }
    }

    /// Publish data on this channel.
    ///
    /// Requires a connected session. The wire message never carries a
    /// `clientId`.
    pub fn publish(&self, data: Value) -> Result<()> {
        if self.shared.state() != SessionState::Connected {
            return Err(BayeuxError::InvalidState(format!(
                "cannot publish while {}",
                self.shared.state()
            )));
        }
        self.shared.post(Event::Publish {
            channel: self.name().to_owned(),
            data,
        })
    }
}
