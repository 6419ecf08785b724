//! # Bayeux Client - Session Engine for JSON Pub/Sub Brokers
//!
//! A client-side Bayeux session engine: transport negotiation, handshake,
//! long-poll connection maintenance, channel-based message routing, and
//! server-advised reconnection.
//!
//! ## Features
//!
//! - **Transport negotiation**: client preference order matched against the
//!   broker's `supportedConnectionTypes`, with live swap on re-handshake
//! - **Session lifecycle**: handshake/connect/disconnect state machine with
//!   advice-driven reconnect scheduling
//! - **Channel routing**: exact, `/a/*` and `/a/**` wildcard subscriptions
//!   with deterministic dispatch order
//! - **Extension pipeline**: ordered message filters with veto and fault
//!   isolation
//! - **Single-writer concurrency**: one driver task owns all protocol
//!   state; the public API is callable from any thread
//!
//! ## Protocol Overview
//!
//! Bayeux is a JSON publish/subscribe protocol. A session is negotiated on
//! `/meta/handshake`, kept alive with `/meta/connect` long-polls, and torn
//! down with `/meta/disconnect`; application channels carry the payload
//! traffic.
//!
//! ### Architecture
//!
//! ```text
//!  user API                    driver task                 transport
//!     |                            |                           |
//!     |-- handshake/publish/... -->|                           |
//!     |        (events)            |--- outgoing extensions -->|
//!     |                            |                           |== broker
//!     |                            |<-- incoming extensions ---|
//!     |   channel listeners <------|                           |
//!     |   (dispatch)               |-- advice -> timers        |
//! ```
//!
//! ### State Machine
//!
//! ```text
//!                     handshake()
//!  [Disconnected] ─────────────────────> [Handshaking]
//!         ^                                   │
//!         │ failed reply /                    │ successful reply
//!         │ advice: handshake, none           v
//!         │                              [Connected] ──┐ connect reply
//!         │                                   │        │ (advice: retry)
//!         │ reply or timeout                  │ <──────┘
//!  [Disconnecting] <──────────────────────────┘
//!                          disconnect()
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bayeux_client::{BayeuxClient, Config, Message};
//!
//! let client = BayeuxClient::new(Config::default());
//! client.register_transport(Arc::new(MyLongPollingTransport::new(url)));
//! client.handshake()?;
//!
//! // Subscribe; the /meta/subscribe round-trip happens once connected
//! let chat = client.channel("/chat/rust")?;
//! chat.subscribe(Arc::new(|message: &Message| {
//!     println!("<- {:?}", message.data());
//!     Ok(())
//! }));
//!
//! // Publish (never leaks the clientId on the wire)
//! chat.publish(serde_json::json!({"text": "hello"}))?;
//!
//! // Batch several messages into one transport send
//! client.batch(|| {
//!     let _ = chat.publish(serde_json::json!({"n": 1}));
//!     let _ = chat.publish(serde_json::json!({"n": 2}));
//! });
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: message envelope, channel identifiers, advice
//! - [`channel`]: channel and subscriber registries, wildcard dispatch
//! - [`transport`]: transport contract and negotiation registry
//! - [`extension`]: inbound/outbound filter pipeline
//! - [`session`]: the client session engine and public API
//! - [`config`]: configuration management
//! - [`error`]: error types and result alias

pub mod channel;
pub mod config;
pub mod error;
pub mod extension;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use channel::{Channel, ChannelRegistry, MessageListener, MetaChannelRegistry};
pub use config::Config;
pub use error::{BayeuxError, Result};
pub use extension::{Extension, ExtensionPipeline};
pub use protocol::{
    Advice, ChannelId, ChannelKind, Message, MetaChannel, ReconnectAction, BAYEUX_VERSION,
};
pub use session::{
    BayeuxClient, ClientChannel, ErrorListener, SessionState, SubscribeCallback,
};
pub use transport::{
    ClientTransport, ListenerSet, TransportListener, TransportRegistry, TransportState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
