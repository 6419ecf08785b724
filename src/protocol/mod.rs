//! Bayeux wire model: messages, channels, and advice.
//!
//! Implements the Bayeux 1.0 message envelope and the channel naming rules
//! used by the session engine for routing and lifecycle control.
//!
//! # Protocol Overview
//!
//! Bayeux is a JSON publish/subscribe protocol organized around channels.
//! A small set of reserved `/meta/*` channels drives the session lifecycle;
//! everything else is an application channel.
//!
//! ## Message Flow
//!
//! ```text
//! Client                              Broker
//!    |                                   |
//!    |---- /meta/handshake (version) -->|  Negotiate transport, get clientId
//!    |<--- handshake reply (clientId) --|
//!    |                                   |
//!    |---- /meta/connect -------------->|  Long-poll heartbeat
//!    |<--- connect reply (advice) ------|  Server advises when to reconnect
//!    |                                   |
//!    |---- /meta/subscribe (channel) -->|  Register interest
//!    |<==== application messages =======|  Routed to channel subscribers
//!    |                                   |
//!    |---- /meta/disconnect ----------->|  Terminate session
//! ```
//!
//! ## Channels
//!
//! | Shape            | Example  | Matches                      |
//! |------------------|----------|------------------------------|
//! | exact            | `/a/b`   | only `/a/b`                  |
//! | single wildcard  | `/a/*`   | `/a/x` (one extra segment)   |
//! | deep wildcard    | `/a/**`  | `/a/x`, `/a/x/y`, ...        |
//!
//! A published message's channel is always exact; wildcards exist only on
//! the subscription side.
//!
//! ## Advice
//!
//! Every meta reply may carry an `advice` object telling the client how to
//! proceed: `{reconnect: "retry"|"handshake"|"none", interval, timeout}`.
//! The session engine caches the latest advice and acts on it after each
//! meta reply.

mod channel;
mod message;

pub use channel::{ChannelId, ChannelKind, MetaChannel};
pub use message::{
    Advice, Message, ReconnectAction, ADVICE_FIELD, CHANNEL_FIELD, CLIENT_ID_FIELD,
    CONNECTION_TYPE_FIELD, DATA_FIELD, ERROR_FIELD, EXT_FIELD, ID_FIELD, MINIMUM_VERSION_FIELD,
    SUBSCRIPTION_FIELD, SUCCESSFUL_FIELD, SUPPORTED_CONNECTION_TYPES_FIELD, VERSION_FIELD,
};

/// Bayeux protocol version spoken by this client
pub const BAYEUX_VERSION: &str = "1.0";

/// Oldest protocol version this client accepts from a broker
pub const MINIMUM_BAYEUX_VERSION: &str = "1.0";

/// Channel prefix reserved for protocol control
pub const META_PREFIX: &str = "/meta/";
