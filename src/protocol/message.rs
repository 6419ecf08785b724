//! Bayeux message envelope.
//!
//! A message is an open JSON object; fields the protocol does not know
//! about are preserved verbatim. Messages start out mutable and are frozen
//! with their serialized JSON text before they reach a transport.

use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::channel::MetaChannel;
use super::{BAYEUX_VERSION, META_PREFIX, MINIMUM_BAYEUX_VERSION};
use crate::error::{BayeuxError, Result};

/// `channel` field name
pub const CHANNEL_FIELD: &str = "channel";
/// `clientId` field name
pub const CLIENT_ID_FIELD: &str = "clientId";
/// `id` field name
pub const ID_FIELD: &str = "id";
/// `successful` field name
pub const SUCCESSFUL_FIELD: &str = "successful";
/// `subscription` field name
pub const SUBSCRIPTION_FIELD: &str = "subscription";
/// `data` field name
pub const DATA_FIELD: &str = "data";
/// `ext` field name
pub const EXT_FIELD: &str = "ext";
/// `advice` field name
pub const ADVICE_FIELD: &str = "advice";
/// `supportedConnectionTypes` field name
pub const SUPPORTED_CONNECTION_TYPES_FIELD: &str = "supportedConnectionTypes";
/// `version` field name
pub const VERSION_FIELD: &str = "version";
/// `minimumVersion` field name
pub const MINIMUM_VERSION_FIELD: &str = "minimumVersion";
/// `connectionType` field name
pub const CONNECTION_TYPE_FIELD: &str = "connectionType";
/// `error` field name
pub const ERROR_FIELD: &str = "error";

/// A Bayeux message.
///
/// Wraps a JSON object with typed accessors for the recognized fields.
/// Once [`freeze`](Message::freeze)d the message rejects mutation and
/// remembers the exact JSON text it was serialized to.
pub struct Message {
    fields: Map<String, Value>,
    json: OnceLock<String>,
    associated: RwLock<Option<Weak<Message>>>,
}

impl Message {
    /// Create an empty mutable message
    pub fn new() -> Self {
        Self::from_fields(Map::new())
    }

    /// Create a message from an existing field map
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            json: OnceLock::new(),
            associated: RwLock::new(None),
        }
    }

    // === Constructors for the wire shapes ===

    /// Build a `/meta/handshake` request
    pub fn handshake(supported_connection_types: &[String]) -> Self {
        let mut message = Self::new();
        message.fields.insert(
            CHANNEL_FIELD.into(),
            MetaChannel::Handshake.channel_name().into(),
        );
        message
            .fields
            .insert(VERSION_FIELD.into(), BAYEUX_VERSION.into());
        message
            .fields
            .insert(MINIMUM_VERSION_FIELD.into(), MINIMUM_BAYEUX_VERSION.into());
        message.fields.insert(
            SUPPORTED_CONNECTION_TYPES_FIELD.into(),
            Value::Array(
                supported_connection_types
                    .iter()
                    .map(|t| Value::String(t.clone()))
                    .collect(),
            ),
        );
        message
    }

    /// Build a `/meta/connect` request
    pub fn connect(client_id: &str, connection_type: &str) -> Self {
        let mut message = Self::new();
        message.fields.insert(
            CHANNEL_FIELD.into(),
            MetaChannel::Connect.channel_name().into(),
        );
        message
            .fields
            .insert(CLIENT_ID_FIELD.into(), client_id.into());
        message
            .fields
            .insert(CONNECTION_TYPE_FIELD.into(), connection_type.into());
        message
    }

    /// Build a `/meta/disconnect` request
    pub fn disconnect(client_id: &str) -> Self {
        let mut message = Self::new();
        message.fields.insert(
            CHANNEL_FIELD.into(),
            MetaChannel::Disconnect.channel_name().into(),
        );
        message
            .fields
            .insert(CLIENT_ID_FIELD.into(), client_id.into());
        message
    }

    /// Build a `/meta/subscribe` request
    pub fn subscribe(client_id: &str, subscription: &str) -> Self {
        let mut message = Self::new();
        message.fields.insert(
            CHANNEL_FIELD.into(),
            MetaChannel::Subscribe.channel_name().into(),
        );
        message
            .fields
            .insert(CLIENT_ID_FIELD.into(), client_id.into());
        message
            .fields
            .insert(SUBSCRIPTION_FIELD.into(), subscription.into());
        message
    }

    /// Build a `/meta/unsubscribe` request
    pub fn unsubscribe(client_id: &str, subscription: &str) -> Self {
        let mut message = Self::new();
        message.fields.insert(
            CHANNEL_FIELD.into(),
            MetaChannel::Unsubscribe.channel_name().into(),
        );
        message
            .fields
            .insert(CLIENT_ID_FIELD.into(), client_id.into());
        message
            .fields
            .insert(SUBSCRIPTION_FIELD.into(), subscription.into());
        message
    }

    /// Build an application publish.
    ///
    /// Publish messages never carry a `clientId`.
    pub fn publish(channel: &str, data: Value) -> Self {
        let mut message = Self::new();
        message.fields.insert(CHANNEL_FIELD.into(), channel.into());
        message.fields.insert(DATA_FIELD.into(), data);
        message
    }

    // === Mutation ===

    /// Set a field, returning the previous value
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Option<Value>> {
        if self.is_frozen() {
            return Err(BayeuxError::FrozenMessage);
        }
        Ok(self.fields.insert(key.into(), value.into()))
    }

    /// Remove a field, returning its value
    pub fn remove(&mut self, key: &str) -> Result<Option<Value>> {
        if self.is_frozen() {
            return Err(BayeuxError::FrozenMessage);
        }
        Ok(self.fields.remove(key))
    }

    // === Freezing ===

    /// Tag the message with its serialized JSON text.
    ///
    /// One-shot: freezing an already frozen message is an error. A frozen
    /// message rejects all mutation.
    pub fn freeze(&self, json: String) -> Result<()> {
        self.json
            .set(json)
            .map_err(|_| BayeuxError::FrozenMessage)
    }

    /// Whether the message has been frozen
    pub fn is_frozen(&self) -> bool {
        self.json.get().is_some()
    }

    /// The JSON text: the frozen tag if present, serialized on demand otherwise
    pub fn to_json(&self) -> Result<String> {
        match self.json.get() {
            Some(json) => Ok(json.clone()),
            None => Ok(serde_json::to_string(&self.fields)?),
        }
    }

    /// Deserialize a single message from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let fields: Map<String, Value> = serde_json::from_str(json)?;
        Ok(Self::from_fields(fields))
    }

    /// Parse a wire payload: a JSON array of messages or a single object
    pub fn parse_batch(json: &str) -> Result<Vec<Self>> {
        match serde_json::from_str::<Value>(json)? {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(fields) => Ok(Self::from_fields(fields)),
                    other => Err(BayeuxError::Protocol(format!(
                        "expected message object, got {other}"
                    ))),
                })
                .collect(),
            Value::Object(fields) => Ok(vec![Self::from_fields(fields)]),
            other => Err(BayeuxError::Protocol(format!(
                "expected message array or object, got {other}"
            ))),
        }
    }

    // === Accessors ===

    /// Raw field lookup
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Whether the field is present
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// The full field map
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// The `channel` field
    pub fn channel(&self) -> Option<&str> {
        self.get_str(CHANNEL_FIELD)
    }

    /// The `clientId` field
    pub fn client_id(&self) -> Option<&str> {
        self.get_str(CLIENT_ID_FIELD)
    }

    /// The `id` field
    pub fn id(&self) -> Option<&str> {
        self.get_str(ID_FIELD)
    }

    /// The `subscription` field
    pub fn subscription(&self) -> Option<&str> {
        self.get_str(SUBSCRIPTION_FIELD)
    }

    /// The `error` field
    pub fn error(&self) -> Option<&str> {
        self.get_str(ERROR_FIELD)
    }

    /// The `connectionType` field
    pub fn connection_type(&self) -> Option<&str> {
        self.get_str(CONNECTION_TYPE_FIELD)
    }

    /// Whether the message is a reply with `successful: true`
    pub fn is_successful(&self) -> bool {
        self.fields
            .get(SUCCESSFUL_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The `data` field (read-only view)
    pub fn data(&self) -> Option<&Value> {
        self.fields.get(DATA_FIELD)
    }

    /// The `ext` field (read-only view)
    pub fn ext(&self) -> Option<&Value> {
        self.fields.get(EXT_FIELD)
    }

    /// The raw `advice` field (read-only view)
    pub fn advice_value(&self) -> Option<&Value> {
        self.fields.get(ADVICE_FIELD)
    }

    /// The `advice` field parsed into [`Advice`]
    pub fn advice(&self) -> Option<Advice> {
        self.advice_value()
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// The `supportedConnectionTypes` field
    pub fn supported_connection_types(&self) -> Vec<String> {
        self.fields
            .get(SUPPORTED_CONNECTION_TYPES_FIELD)
            .and_then(Value::as_array)
            .map(|types| {
                types
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the channel is a `/meta/*` channel
    pub fn is_meta(&self) -> bool {
        self.channel().is_some_and(|c| c.starts_with(META_PREFIX))
    }

    /// The meta channel kind, when the channel is one of the five meta channels
    pub fn meta_channel(&self) -> Option<MetaChannel> {
        self.channel().and_then(MetaChannel::from_name)
    }

    // === Associated message ===

    /// Link this reply back to the request it answers.
    ///
    /// A weak back-reference: correlation must not keep the request alive.
    pub fn set_associated(&self, request: &Arc<Message>) {
        *self.associated.write() = Some(Arc::downgrade(request));
    }

    /// The request this reply answers, if still within its correlation window
    pub fn associated(&self) -> Option<Arc<Message>> {
        self.associated.read().as_ref().and_then(Weak::upgrade)
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Message {
    fn clone(&self) -> Self {
        let json = OnceLock::new();
        if let Some(text) = self.json.get() {
            let _ = json.set(text.clone());
        }
        Self {
            fields: self.fields.clone(),
            json,
            associated: RwLock::new(self.associated.read().clone()),
        }
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("fields", &self.fields)
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let fields = Map::deserialize(deserializer)?;
        Ok(Self::from_fields(fields))
    }
}

/// Server reconnect advice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    /// Reconnect action: `retry`, `handshake` or `none`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<String>,
    /// Delay before the next connect attempt, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<i64>,
    /// Server-side long-poll hold time, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
}

impl Advice {
    /// The parsed reconnect action; `None` for an unrecognized action string
    pub fn action(&self) -> Option<ReconnectAction> {
        match self.reconnect.as_deref() {
            // Absent reconnect means the Bayeux default
            None => Some(ReconnectAction::Retry),
            Some(value) => ReconnectAction::parse(value),
        }
    }

    /// Interval in milliseconds, negatives clamped to zero
    pub fn interval_or(&self, default_ms: u64) -> u64 {
        match self.interval {
            Some(interval) => interval.max(0) as u64,
            None => default_ms,
        }
    }
}

/// Advice reconnect actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectAction {
    /// Reconnect with `/meta/connect` after the advised interval
    Retry,
    /// Drop the session and start a new handshake
    Handshake,
    /// Stay idle until the user intervenes
    None,
}

impl ReconnectAction {
    /// Parse the wire string
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "retry" => Some(Self::Retry),
            "handshake" => Some(Self::Handshake),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handshake_message() {
        let msg = Message::handshake(&["long-polling".to_string()]);

        assert_eq!(msg.channel(), Some("/meta/handshake"));
        assert_eq!(msg.get(VERSION_FIELD), Some(&json!("1.0")));
        assert_eq!(
            msg.supported_connection_types(),
            vec!["long-polling".to_string()]
        );
        assert_eq!(msg.meta_channel(), Some(MetaChannel::Handshake));
    }

    #[test]
    fn test_publish_carries_no_client_id() {
        let msg = Message::publish("/chat/room", json!({"text": "hi"}));

        assert_eq!(msg.channel(), Some("/chat/room"));
        assert!(msg.client_id().is_none());
        assert!(!msg.contains(CLIENT_ID_FIELD));
        assert!(!msg.is_meta());
    }

    #[test]
    fn test_freeze_is_one_shot() {
        let mut msg = Message::connect("c1", "long-polling");
        let json = msg.to_json().unwrap();

        msg.freeze(json.clone()).unwrap();
        assert!(msg.is_frozen());
        assert_eq!(msg.to_json().unwrap(), json);

        // Second freeze and any mutation must fail
        assert!(matches!(
            msg.freeze("{}".to_string()),
            Err(BayeuxError::FrozenMessage)
        ));
        assert!(matches!(
            msg.put("x", 1),
            Err(BayeuxError::FrozenMessage)
        ));
        assert!(matches!(
            msg.remove(CLIENT_ID_FIELD),
            Err(BayeuxError::FrozenMessage)
        ));
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let msg =
            Message::from_json(r#"{"channel":"/a","vendor":{"k":1},"data":{"x":2}}"#).unwrap();

        assert_eq!(msg.get("vendor"), Some(&json!({"k": 1})));

        let round_tripped = Message::from_json(&msg.to_json().unwrap()).unwrap();
        assert_eq!(round_tripped.get("vendor"), Some(&json!({"k": 1})));
    }

    #[test]
    fn test_parse_batch() {
        let batch = Message::parse_batch(
            r#"[{"channel":"/meta/connect","successful":true},{"channel":"/a","data":1}]"#,
        )
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch[0].is_successful());
        assert_eq!(batch[1].channel(), Some("/a"));

        let single = Message::parse_batch(r#"{"channel":"/a"}"#).unwrap();
        assert_eq!(single.len(), 1);

        assert!(Message::parse_batch("42").is_err());
    }

    #[test]
    fn test_advice_parsing() {
        let msg = Message::from_json(
            r#"{"channel":"/meta/connect","advice":{"reconnect":"retry","interval":500}}"#,
        )
        .unwrap();

        let advice = msg.advice().unwrap();
        assert_eq!(advice.action(), Some(ReconnectAction::Retry));
        assert_eq!(advice.interval_or(0), 500);
    }

    #[test]
    fn test_advice_defaults_and_clamping() {
        let advice = Advice::default();
        assert_eq!(advice.action(), Some(ReconnectAction::Retry));
        assert_eq!(advice.interval_or(250), 250);

        let negative = Advice {
            interval: Some(-100),
            ..Default::default()
        };
        assert_eq!(negative.interval_or(250), 0);

        let unknown = Advice {
            reconnect: Some("carrier-pigeon".to_string()),
            ..Default::default()
        };
        assert_eq!(unknown.action(), None);
    }

    #[test]
    fn test_associated_is_weak() {
        let request = Arc::new(Message::connect("c1", "long-polling"));
        let reply = Message::from_json(r#"{"channel":"/meta/connect","successful":true}"#).unwrap();

        reply.set_associated(&request);
        assert!(reply.associated().is_some());

        drop(request);
        assert!(reply.associated().is_none());
    }
}
