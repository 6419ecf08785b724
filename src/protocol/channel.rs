//! Channel identifiers: validation, wildcard matching, meta channel kinds.

use std::fmt;

use super::META_PREFIX;
use crate::error::{BayeuxError, Result};

/// The five reserved meta channel kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaChannel {
    /// `/meta/handshake`
    Handshake,
    /// `/meta/connect`
    Connect,
    /// `/meta/disconnect`
    Disconnect,
    /// `/meta/subscribe`
    Subscribe,
    /// `/meta/unsubscribe`
    Unsubscribe,
}

impl MetaChannel {
    /// All kinds, in protocol order
    pub const ALL: [MetaChannel; 5] = [
        MetaChannel::Handshake,
        MetaChannel::Connect,
        MetaChannel::Disconnect,
        MetaChannel::Subscribe,
        MetaChannel::Unsubscribe,
    ];

    /// The reserved channel name for this kind
    pub fn channel_name(&self) -> &'static str {
        match self {
            MetaChannel::Handshake => "/meta/handshake",
            MetaChannel::Connect => "/meta/connect",
            MetaChannel::Disconnect => "/meta/disconnect",
            MetaChannel::Subscribe => "/meta/subscribe",
            MetaChannel::Unsubscribe => "/meta/unsubscribe",
        }
    }

    /// Parse a channel name into its meta kind
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "/meta/handshake" => Some(MetaChannel::Handshake),
            "/meta/connect" => Some(MetaChannel::Connect),
            "/meta/disconnect" => Some(MetaChannel::Disconnect),
            "/meta/subscribe" => Some(MetaChannel::Subscribe),
            "/meta/unsubscribe" => Some(MetaChannel::Unsubscribe),
            _ => None,
        }
    }
}

impl fmt::Display for MetaChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.channel_name().fmt(f)
    }
}

/// Channel name shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// `/a/b`: matches only itself
    Exact,
    /// `/a/*`: matches exactly one extra segment
    SingleWildcard,
    /// `/a/**`: matches one or more extra segments
    DeepWildcard,
}

/// A validated channel identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId {
    name: String,
    segments: Vec<String>,
    kind: ChannelKind,
}

impl ChannelId {
    /// Parse and validate a channel name.
    ///
    /// Names are non-empty, begin with `/`, contain no empty segments, and
    /// may end in a single `*` or `**` segment.
    pub fn parse(name: &str) -> Result<Self> {
        let Some(rest) = name.strip_prefix('/') else {
            return Err(BayeuxError::InvalidChannel(format!(
                "channel must start with '/': {name:?}"
            )));
        };
        if rest.is_empty() {
            return Err(BayeuxError::InvalidChannel(format!(
                "channel has no segments: {name:?}"
            )));
        }

        let segments: Vec<String> = rest.split('/').map(str::to_owned).collect();
        let last = segments.len() - 1;
        for (index, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                return Err(BayeuxError::InvalidChannel(format!(
                    "channel has an empty segment: {name:?}"
                )));
            }
            if segment.contains('*') && !(index == last && (segment == "*" || segment == "**")) {
                return Err(BayeuxError::InvalidChannel(format!(
                    "wildcard only allowed as the final segment: {name:?}"
                )));
            }
        }

        let kind = match segments[last].as_str() {
            "*" => ChannelKind::SingleWildcard,
            "**" => ChannelKind::DeepWildcard,
            _ => ChannelKind::Exact,
        };

        Ok(Self {
            name: name.to_owned(),
            segments,
            kind,
        })
    }

    /// The full channel name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The channel shape
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Whether this is a `/meta/*` channel
    pub fn is_meta(&self) -> bool {
        self.name.starts_with(META_PREFIX)
    }

    /// Whether the name contains a wildcard segment
    pub fn is_wildcard(&self) -> bool {
        self.kind != ChannelKind::Exact
    }

    /// Whether this channel (as a pattern) matches a concrete channel.
    ///
    /// `/a/*` matches exactly `/a/x`; `/a/**` matches `/a/x`, `/a/x/y`, ...
    /// Neither matches `/a` itself. An exact channel matches only itself.
    pub fn matches(&self, concrete: &ChannelId) -> bool {
        match self.kind {
            ChannelKind::Exact => self.name == concrete.name,
            ChannelKind::SingleWildcard => {
                concrete.kind == ChannelKind::Exact
                    && concrete.segments.len() == self.segments.len()
                    && self.prefix_matches(concrete)
            }
            ChannelKind::DeepWildcard => {
                concrete.kind == ChannelKind::Exact
                    && concrete.segments.len() >= self.segments.len()
                    && self.prefix_matches(concrete)
            }
        }
    }

    fn prefix_matches(&self, concrete: &ChannelId) -> bool {
        let prefix = &self.segments[..self.segments.len() - 1];
        concrete.segments[..prefix.len()] == *prefix
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name.fmt(f)
    }
}
