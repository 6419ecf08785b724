//! Transport registration and negotiation.

use std::sync::Arc;

use parking_lot::RwLock;

use super::ClientTransport;

/// Holds the client's transports in preference order and negotiates one
/// against the broker's offered connection types.
pub struct TransportRegistry {
    transports: RwLock<Vec<Arc<dyn ClientTransport>>>,
}

impl TransportRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            transports: RwLock::new(Vec::new()),
        }
    }

    /// Register a transport.
    ///
    /// Registration order is the client's preference order. Registering a
    /// name twice replaces the earlier entry in place.
    pub fn add(&self, transport: Arc<dyn ClientTransport>) {
        let mut guard = self.transports.write();
        if let Some(existing) = guard.iter_mut().find(|t| t.name() == transport.name()) {
            tracing::debug!(name = transport.name(), "replacing registered transport");
            *existing = transport;
        } else {
            guard.push(transport);
        }
    }

    /// Look up a transport by name
    pub fn find(&self, name: &str) -> Option<Arc<dyn ClientTransport>> {
        self.transports
            .read()
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    /// Names of all registered transports, in preference order
    pub fn names(&self) -> Vec<String> {
        self.transports
            .read()
            .iter()
            .map(|t| t.name().to_owned())
            .collect()
    }

    /// Names of the transports that can speak `version`, in preference order
    pub fn supported(&self, version: &str) -> Vec<String> {
        self.transports
            .read()
            .iter()
            .filter(|t| t.supports_version(version))
            .map(|t| t.name().to_owned())
            .collect()
    }

    /// Negotiate a transport against the broker's offered connection types.
    ///
    /// Returns the first registered transport whose name appears in
    /// `offered` and which supports `version`; ties break on registration
    /// order.
    pub fn negotiate(&self, version: &str, offered: &[String]) -> Option<Arc<dyn ClientTransport>> {
        self.transports
            .read()
            .iter()
            .find(|t| t.supports_version(version) && offered.iter().any(|o| o == t.name()))
            .cloned()
    }

    /// Number of registered transports
    pub fn len(&self) -> usize {
        self.transports.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.transports.read().is_empty()
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new()
    }
}
