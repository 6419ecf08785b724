//! Shared test doubles and helpers for the end-to-end tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;

use bayeux_client::{
    BayeuxClient, BayeuxError, ClientTransport, ListenerSet, Message, SessionState,
    TransportListener, TransportState,
};

/// A scripted transport: records sent batches to an outbox and lets the
/// test inject inbound batches and failures.
pub struct MockTransport {
    name: &'static str,
    versions: Vec<&'static str>,
    listeners: ListenerSet,
    state: Mutex<TransportState>,
    inits: AtomicUsize,
    destroys: AtomicUsize,
    outbox: mpsc::UnboundedSender<Vec<Message>>,
}

impl MockTransport {
    pub fn new(name: &'static str) -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<Message>>) {
        Self::with_versions(name, vec!["1.0"])
    }

    pub fn with_versions(
        name: &'static str,
        versions: Vec<&'static str>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<Message>>) {
        let (outbox, sent) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            name,
            versions,
            listeners: ListenerSet::new(),
            state: Mutex::new(TransportState::Uninitialized),
            inits: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
            outbox,
        });
        (transport, sent)
    }

    /// Inject an inbound batch, as if it arrived from the broker
    pub fn deliver(&self, messages: Vec<Message>) {
        self.listeners.notify_messages(&messages);
    }

    /// Inject a transport failure for the given in-flight messages
    pub fn fail(&self, cause: &str, attempted: Vec<Message>) {
        self.listeners
            .notify_failure(&BayeuxError::Transport(cause.to_string()), &attempted);
    }

    pub fn init_count(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn destroy_count(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    pub fn lifecycle_state(&self) -> TransportState {
        *self.state.lock()
    }
}

impl ClientTransport for MockTransport {
    fn name(&self) -> &str {
        self.name
    }

    fn supports_version(&self, version: &str) -> bool {
        self.versions.contains(&version)
    }

    fn init(&self) {
        *self.state.lock() = TransportState::Initialized;
        self.inits.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy(&self) {
        *self.state.lock() = TransportState::Destroyed;
        self.destroys.fetch_add(1, Ordering::SeqCst);
    }

    fn send(&self, messages: Vec<Message>) {
        let _ = self.outbox.send(messages);
    }

    fn add_listener(&self, listener: Arc<dyn TransportListener>) {
        self.listeners.add(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn TransportListener>) {
        self.listeners.remove(listener);
    }
}

/// Build a broker reply for `request`: echoes channel and id, merges in
/// the given fields.
pub fn reply_to(request: &Message, extra: serde_json::Value) -> Message {
    let mut fields = extra
        .as_object()
        .cloned()
        .expect("reply fields must be an object");
    fields.insert("channel".into(), request.channel().unwrap().into());
    fields.insert("id".into(), request.id().unwrap().into());
    Message::from_fields(fields)
}

/// A successful handshake reply offering the given connection types
pub fn handshake_reply(request: &Message, client_id: &str, offered: &[&str]) -> Message {
    reply_to(
        request,
        json!({
            "successful": true,
            "clientId": client_id,
            "supportedConnectionTypes": offered,
            "advice": {"reconnect": "retry", "interval": 0},
        }),
    )
}

/// Let queued events drain: with a paused clock, time only advances once
/// every task is idle, so waking from this sleep implies the driver has
/// processed everything posted so far.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
}

/// Poll until the session reaches `target` (virtual time friendly)
pub async fn wait_for_state(client: &BayeuxClient, target: SessionState) {
    for _ in 0..20_000 {
        if client.state() == target {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!(
        "session never reached {target:?}, still {:?}",
        client.state()
    );
}

/// Capture session errors into a channel
pub fn capture_errors(client: &BayeuxClient) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.add_error_listener(Arc::new(
        move |error: &BayeuxError, _message: Option<&Message>| {
            let _ = tx.send(error.to_string());
        },
    ));
    rx
}

/// Handshake against the mock broker and return the first connect request.
///
/// Leaves the connect unanswered so no further traffic is scheduled.
pub async fn establish(
    client: &BayeuxClient,
    transport: &Arc<MockTransport>,
    sent: &mut mpsc::UnboundedReceiver<Vec<Message>>,
    client_id: &str,
) -> Message {
    client.handshake().expect("handshake");

    let batch = sent.recv().await.expect("handshake request");
    assert_eq!(batch[0].channel(), Some("/meta/handshake"));
    transport.deliver(vec![handshake_reply(
        &batch[0],
        client_id,
        &[transport.name()],
    )]);

    let batch = sent.recv().await.expect("connect request");
    assert_eq!(batch[0].channel(), Some("/meta/connect"));
    batch.into_iter().next().unwrap()
}
