//! End-to-end session lifecycle tests.
//!
//! These tests drive the full engine against a scripted transport:
//! handshake, transport negotiation and swap, advice handling, and
//! disconnect teardown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use bayeux_client::{
    BayeuxClient, Config, Extension, Message, MetaChannel, Result, SessionState, TransportState,
};
use common::{capture_errors, establish, handshake_reply, reply_to, wait_for_state, MockTransport};

#[tokio::test(start_paused = true)]
async fn test_handshake_then_connect_happy_path() {
    let client = BayeuxClient::new(Config::default());
    let (transport, mut sent) = MockTransport::new("t1");
    client.register_transport(transport.clone());

    client.handshake().unwrap();
    assert_eq!(client.state(), SessionState::Handshaking);

    let batch = sent.recv().await.unwrap();
    assert_eq!(batch.len(), 1);
    let handshake = &batch[0];
    assert_eq!(handshake.channel(), Some("/meta/handshake"));
    assert_eq!(handshake.id(), Some("1"));
    assert_eq!(handshake.get("version"), Some(&json!("1.0")));
    assert_eq!(handshake.supported_connection_types(), vec!["t1".to_string()]);
    assert!(handshake.is_frozen());

    transport.deliver(vec![handshake_reply(handshake, "c1", &["t1"])]);

    let batch = sent.recv().await.unwrap();
    let connect = &batch[0];
    assert_eq!(connect.channel(), Some("/meta/connect"));
    assert_eq!(connect.id(), Some("2"));
    assert_eq!(connect.client_id(), Some("c1"));
    assert_eq!(connect.connection_type(), Some("t1"));

    assert_eq!(client.state(), SessionState::Connected);
    assert_eq!(client.client_id().as_deref(), Some("c1"));
    assert_eq!(transport.init_count(), 1);
    assert_eq!(transport.destroy_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transport_swap_on_revised_connection_types() {
    let client = BayeuxClient::new(Config::default());
    let (t1, mut sent1) = MockTransport::new("t1");
    let (t2, mut sent2) = MockTransport::new("t2");
    client.register_transport(t1.clone());
    client.register_transport(t2.clone());

    client.handshake().unwrap();
    let batch = sent1.recv().await.unwrap();
    let handshake = &batch[0];

    // The broker only keeps t2 on the table
    t1.deliver(vec![handshake_reply(handshake, "c1", &["t2"])]);

    let batch = sent2.recv().await.unwrap();
    let connect = &batch[0];
    assert_eq!(connect.channel(), Some("/meta/connect"));
    assert_eq!(connect.connection_type(), Some("t2"));

    // Old transport torn down before the new one carried any traffic
    assert_eq!(t1.destroy_count(), 1);
    assert_eq!(t1.lifecycle_state(), TransportState::Destroyed);
    assert_eq!(t2.init_count(), 1);
    assert!(sent1.try_recv().is_err());
    assert_eq!(client.state(), SessionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_no_common_transport_fails_handshake() {
    let client = BayeuxClient::new(Config::default());
    let mut errors = capture_errors(&client);
    let (t1, mut sent) = MockTransport::new("t1");
    client.register_transport(t1.clone());

    client.handshake().unwrap();
    let batch = sent.recv().await.unwrap();

    // Successful reply, but no transport this client has
    t1.deliver(vec![reply_to(
        &batch[0],
        json!({
            "successful": true,
            "clientId": "c1",
            "supportedConnectionTypes": ["t2"],
        }),
    )]);

    let error = errors.recv().await.unwrap();
    assert!(error.contains("negotiation"), "unexpected error: {error}");
    wait_for_state(&client, SessionState::Disconnected).await;

    // The bound transport is left alone
    assert_eq!(t1.destroy_count(), 0);
    assert!(sent.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_handshake_without_any_transport() {
    let client = BayeuxClient::new(Config::default());
    let mut errors = capture_errors(&client);

    client.handshake().unwrap();

    let error = errors.recv().await.unwrap();
    assert!(error.contains("negotiation"), "unexpected error: {error}");
    wait_for_state(&client, SessionState::Disconnected).await;
}

#[tokio::test(start_paused = true)]
async fn test_unsuccessful_handshake_reply_reports_and_disconnects() {
    let client = BayeuxClient::new(Config::default());
    let mut errors = capture_errors(&client);
    let (transport, mut sent) = MockTransport::new("t1");
    client.register_transport(transport.clone());

    let (meta_tx, mut meta_rx) = tokio::sync::mpsc::unbounded_channel();
    client
        .meta_channel(MetaChannel::Handshake)
        .add_listener(Arc::new(move |message: &Message| {
            let _ = meta_tx.send(message.is_successful());
            Ok(())
        }));

    client.handshake().unwrap();
    let batch = sent.recv().await.unwrap();
    transport.deliver(vec![reply_to(
        &batch[0],
        json!({"successful": false, "error": "403::handshake denied"}),
    )]);

    assert!(!meta_rx.recv().await.unwrap());
    let error = errors.recv().await.unwrap();
    assert!(error.contains("handshake denied"), "unexpected: {error}");
    wait_for_state(&client, SessionState::Disconnected).await;

    // No advice came with the rejection: the session stays down
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(sent.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_advice_handshake_triggers_rehandshake_after_interval() {
    let client = BayeuxClient::new(Config::default());
    let (transport, mut sent) = MockTransport::new("t1");
    client.register_transport(transport.clone());

    let connect = establish(&client, &transport, &mut sent, "c1").await;

    let start = tokio::time::Instant::now();
    transport.deliver(vec![reply_to(
        &connect,
        json!({
            "successful": true,
            "advice": {"reconnect": "handshake", "interval": 1000},
        }),
    )]);

    let batch = sent.recv().await.unwrap();
    assert_eq!(batch[0].channel(), Some("/meta/handshake"));
    assert!(start.elapsed() >= Duration::from_millis(1000));
    assert_eq!(client.state(), SessionState::Handshaking);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_reconnect_advice_retries_immediately() {
    let client = BayeuxClient::new(Config::default());
    let (transport, mut sent) = MockTransport::new("t1");
    client.register_transport(transport.clone());

    let connect = establish(&client, &transport, &mut sent, "c1").await;

    let start = tokio::time::Instant::now();
    transport.deliver(vec![reply_to(
        &connect,
        json!({
            "successful": true,
            "advice": {"reconnect": "carrier-pigeon", "interval": 5000},
        }),
    )]);

    // The advised interval belongs to the unrecognized action and is ignored
    let batch = sent.recv().await.unwrap();
    assert_eq!(batch[0].channel(), Some("/meta/connect"));
    assert!(start.elapsed() < Duration::from_millis(5000));
    assert_eq!(client.state(), SessionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_advice_none_leaves_session_idle() {
    let client = BayeuxClient::new(Config::default());
    let (transport, mut sent) = MockTransport::new("t1");
    client.register_transport(transport.clone());

    let connect = establish(&client, &transport, &mut sent, "c1").await;
    transport.deliver(vec![reply_to(
        &connect,
        json!({"successful": true, "advice": {"reconnect": "none"}}),
    )]);

    wait_for_state(&client, SessionState::Disconnected).await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(sent.try_recv().is_err());

    // Revival is the user's call
    client.handshake().unwrap();
    let batch = sent.recv().await.unwrap();
    assert_eq!(batch[0].channel(), Some("/meta/handshake"));
}

struct VetoAllMeta;

impl Extension for VetoAllMeta {
    fn outgoing_meta(&self, _message: Message) -> Result<Option<Message>> {
        Ok(None)
    }
}

#[tokio::test(start_paused = true)]
async fn test_extension_veto_starves_handshake_into_timeout() {
    let client = BayeuxClient::new(Config::default());
    let mut errors = capture_errors(&client);
    let (transport, mut sent) = MockTransport::new("t1");
    client.register_transport(transport.clone());
    client.add_extension(Arc::new(VetoAllMeta));

    client.handshake().unwrap();
    assert_eq!(client.state(), SessionState::Handshaking);

    // The vetoed request never reaches the transport; the pending entry
    // times out and is synthesized into a handshake failure.
    let error = errors.recv().await.unwrap();
    assert!(error.contains("timed out"), "unexpected error: {error}");
    wait_for_state(&client, SessionState::Disconnected).await;
    assert!(sent.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_synthesizes_handshake_failure() {
    let client = BayeuxClient::new(Config::default());
    let mut errors = capture_errors(&client);
    let (transport, mut sent) = MockTransport::new("t1");
    client.register_transport(transport.clone());

    client.handshake().unwrap();
    let batch = sent.recv().await.unwrap();

    transport.fail("connection refused", batch);

    let error = errors.recv().await.unwrap();
    assert!(error.contains("connection refused"), "unexpected: {error}");
    wait_for_state(&client, SessionState::Disconnected).await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_roundtrip_and_no_ghost_reconnect() {
    let client = BayeuxClient::new(Config::default());
    let (transport, mut sent) = MockTransport::new("t1");
    client.register_transport(transport.clone());

    let connect = establish(&client, &transport, &mut sent, "c1").await;

    // Push the next poll far into the future, then disconnect under it
    transport.deliver(vec![reply_to(
        &connect,
        json!({"successful": true, "advice": {"reconnect": "retry", "interval": 60_000}}),
    )]);

    client.disconnect().unwrap();
    let batch = sent.recv().await.unwrap();
    let disconnect = &batch[0];
    assert_eq!(disconnect.channel(), Some("/meta/disconnect"));
    assert_eq!(disconnect.client_id(), Some("c1"));
    assert_eq!(client.state(), SessionState::Disconnecting);

    transport.deliver(vec![reply_to(disconnect, json!({"successful": true}))]);
    wait_for_state(&client, SessionState::Disconnected).await;
    assert!(client.client_id().is_none());
    assert_eq!(transport.destroy_count(), 1);

    // The scheduled reconnect must not survive the disconnect
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(sent.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_reply_overdue_forces_teardown() {
    let client = BayeuxClient::new(Config::default());
    let (transport, mut sent) = MockTransport::new("t1");
    client.register_transport(transport.clone());

    establish(&client, &transport, &mut sent, "c1").await;

    client.disconnect().unwrap();
    let batch = sent.recv().await.unwrap();
    assert_eq!(batch[0].channel(), Some("/meta/disconnect"));

    // No reply: the configured bound (5 s) forces the teardown
    wait_for_state(&client, SessionState::Disconnected).await;
    assert_eq!(transport.destroy_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_retries_per_cached_advice() {
    let client = BayeuxClient::new(Config::default());
    let mut errors = capture_errors(&client);
    let (transport, mut sent) = MockTransport::new("t1");
    client.register_transport(transport.clone());

    let connect = establish(&client, &transport, &mut sent, "c1").await;

    transport.deliver(vec![reply_to(
        &connect,
        json!({"successful": false, "error": "session unknown"}),
    )]);

    let error = errors.recv().await.unwrap();
    assert!(error.contains("session unknown"), "unexpected: {error}");

    // Cached advice said retry: a fresh connect goes out, session stays up
    let batch = sent.recv().await.unwrap();
    assert_eq!(batch[0].channel(), Some("/meta/connect"));
    assert_eq!(client.state(), SessionState::Connected);
}
