//! The protocol driver: a single task owning all session mutation.
//!
//! User API calls, transport callbacks and timers all post events to one
//! queue; the driver consumes them in order, so state transitions, advice
//! handling and dispatch are serialized without locks.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{SessionState, Shared, SubscribeCallback};
use crate::error::BayeuxError;
use crate::protocol::{
    Advice, ChannelId, Message, MetaChannel, ReconnectAction, BAYEUX_VERSION, CHANNEL_FIELD,
    ERROR_FIELD, ID_FIELD, SUCCESSFUL_FIELD,
};
use crate::transport::{ClientTransport, TransportListener};

/// Work items for the driver task.
pub(crate) enum Event {
    Handshake { scheduled: bool },
    Connect,
    Disconnect,
    DisconnectTimeout,
    RequestTimeout { id: String },
    Incoming(Vec<Message>),
    TransportFailure { cause: String, attempted: Vec<Message> },
    Publish { channel: String, data: Value },
    Subscribe { channel: String, callback: Option<SubscribeCallback> },
    Unsubscribe { channel: String, callback: Option<SubscribeCallback> },
    BatchBegin,
    BatchEnd,
    Shutdown,
}

/// An outstanding meta request awaiting its reply.
struct PendingRequest {
    request: Arc<Message>,
    kind: MetaChannel,
    subscription: Option<String>,
    callback: Option<SubscribeCallback>,
    timeout: JoinHandle<()>,
}

/// Forwards transport callbacks into the event queue.
struct TransportBridge {
    events: mpsc::UnboundedSender<Event>,
}

impl TransportListener for TransportBridge {
    fn on_messages(&self, messages: &[Message]) {
        let _ = self.events.send(Event::Incoming(messages.to_vec()));
    }

    fn on_failure(&self, cause: &BayeuxError, attempted: &[Message]) {
        let _ = self.events.send(Event::TransportFailure {
            cause: cause.to_string(),
            attempted: attempted.to_vec(),
        });
    }
}

pub(crate) struct SessionDriver {
    shared: Weak<Shared>,
    inbox: mpsc::UnboundedReceiver<Event>,
    events: mpsc::UnboundedSender<Event>,
    bridge: Arc<dyn TransportListener>,

    transport: Option<Arc<dyn ClientTransport>>,
    advice: Option<Advice>,
    reconnect_timer: Option<JoinHandle<()>>,
    disconnect_timer: Option<JoinHandle<()>>,
    message_ids: u64,
    pending: HashMap<String, PendingRequest>,
    subscribed: std::collections::HashSet<String>,
    deferred_subscribes: HashMap<String, Option<SubscribeCallback>>,
    batch_depth: u32,
    queue: Vec<Message>,
}

impl SessionDriver {
    pub(crate) fn new(
        shared: Weak<Shared>,
        inbox: mpsc::UnboundedReceiver<Event>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        let bridge = Arc::new(TransportBridge {
            events: events.clone(),
        });
        Self {
            shared,
            inbox,
            events,
            bridge,
            transport: None,
            advice: None,
            reconnect_timer: None,
            disconnect_timer: None,
            message_ids: 0,
            pending: HashMap::new(),
            subscribed: std::collections::HashSet::new(),
            deferred_subscribes: HashMap::new(),
            batch_depth: 0,
            queue: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        while let Some(event) = self.inbox.recv().await {
            if matches!(event, Event::Shutdown) {
                break;
            }
            let Some(shared) = self.shared.upgrade() else {
                break;
            };
            self.handle(&shared, event);
        }
        self.shutdown();
    }

    fn handle(&mut self, shared: &Arc<Shared>, event: Event) {
        match event {
            Event::Handshake { scheduled } => self.start_handshake(shared, scheduled),
            Event::Connect => self.start_connect(shared),
            Event::Disconnect => self.start_disconnect(shared),
            Event::DisconnectTimeout => self.force_disconnect(shared),
            Event::RequestTimeout { id } => self.expire_request(shared, &id),
            Event::Incoming(messages) => {
                for message in messages {
                    self.receive(shared, message);
                }
            }
            Event::TransportFailure { cause, attempted } => {
                self.transport_failure(shared, &cause, attempted)
            }
            Event::Publish { channel, data } => self.send_publish(shared, &channel, data),
            Event::Subscribe { channel, callback } => {
                self.request_subscribe(shared, channel, callback)
            }
            Event::Unsubscribe { channel, callback } => {
                self.request_unsubscribe(shared, channel, callback)
            }
            Event::BatchBegin => self.batch_depth += 1,
            Event::BatchEnd => {
                self.batch_depth = self.batch_depth.saturating_sub(1);
                self.flush(shared);
            }
            // Handled in the run loop before dispatch
            Event::Shutdown => {}
        }
    }

    // === Handshake ===

    fn start_handshake(&mut self, shared: &Arc<Shared>, scheduled: bool) {
        if scheduled {
            // A stale timer: the user beat us to it or the session moved on
            if shared.state() != SessionState::Disconnected {
                return;
            }
            shared.set_state(SessionState::Handshaking);
        }
        self.cancel_reconnect();
        self.subscribed.clear();

        let supported = shared.transports.supported(BAYEUX_VERSION);
        let Some(negotiated) = shared.transports.negotiate(BAYEUX_VERSION, &supported) else {
            let error = BayeuxError::NegotiationFailed(format!(
                "no registered transport supports Bayeux {BAYEUX_VERSION}"
            ));
            self.fail_handshake(shared, error, None);
            return;
        };

        let rebind = match &self.transport {
            Some(current) => !Arc::ptr_eq(current, &negotiated),
            None => true,
        };
        if rebind {
            self.bind_transport(negotiated);
        }
        tracing::debug!(
            transport = ?self.transport.as_ref().map(|t| t.name()),
            "handshaking"
        );

        let request = Message::handshake(&supported);
        self.enqueue_meta(shared, request, MetaChannel::Handshake, None, None);
        self.flush(shared);
    }

    fn fail_handshake(&mut self, shared: &Arc<Shared>, error: BayeuxError, message: Option<&Message>) {
        tracing::warn!(%error, "handshake failed");
        self.drop_session(shared);
        shared.notify_error(&error, message);
        if let Some(message) = message {
            shared.meta_channels.notify(MetaChannel::Handshake, message);
        }
        // Only a broker can tell us to come back
        if message.is_some() && self.advice.is_some() {
            self.follow_advice(shared);
        }
    }

    fn process_handshake(&mut self, shared: &Arc<Shared>, message: &Message) {
        if shared.state() != SessionState::Handshaking {
            self.protocol_error(shared, "handshake reply outside handshake", Some(message));
            return;
        }

        if !message.is_successful() {
            let error = BayeuxError::Protocol(format!(
                "handshake rejected: {}",
                message.error().unwrap_or("unknown error")
            ));
            self.fail_handshake(shared, error, Some(message));
            return;
        }

        // The broker may have revised the usable connection types
        let offered = message.supported_connection_types();
        let Some(negotiated) = shared.transports.negotiate(BAYEUX_VERSION, &offered) else {
            let error = BayeuxError::NegotiationFailed(format!(
                "broker offered {offered:?}, none registered"
            ));
            self.fail_handshake(shared, error, Some(message));
            return;
        };
        let swap = match &self.transport {
            Some(current) => !Arc::ptr_eq(current, &negotiated),
            None => true,
        };
        if swap {
            self.bind_transport(negotiated);
        }

        let Some(client_id) = message.client_id() else {
            self.protocol_error(shared, "handshake reply without clientId", Some(message));
            return;
        };

        shared.set_client_id(Some(client_id.to_owned()));
        shared.set_state(SessionState::Connected);
        shared.meta_channels.notify(MetaChannel::Handshake, message);

        self.replay_subscriptions(shared);
        self.follow_advice(shared);
    }

    /// Re-issue `/meta/subscribe` for every channel that has listeners,
    /// as one batch.
    fn replay_subscriptions(&mut self, shared: &Arc<Shared>) {
        let Some(client_id) = shared.client_id() else {
            return;
        };
        let channels: Vec<String> = shared
            .channels
            .with_listeners()
            .iter()
            .filter(|c| !c.id().is_meta())
            .map(|c| c.id().name().to_owned())
            .collect();

        self.batch_depth += 1;
        for name in channels {
            let callback = self.deferred_subscribes.remove(&name).flatten();
            let request = Message::subscribe(&client_id, &name);
            self.enqueue_meta(
                shared,
                request,
                MetaChannel::Subscribe,
                Some(name),
                callback,
            );
        }
        self.batch_depth -= 1;
        self.flush(shared);
    }

    // === Connect ===

    fn start_connect(&mut self, shared: &Arc<Shared>) {
        if shared.state() != SessionState::Connected {
            return;
        }
        let (Some(client_id), Some(transport)) = (shared.client_id(), self.transport.clone())
        else {
            return;
        };
        let request = Message::connect(&client_id, transport.name());
        self.enqueue_meta(shared, request, MetaChannel::Connect, None, None);
        self.flush(shared);
    }

    fn process_connect(&mut self, shared: &Arc<Shared>, message: &Message) {
        let state = shared.state();
        if state != SessionState::Connected && state != SessionState::Disconnecting {
            self.protocol_error(shared, "connect reply outside session", Some(message));
            return;
        }

        shared.meta_channels.notify(MetaChannel::Connect, message);

        if !message.is_successful() {
            let error = BayeuxError::Protocol(format!(
                "connect rejected: {}",
                message.error().unwrap_or("unknown error")
            ));
            shared.notify_error(&error, Some(message));
        }

        // While disconnecting the long-poll is allowed to die quietly
        if state == SessionState::Connected {
            self.follow_advice(shared);
        }
    }

    // === Disconnect ===

    fn start_disconnect(&mut self, shared: &Arc<Shared>) {
        if shared.state() == SessionState::Disconnected {
            return;
        }
        self.cancel_reconnect();

        let Some(client_id) = shared.client_id() else {
            // No session was ever established; nothing to tell the broker
            shared.set_state(SessionState::Disconnecting);
            self.teardown_session(shared);
            return;
        };

        shared.set_state(SessionState::Disconnecting);
        let request = Message::disconnect(&client_id);
        self.enqueue_meta(shared, request, MetaChannel::Disconnect, None, None);
        self.flush(shared);

        let events = self.events.clone();
        let timeout = shared.config.timeouts.disconnect();
        self.replace_disconnect_timer(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(Event::DisconnectTimeout);
        }));
    }

    fn process_disconnect(&mut self, shared: &Arc<Shared>, message: &Message) {
        if shared.state() != SessionState::Disconnecting {
            self.protocol_error(shared, "disconnect reply outside disconnect", Some(message));
            return;
        }
        shared.meta_channels.notify(MetaChannel::Disconnect, message);
        self.teardown_session(shared);
    }

    fn force_disconnect(&mut self, shared: &Arc<Shared>) {
        if shared.state() != SessionState::Disconnecting {
            return;
        }
        tracing::warn!("disconnect reply overdue, forcing teardown");
        self.teardown_session(shared);
    }

    // === Subscription protocol ===

    fn request_subscribe(
        &mut self,
        shared: &Arc<Shared>,
        channel: String,
        callback: Option<SubscribeCallback>,
    ) {
        if shared.state() != SessionState::Connected {
            self.deferred_subscribes.insert(channel, callback);
            return;
        }
        let Some(client_id) = shared.client_id() else {
            self.deferred_subscribes.insert(channel, callback);
            return;
        };
        if self.subscribed.contains(&channel) || self.in_flight(MetaChannel::Subscribe, &channel) {
            if let Some(callback) = callback {
                callback(Ok(()));
            }
            return;
        }
        let request = Message::subscribe(&client_id, &channel);
        self.enqueue_meta(
            shared,
            request,
            MetaChannel::Subscribe,
            Some(channel),
            callback,
        );
        self.flush(shared);
    }

    fn request_unsubscribe(
        &mut self,
        shared: &Arc<Shared>,
        channel: String,
        callback: Option<SubscribeCallback>,
    ) {
        self.deferred_subscribes.remove(&channel);
        let was_subscribed =
            self.subscribed.remove(&channel) || self.in_flight(MetaChannel::Subscribe, &channel);

        let Some(client_id) = shared.client_id() else {
            if let Some(callback) = callback {
                callback(Ok(()));
            }
            return;
        };
        if shared.state() != SessionState::Connected || !was_subscribed {
            if let Some(callback) = callback {
                callback(Ok(()));
            }
            return;
        }
        let request = Message::unsubscribe(&client_id, &channel);
        self.enqueue_meta(
            shared,
            request,
            MetaChannel::Unsubscribe,
            Some(channel),
            callback,
        );
        self.flush(shared);
    }

    fn in_flight(&self, kind: MetaChannel, channel: &str) -> bool {
        self.pending
            .values()
            .any(|p| p.kind == kind && p.subscription.as_deref() == Some(channel))
    }

    fn process_subscribe_reply(
        &mut self,
        shared: &Arc<Shared>,
        message: &Message,
        pending: Option<PendingRequest>,
    ) {
        shared.meta_channels.notify(MetaChannel::Subscribe, message);

        let Some(pending) = pending else {
            return;
        };
        let channel = pending
            .subscription
            .or_else(|| message.subscription().map(str::to_owned));

        if message.is_successful() {
            // An unsubscribe may have raced the ack; only channels that
            // still have listeners count as subscribed
            let still_wanted = channel
                .as_deref()
                .and_then(|name| shared.channels.get(name, false).ok().flatten())
                .is_some_and(|c| c.has_listeners());
            if let Some(channel) = channel {
                if still_wanted {
                    self.subscribed.insert(channel);
                }
            }
            if let Some(callback) = pending.callback {
                callback(Ok(()));
            }
        } else {
            let error = message.error().unwrap_or("subscribe rejected").to_owned();
            tracing::warn!(
                channel = channel.as_deref().unwrap_or("<unknown>"),
                error = %error,
                "broker rejected subscription, keeping local listeners"
            );
            if let Some(callback) = pending.callback {
                callback(Err(error));
            }
        }
    }

    fn process_unsubscribe_reply(
        &mut self,
        shared: &Arc<Shared>,
        message: &Message,
        pending: Option<PendingRequest>,
    ) {
        shared.meta_channels.notify(MetaChannel::Unsubscribe, message);

        let Some(pending) = pending else {
            return;
        };
        if let Some(callback) = pending.callback {
            if message.is_successful() {
                callback(Ok(()));
            } else {
                callback(Err(message
                    .error()
                    .unwrap_or("unsubscribe rejected")
                    .to_owned()));
            }
        }
    }

    // === Publish ===

    fn send_publish(&mut self, shared: &Arc<Shared>, channel: &str, data: Value) {
        let mut message = Message::publish(channel, data);
        if message.put(ID_FIELD, self.next_id()).is_err() {
            return;
        }
        self.queue.push(message);
        self.flush(shared);
    }

    // === Inbound processing ===

    fn receive(&mut self, shared: &Arc<Shared>, message: Message) {
        if message.channel().is_none() {
            self.protocol_error(shared, "message without channel", Some(&message));
            return;
        }
        let meta = message.is_meta();

        let Some(message) = shared.extensions.incoming(message, meta) else {
            return;
        };

        // Advice is recorded before any action it may trigger
        if let Some(advice) = message.advice() {
            self.advice = Some(advice);
        }

        if !meta {
            self.dispatch_application(shared, &message);
            return;
        }

        let pending = self.correlate(&message);
        if pending.is_none() && message.contains(SUCCESSFUL_FIELD) && message.id().is_some() {
            self.protocol_error(shared, "reply for unknown request id", Some(&message));
            return;
        }

        self.route_meta(shared, message, pending);
    }

    fn route_meta(
        &mut self,
        shared: &Arc<Shared>,
        message: Message,
        pending: Option<PendingRequest>,
    ) {
        let message = Arc::new(message);
        if let Some(pending) = &pending {
            message.set_associated(&pending.request);
        }

        match message.meta_channel() {
            Some(MetaChannel::Handshake) => self.process_handshake(shared, &message),
            Some(MetaChannel::Connect) => self.process_connect(shared, &message),
            Some(MetaChannel::Disconnect) => self.process_disconnect(shared, &message),
            Some(MetaChannel::Subscribe) => {
                self.process_subscribe_reply(shared, &message, pending)
            }
            Some(MetaChannel::Unsubscribe) => {
                self.process_unsubscribe_reply(shared, &message, pending)
            }
            None => self.protocol_error(shared, "unknown meta channel", Some(&message)),
        }
    }

    fn correlate(&mut self, message: &Message) -> Option<PendingRequest> {
        let id = message.id()?;
        let pending = self.pending.remove(id)?;
        pending.timeout.abort();
        Some(pending)
    }

    fn dispatch_application(&mut self, shared: &Arc<Shared>, message: &Message) {
        let name = message.channel().unwrap_or_default();
        let concrete = match ChannelId::parse(name) {
            Ok(id) if !id.is_wildcard() => id,
            _ => {
                self.protocol_error(shared, "unroutable application channel", Some(message));
                return;
            }
        };
        for channel in shared.channels.matching(&concrete) {
            channel.deliver(message);
        }
    }

    // === Failures and timeouts ===

    fn transport_failure(&mut self, shared: &Arc<Shared>, cause: &str, attempted: Vec<Message>) {
        tracing::warn!(cause, "transport failure");
        for message in attempted {
            match message.id().map(str::to_owned) {
                Some(id) if self.pending.contains_key(&id) => {
                    self.synthesize_failure(shared, &id, cause);
                }
                _ => {
                    let error = BayeuxError::Transport(cause.to_owned());
                    shared.notify_error(&error, Some(&message));
                }
            }
        }
    }

    fn expire_request(&mut self, shared: &Arc<Shared>, id: &str) {
        if self.pending.contains_key(id) {
            self.synthesize_failure(shared, id, "request timed out");
        }
    }

    /// Turn a dead request into an unsuccessful reply and run it through
    /// the normal state machine. Synthetic replies skip the extension
    /// pipeline: they never crossed the wire.
    fn synthesize_failure(&mut self, shared: &Arc<Shared>, id: &str, cause: &str) {
        let Some(pending) = self.pending.remove(id) else {
            return;
        };
        pending.timeout.abort();

        let mut reply = Message::new();
        let channel = pending
            .request
            .channel()
            .unwrap_or(pending.kind.channel_name());
        let _ = reply.put(CHANNEL_FIELD, channel);
        let _ = reply.put(ID_FIELD, id);
        let _ = reply.put(SUCCESSFUL_FIELD, false);
        let _ = reply.put(ERROR_FIELD, cause);

        self.route_meta(shared, reply, Some(pending));
    }

    // === Advice ===

    fn follow_advice(&mut self, shared: &Arc<Shared>) {
        let advice = self.advice.clone().unwrap_or_default();
        let default_interval = shared.config.timeouts.default_interval_ms;

        let (action, interval) = match advice.action() {
            Some(action) => (
                action,
                Duration::from_millis(advice.interval_or(default_interval)),
            ),
            // An unrecognized action means retry now, ignoring the interval
            None => {
                tracing::warn!(
                    action = advice.reconnect.as_deref().unwrap_or(""),
                    "unsupported reconnect advice, treating as retry"
                );
                (ReconnectAction::Retry, Duration::ZERO)
            }
        };

        match action {
            ReconnectAction::Retry => match shared.state() {
                SessionState::Connected => {
                    self.schedule_reconnect(Event::Connect, interval);
                }
                SessionState::Disconnected => {
                    self.schedule_reconnect(Event::Handshake { scheduled: true }, interval);
                }
                _ => {}
            },
            ReconnectAction::Handshake => {
                self.drop_session(shared);
                self.schedule_reconnect(Event::Handshake { scheduled: true }, interval);
            }
            ReconnectAction::None => {
                self.cancel_reconnect();
                if shared.state() == SessionState::Connected {
                    self.drop_session(shared);
                }
            }
        }
    }

    fn schedule_reconnect(&mut self, event: Event, delay: Duration) {
        self.cancel_reconnect();
        let events = self.events.clone();
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(event);
        }));
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }

    fn replace_disconnect_timer(&mut self, timer: JoinHandle<()>) {
        if let Some(previous) = self.disconnect_timer.replace(timer) {
            previous.abort();
        }
    }

    // === Outbound plumbing ===

    fn next_id(&mut self) -> String {
        self.message_ids += 1;
        self.message_ids.to_string()
    }

    fn enqueue_meta(
        &mut self,
        shared: &Arc<Shared>,
        mut request: Message,
        kind: MetaChannel,
        subscription: Option<String>,
        callback: Option<SubscribeCallback>,
    ) {
        let id = self.next_id();
        if request.put(ID_FIELD, id.clone()).is_err() {
            return;
        }

        self.evict_pending_overflow(shared);

        let mut timeout = shared.config.timeouts.request();
        if kind == MetaChannel::Connect {
            // The long poll is held open server-side for the advised time
            let hold = self
                .advice
                .as_ref()
                .and_then(|a| a.timeout)
                .unwrap_or(0)
                .max(0) as u64;
            timeout += Duration::from_millis(hold);
        }
        let events = self.events.clone();
        let timeout_id = id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(Event::RequestTimeout { id: timeout_id });
        });

        self.pending.insert(
            id,
            PendingRequest {
                request: Arc::new(request.clone()),
                kind,
                subscription,
                callback,
                timeout: timer,
            },
        );
        self.queue.push(request);
    }

    /// Keep the correlation window bounded: the oldest entry makes room.
    fn evict_pending_overflow(&mut self, shared: &Arc<Shared>) {
        let limit = shared.config.session.max_pending_requests.max(1);
        while self.pending.len() >= limit {
            let Some(oldest) = self
                .pending
                .keys()
                .min_by_key(|id| id.parse::<u64>().unwrap_or(u64::MAX))
                .cloned()
            else {
                break;
            };
            tracing::warn!(id = %oldest, "pending request evicted, correlation window full");
            if let Some(evicted) = self.pending.remove(&oldest) {
                evicted.timeout.abort();
            }
        }
    }

    fn flush(&mut self, shared: &Arc<Shared>) {
        if self.batch_depth > 0 || self.queue.is_empty() {
            return;
        }

        let mut batch = Vec::with_capacity(self.queue.len());
        for message in self.queue.drain(..) {
            let meta = message.is_meta();
            let Some(message) = shared.extensions.outgoing(message, meta) else {
                continue;
            };
            match message.to_json() {
                Ok(json) => {
                    let _ = message.freeze(json);
                    batch.push(message);
                }
                Err(error) => {
                    tracing::warn!(%error, "dropping unserializable message");
                }
            }
        }

        if batch.is_empty() {
            return;
        }
        match &self.transport {
            Some(transport) => transport.send(batch),
            None => {
                let error = BayeuxError::Transport("no transport bound".to_string());
                shared.notify_error(&error, None);
            }
        }
    }

    // === Lifecycle helpers ===

    /// Bind a transport with the swap discipline: the old one is
    /// unlistened and destroyed before the new one is initialized.
    fn bind_transport(&mut self, next: Arc<dyn ClientTransport>) {
        if let Some(previous) = self.transport.take() {
            tracing::debug!(
                from = previous.name(),
                to = next.name(),
                "swapping transport"
            );
            previous.remove_listener(&self.bridge);
            previous.destroy();
        }
        next.add_listener(self.bridge.clone());
        next.init();
        self.transport = Some(next);
    }

    fn unbind_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.remove_listener(&self.bridge);
            transport.destroy();
        }
    }

    /// Back to `Disconnected`: timers cancelled, session attributes gone.
    /// The transport stays bound for a potential re-handshake.
    fn drop_session(&mut self, shared: &Arc<Shared>) {
        self.cancel_reconnect();
        shared.set_client_id(None);
        shared.set_state(SessionState::Disconnected);
    }

    /// Full teardown after a disconnect: also destroys the transport and
    /// clears all in-flight bookkeeping.
    fn teardown_session(&mut self, shared: &Arc<Shared>) {
        self.drop_session(shared);
        if let Some(timer) = self.disconnect_timer.take() {
            timer.abort();
        }
        for (_, pending) in self.pending.drain() {
            pending.timeout.abort();
        }
        self.subscribed.clear();
        self.deferred_subscribes.clear();
        self.queue.clear();
        self.unbind_transport();
    }

    fn protocol_error(&mut self, shared: &Arc<Shared>, reason: &str, message: Option<&Message>) {
        tracing::warn!(reason, "protocol error");
        let error = BayeuxError::Protocol(reason.to_string());
        shared.notify_error(&error, message);
        // A protocol error is fatal to a handshake in progress
        if shared.state() == SessionState::Handshaking {
            self.drop_session(shared);
        }
    }

    fn shutdown(&mut self) {
        self.cancel_reconnect();
        if let Some(timer) = self.disconnect_timer.take() {
            timer.abort();
        }
        for (_, pending) in self.pending.drain() {
            pending.timeout.abort();
        }
        self.unbind_transport();
    }
}
