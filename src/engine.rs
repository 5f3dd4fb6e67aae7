// SPDX-License-Identifier: MPL-2.0

//! The sans-I/O protocol engine.
//!
//! The engine holds the connection state machine and owns the session,
//! delivery, and keepalive components. It performs no I/O: callers feed it
//! inbound bytes (`handle_incoming`), clock ticks (`handle_tick`), and
//! commands (`connect`, `publish`, ...), and drain outbound frames
//! (`take_outgoing`) and typed events (`take_events`). Because every input
//! is applied on the caller's single thread of execution, identifier
//! allocation, delivery bookkeeping, and state transitions are atomic with
//! respect to one another.
//!
//! The run loop contract: after feeding any input, write out all frames
//! from `take_outgoing`, dispatch all events from `take_events`, then sleep
//! until `next_deadline`.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::backoff::{Backoff, BackoffError};
use crate::codec::v3::{
    ConnAck, Connect, Disconnect, PingReq, PubAck, PubComp, PubRec, PubRel, Publish, SubAck,
    Subscribe, TopicFilter, Unsubscribe,
};
use crate::codec::v3::suback::SUBSCRIBE_FAILURE;
use crate::codec::{Packet, StreamDecoder};
use crate::delivery::{
    DeliveryEngine, DeliveryHandle, DeliveryOutcome, InboundDisposition, ReceivedMessage,
};
use crate::error::ClientError;
use crate::keepalive::{KeepaliveAction, KeepaliveMonitor};
use crate::options::{ClientOptions, Qos2DedupPolicy};
use crate::session::SessionState;

/// Opaque token identifying one subscribe or unsubscribe request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscribeHandle(u64);

impl fmt::Display for SubscribeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of the broker connection.
///
/// `Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected`,
/// with `Reconnecting` entered on transport failure when auto-reconnect is
/// enabled and looping back to `Connecting` once the backoff delay elapses.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting { delay: Duration },
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnecting => "Disconnecting",
            ConnectionState::Reconnecting { .. } => "Reconnecting",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Reconnecting { delay } => {
                write!(f, "Reconnecting (in {:.1}s)", delay.as_secs_f64())
            }
            other => f.write_str(other.as_str()),
        }
    }
}

/// Typed events emitted by the engine, consumed by the I/O shell and
/// forwarded to the caller's handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ConnectionState(ConnectionState),
    Message(ReceivedMessage),
    DeliveryComplete {
        handle: DeliveryHandle,
        outcome: DeliveryOutcome,
    },
    SubscribeComplete {
        handle: SubscribeHandle,
        /// Granted QoS per filter, 0x80 for a refused filter.
        return_codes: Vec<u8>,
    },
    UnsubscribeComplete {
        handle: SubscribeHandle,
    },
    Error(ClientError),
}

pub struct Engine {
    options: ClientOptions,
    state: ConnectionState,
    session: SessionState,
    delivery: DeliveryEngine,
    keepalive: KeepaliveMonitor,
    backoff: Backoff,
    decoder: StreamDecoder,
    outgoing: VecDeque<Vec<u8>>,
    events: Vec<Event>,

    /// Deadline for the CONNACK after the transport opened.
    connack_deadline: Option<Instant>,
    /// When the next reconnect attempt starts. Owned by the engine and
    /// cleared the moment the connection tears down for any other reason.
    reconnect_at: Option<Instant>,

    next_delivery_token: u64,
    next_subscribe_token: u64,
    pending_subscribes: HashMap<u16, (SubscribeHandle, Vec<TopicFilter>)>,
    pending_unsubscribes: HashMap<u16, (SubscribeHandle, Vec<String>)>,
}

impl Engine {
    pub fn new(options: ClientOptions) -> Self {
        Self::with_session(options, SessionState::new())
    }

    /// An engine over a caller-supplied session, used to shrink the packet
    /// identifier namespace.
    pub fn with_session(options: ClientOptions, session: SessionState) -> Self {
        let now = Instant::now();
        let keepalive = KeepaliveMonitor::new(options.keep_alive_secs, now);
        let backoff = Backoff::new(
            options.reconnect_policy.clone(),
            options.max_reconnect_attempts,
        );
        let delivery = DeliveryEngine::new(options.retry_timeout, options.max_retries);
        Engine {
            options,
            state: ConnectionState::Disconnected,
            session,
            delivery,
            keepalive,
            backoff,
            decoder: StreamDecoder::default(),
            outgoing: VecDeque::new(),
            events: Vec::new(),
            connack_deadline: None,
            reconnect_at: None,
            next_delivery_token: 0,
            next_subscribe_token: 0,
            pending_subscribes: HashMap::new(),
            pending_unsubscribes: HashMap::new(),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn outstanding_deliveries(&self) -> usize {
        self.delivery.outstanding()
    }

    /// Drain all pending events. Call after every input.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Drain outbound frames. Each element is one complete packet; the shell
    /// must write them in order, never interleaved.
    pub fn take_outgoing(&mut self) -> Vec<Vec<u8>> {
        self.outgoing.drain(..).collect()
    }

    /// The next instant at which [`handle_tick`](Self::handle_tick) has work
    /// to do. `None` means sleep until I/O or a command arrives.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            ConnectionState::Connecting => self.connack_deadline,
            ConnectionState::Reconnecting { .. } => self.reconnect_at,
            ConnectionState::Connected => {
                match (self.keepalive.next_deadline(), self.delivery.next_deadline()) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                }
            }
            _ => None,
        }
    }

    // ---- commands ----

    /// Begin connecting. The shell opens the transport when it observes the
    /// `Connecting` state and then calls [`transport_opened`](Self::transport_opened).
    pub fn connect(&mut self, _now: Instant) {
        if self.state != ConnectionState::Disconnected {
            debug!(state = %self.state, "connect ignored in current state");
            return;
        }
        self.backoff.reset();
        self.reconnect_at = None;
        self.set_state(ConnectionState::Connecting);
    }

    /// The transport is open; send CONNECT and start the CONNACK timer.
    pub fn transport_opened(&mut self, now: Instant) {
        if self.state != ConnectionState::Connecting {
            debug!(state = %self.state, "transport opened in unexpected state");
            return;
        }

        self.decoder.clear();

        let mut connect = Connect::new(
            self.options.client_id.clone(),
            self.options.keep_alive_secs,
            self.options.clean_session,
        );
        if let Some(will) = self.options.will.clone() {
            connect = connect.with_will(will);
        }
        if let Some(credentials) = self.options.credentials.clone() {
            connect = connect.with_credentials(credentials);
        }

        self.queue_packet(&Packet::Connect(connect), now);
        self.connack_deadline = Some(now + self.options.connect_timeout);
    }

    /// The transport failed: open error, read/write error, or EOF.
    pub fn transport_error(&mut self, reason: &str, now: Instant) {
        match self.state {
            ConnectionState::Connected | ConnectionState::Connecting => {
                self.connection_lost(ClientError::ConnectionLost(reason.to_string()), now);
            }
            ConnectionState::Disconnecting => {
                // Already tearing down; nothing left to salvage.
                self.set_state(ConnectionState::Disconnected);
            }
            _ => {}
        }
    }

    /// Graceful shutdown: send DISCONNECT if connected, abandon whatever is
    /// still in flight, and settle in `Disconnected`. Cancels every timer.
    pub fn disconnect(&mut self, now: Instant) {
        if self.state == ConnectionState::Disconnected {
            return;
        }

        if self.state == ConnectionState::Connected {
            self.queue_packet(&Packet::Disconnect(Disconnect::new()), now);
            self.set_state(ConnectionState::Disconnecting);
        }

        self.connack_deadline = None;
        self.reconnect_at = None;
        self.backoff.reset();

        for d in self.delivery.drain_outbound() {
            self.events.push(Event::DeliveryComplete {
                handle: d.handle,
                outcome: DeliveryOutcome::Abandoned { retries: d.retries },
            });
        }
        self.delivery.clear();
        self.session.clear();
        self.pending_subscribes.clear();
        self.pending_unsubscribes.clear();
        self.decoder.clear();

        self.set_state(ConnectionState::Disconnected);
    }

    /// Queue an application message. QoS 0 requires a live connection and
    /// completes immediately; QoS 1/2 publishes are tracked until their
    /// handshake finishes and may be issued while disconnected, in which
    /// case they go out after the next CONNACK.
    pub fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        qos: u8,
        retain: bool,
        now: Instant,
    ) -> Result<DeliveryHandle, ClientError> {
        if qos == 0 {
            if !self.state.is_connected() {
                return Err(ClientError::NotConnected);
            }
            let publish = Publish::new(topic, payload, 0, retain, None)?;
            let handle = self.next_delivery_handle();
            self.queue_packet(&Packet::Publish(publish), now);
            self.events.push(Event::DeliveryComplete {
                handle,
                outcome: DeliveryOutcome::Delivered,
            });
            return Ok(handle);
        }

        let id = self.session.allocate_id()?;
        let publish = match Publish::new(topic, payload, qos, retain, Some(id)) {
            Ok(p) => p,
            Err(e) => {
                self.session.release_id(id);
                return Err(e.into());
            }
        };

        let handle = self.next_delivery_handle();
        let connected = self.state.is_connected();
        self.delivery.track(handle, publish.clone(), now, connected);
        if connected {
            self.queue_packet(&Packet::Publish(publish), now);
        } else {
            debug!(%handle, packet_id = id, "publish queued until reconnect");
        }
        Ok(handle)
    }

    pub fn subscribe(
        &mut self,
        filter: &str,
        qos: u8,
        now: Instant,
    ) -> Result<SubscribeHandle, ClientError> {
        if !self.state.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let topic_filter = TopicFilter::new(filter, qos)?;
        let id = self.session.allocate_id()?;
        let subscribe = match Subscribe::new(id, vec![topic_filter.clone()]) {
            Ok(s) => s,
            Err(e) => {
                self.session.release_id(id);
                return Err(e.into());
            }
        };

        let handle = self.next_subscribe_handle();
        self.pending_subscribes.insert(id, (handle, vec![topic_filter]));
        self.queue_packet(&Packet::Subscribe(subscribe), now);
        Ok(handle)
    }

    pub fn unsubscribe(
        &mut self,
        filter: &str,
        now: Instant,
    ) -> Result<SubscribeHandle, ClientError> {
        if !self.state.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let id = self.session.allocate_id()?;
        let unsubscribe = match Unsubscribe::new(id, vec![filter.to_string()]) {
            Ok(u) => u,
            Err(e) => {
                self.session.release_id(id);
                return Err(e.into());
            }
        };

        let handle = self.next_subscribe_handle();
        self.pending_unsubscribes
            .insert(id, (handle, vec![filter.to_string()]));
        self.queue_packet(&Packet::Unsubscribe(unsubscribe), now);
        Ok(handle)
    }

    // ---- inputs ----

    /// Feed raw bytes from the transport.
    pub fn handle_incoming(&mut self, data: &[u8], now: Instant) -> Vec<Event> {
        if matches!(
            self.state,
            ConnectionState::Disconnected | ConnectionState::Reconnecting { .. }
        ) {
            return self.take_events();
        }

        self.decoder.feed(data);
        self.keepalive.record_receive(now);

        loop {
            match self.decoder.next_packet() {
                Ok(Some(packet)) => self.handle_packet(packet, now),
                Ok(None) => break,
                Err(e) => {
                    // A desynchronized stream cannot be resynchronized;
                    // fail the connection.
                    warn!(
                        error = %e,
                        data = %hex::encode(self.decoder.preview(16)),
                        "malformed inbound packet"
                    );
                    self.connection_lost(e.into(), now);
                    break;
                }
            }
        }

        self.take_events()
    }

    /// Process clock-driven work: reconnect timers, the CONNACK deadline,
    /// keepalive, and delivery retries.
    pub fn handle_tick(&mut self, now: Instant) -> Vec<Event> {
        match self.state {
            ConnectionState::Reconnecting { .. } => {
                if let Some(at) = self.reconnect_at {
                    if now >= at {
                        self.reconnect_at = None;
                        info!(attempt = self.backoff.attempt(), "starting reconnect attempt");
                        self.set_state(ConnectionState::Connecting);
                    }
                }
            }
            ConnectionState::Connecting => {
                if let Some(deadline) = self.connack_deadline {
                    if now >= deadline {
                        warn!("CONNACK did not arrive within the connect timeout");
                        self.connack_deadline = None;
                        self.events.push(Event::Error(ClientError::ConnectTimeout));
                        self.set_state(ConnectionState::Disconnected);
                    }
                }
            }
            ConnectionState::Connected => {
                match self.keepalive.poll(now) {
                    Some(KeepaliveAction::SendPing) => {
                        debug!("keepalive interval idle, sending PINGREQ");
                        self.queue_packet(&Packet::PingReq(PingReq::new()), now);
                    }
                    Some(KeepaliveAction::Timeout) => {
                        let window = self.keepalive.interval() + self.keepalive.interval() / 2;
                        self.connection_lost(ClientError::KeepaliveTimeout(window), now);
                        return self.take_events();
                    }
                    None => {}
                }

                let (resend, abandoned) = self.delivery.poll_retries(now);
                for packet in resend {
                    self.queue_packet(&packet, now);
                }
                for d in abandoned {
                    if let Some(id) = d.publish.packet_id {
                        self.session.release_id(id);
                    }
                    self.events.push(Event::DeliveryComplete {
                        handle: d.handle,
                        outcome: DeliveryOutcome::Abandoned { retries: d.retries },
                    });
                }
            }
            _ => {}
        }

        self.take_events()
    }

    // ---- internals ----

    fn handle_packet(&mut self, packet: Packet, now: Instant) {
        match packet {
            Packet::ConnAck(ack) => self.handle_connack(ack, now),
            Packet::Publish(publish) => {
                if !self.state.is_connected() {
                    warn!("PUBLISH before CONNACK, ignoring");
                    return;
                }
                match self.delivery.on_inbound_publish(&publish, now) {
                    InboundDisposition::Deliver(msg) => {
                        self.events.push(Event::Message(msg));
                    }
                    InboundDisposition::DeliverThenAck(msg, id) => {
                        self.events.push(Event::Message(msg));
                        self.queue_packet(&Packet::PubAck(PubAck::new(id)), now);
                    }
                    InboundDisposition::AckDuplicate(id) => {
                        self.queue_packet(&Packet::PubAck(PubAck::new(id)), now);
                    }
                    InboundDisposition::RecordAndRec(id) => {
                        self.queue_packet(&Packet::PubRec(PubRec::new(id)), now);
                    }
                }
            }
            Packet::PubAck(ack) => {
                if let Some(d) = self.delivery.on_puback(ack.packet_id) {
                    self.session.release_id(ack.packet_id);
                    self.events.push(Event::DeliveryComplete {
                        handle: d.handle,
                        outcome: DeliveryOutcome::Delivered,
                    });
                }
            }
            Packet::PubRec(rec) => {
                if self.delivery.on_pubrec(rec.packet_id, now) {
                    self.queue_packet(&Packet::PubRel(PubRel::new(rec.packet_id)), now);
                }
            }
            Packet::PubRel(rel) => {
                if let Some(msg) = self.delivery.on_pubrel(rel.packet_id) {
                    self.events.push(Event::Message(msg));
                }
                // PUBCOMP goes out even for unknown identifiers so a
                // retransmitted PUBREL terminates cleanly.
                self.queue_packet(&Packet::PubComp(PubComp::new(rel.packet_id)), now);
            }
            Packet::PubComp(comp) => {
                if let Some(d) = self.delivery.on_pubcomp(comp.packet_id) {
                    self.session.release_id(comp.packet_id);
                    self.events.push(Event::DeliveryComplete {
                        handle: d.handle,
                        outcome: DeliveryOutcome::Delivered,
                    });
                }
            }
            Packet::SubAck(ack) => self.handle_suback(ack),
            Packet::UnsubAck(ack) => {
                if let Some((handle, filters)) = self.pending_unsubscribes.remove(&ack.packet_id) {
                    self.session.release_id(ack.packet_id);
                    for filter in &filters {
                        self.session.remove_subscription(filter);
                    }
                    self.events.push(Event::UnsubscribeComplete { handle });
                } else {
                    debug!(packet_id = ack.packet_id, "UNSUBACK for unknown identifier");
                }
            }
            Packet::PingResp(_) => {
                debug!("PINGRESP received");
            }
            other => {
                warn!(packet = ?other.packet_type(), "ignoring packet the broker should not send");
            }
        }
    }

    fn handle_connack(&mut self, ack: ConnAck, now: Instant) {
        if self.state != ConnectionState::Connecting {
            warn!(state = %self.state, "CONNACK in unexpected state, ignoring");
            return;
        }
        self.connack_deadline = None;

        if !ack.accepted() {
            info!(return_code = ack.return_code, "broker rejected connection");
            self.events.push(Event::Error(ClientError::ConnectRejected {
                return_code: ack.return_code,
            }));
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        info!(session_present = ack.session_present, "connected");
        self.backoff.reset();
        self.keepalive.reset(now);

        // A fresh session always clears receiver-side dedup state; on a
        // resumed session the configured policy decides.
        if !ack.session_present || self.options.qos2_dedup == Qos2DedupPolicy::Clear {
            self.delivery.clear_receiver_state();
        }

        self.set_state(ConnectionState::Connected);

        for packet in self.delivery.resend_after_reconnect(now) {
            self.queue_packet(&packet, now);
        }
    }

    fn handle_suback(&mut self, ack: SubAck) {
        let Some((handle, filters)) = self.pending_subscribes.remove(&ack.packet_id) else {
            debug!(packet_id = ack.packet_id, "SUBACK for unknown identifier");
            return;
        };
        self.session.release_id(ack.packet_id);

        for (filter, &code) in filters.iter().zip(ack.return_codes.iter()) {
            if code == SUBSCRIBE_FAILURE {
                warn!(filter = %filter.filter, "broker refused subscription");
            } else {
                self.session.record_subscription(filter.filter.clone(), code);
            }
        }

        self.events.push(Event::SubscribeComplete {
            handle,
            return_codes: ack.return_codes,
        });
    }

    /// Common teardown for transport failure, keepalive death, and
    /// malformed input. Outstanding deliveries are preserved: they resend
    /// (dup=1) after the next successful CONNACK, whether that comes from
    /// auto-reconnect or a later manual `connect()`.
    fn connection_lost(&mut self, error: ClientError, now: Instant) {
        warn!(error = %error, "connection lost");
        self.connack_deadline = None;
        self.decoder.clear();
        self.events.push(Event::Error(error));

        if !self.options.auto_reconnect {
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        match self.backoff.next_delay() {
            Ok(delay) => {
                self.reconnect_at = Some(now + delay);
                self.set_state(ConnectionState::Reconnecting { delay });
            }
            Err(BackoffError::Exhausted(attempts)) => {
                self.events
                    .push(Event::Error(ClientError::ReconnectExhausted { attempts }));
                self.reconnect_at = None;
                self.set_state(ConnectionState::Disconnected);
            }
        }
    }

    fn queue_packet(&mut self, packet: &Packet, now: Instant) {
        self.outgoing.push_back(packet.to_bytes());
        self.keepalive.record_send(now);
        if let Packet::Publish(p) = packet {
            if let Some(id) = p.packet_id {
                self.delivery.mark_sent(id, now);
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        info!(from = %self.state, to = %state, "connection state change");
        self.state = state;
        self.events
            .push(Event::ConnectionState(self.state.clone()));
    }

    fn next_delivery_handle(&mut self) -> DeliveryHandle {
        self.next_delivery_token += 1;
        DeliveryHandle(self.next_delivery_token)
    }

    fn next_subscribe_handle(&mut self) -> SubscribeHandle {
        self.next_subscribe_token += 1;
        SubscribeHandle(self.next_subscribe_token)
    }
}
