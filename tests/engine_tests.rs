//! Scripted-broker tests against the sans-I/O engine: the test plays the
//! broker by encoding replies and feeding them to `handle_incoming`.

use std::time::{Duration, Instant};

use mqlink::codec::v3::*;
use mqlink::codec::{Decoded, Packet};
use mqlink::engine::{ConnectionState, Engine, Event};
use mqlink::session::SessionState;
use mqlink::{ClientError, ClientOptions, DeliveryOutcome};

fn options() -> ClientOptions {
    ClientOptions::builder()
        .client_id("engine-test")
        .keep_alive_secs(60)
        .build()
}

/// Drive the CONNECT/CONNACK handshake and discard the setup traffic.
fn connect(engine: &mut Engine, now: Instant) -> Vec<Event> {
    engine.connect(now);
    engine.transport_opened(now);
    let frames = engine.take_outgoing();
    assert!(matches!(decode_one(&frames[0]), Packet::Connect(_)));
    engine.handle_incoming(&Packet::ConnAck(ConnAck::new(false, 0)).to_bytes(), now)
}

fn decode_one(frame: &[u8]) -> Packet {
    match Packet::from_bytes(frame).unwrap() {
        Decoded::Packet(packet, consumed) => {
            assert_eq!(consumed, frame.len());
            packet
        }
        other => panic!("expected a complete packet, got {:?}", other),
    }
}

fn decode_all(frames: &[Vec<u8>]) -> Vec<Packet> {
    frames.iter().map(|f| decode_one(f)).collect()
}

fn completions(events: &[Event]) -> Vec<(mqlink::DeliveryHandle, DeliveryOutcome)> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::DeliveryComplete { handle, outcome } => Some((*handle, outcome.clone())),
            _ => None,
        })
        .collect()
}

#[test]
fn test_handshake_success() {
    let now = Instant::now();
    let mut engine = Engine::new(options());

    engine.connect(now);
    assert_eq!(engine.state(), &ConnectionState::Connecting);

    engine.transport_opened(now);
    let frames = engine.take_outgoing();
    match decode_one(&frames[0]) {
        Packet::Connect(c) => {
            assert_eq!(c.client_id, "engine-test");
            assert!(c.clean_session);
        }
        other => panic!("expected CONNECT, got {:?}", other),
    }

    let events =
        engine.handle_incoming(&Packet::ConnAck(ConnAck::new(false, 0)).to_bytes(), now);
    assert!(engine.is_connected());
    assert!(events.contains(&Event::ConnectionState(ConnectionState::Connected)));
}

#[test]
fn test_handshake_rejected_settles_disconnected() {
    let now = Instant::now();
    let mut engine = Engine::new(options());

    engine.connect(now);
    engine.transport_opened(now);
    let _ = engine.take_outgoing();

    // Return code 5: not authorized.
    let events = engine.handle_incoming(&Packet::ConnAck(ConnAck::new(false, 5)).to_bytes(), now);
    assert_eq!(engine.state(), &ConnectionState::Disconnected);
    assert!(events.contains(&Event::Error(ClientError::ConnectRejected { return_code: 5 })));
    // Rejection never auto-reconnects, even with auto-reconnect enabled.
    assert_eq!(engine.next_deadline(), None);
}

#[test]
fn test_connack_timeout() {
    let now = Instant::now();
    let mut engine = Engine::new(options());

    engine.connect(now);
    engine.transport_opened(now);
    let _ = engine.take_outgoing();

    let deadline = engine.next_deadline().expect("CONNACK deadline armed");
    let events = engine.handle_tick(deadline);
    assert!(events.contains(&Event::Error(ClientError::ConnectTimeout)));
    assert_eq!(engine.state(), &ConnectionState::Disconnected);
}

#[test]
fn test_qos1_publish_exactly_one_completion() {
    let now = Instant::now();
    let mut engine = Engine::new(options());
    connect(&mut engine, now);

    let handle = engine
        .publish("t/1", b"hello".to_vec(), 1, false, now)
        .unwrap();

    let frames = engine.take_outgoing();
    let pid = match decode_one(&frames[0]) {
        Packet::Publish(p) => {
            assert_eq!(p.qos, 1);
            assert!(!p.dup);
            p.packet_id.unwrap()
        }
        other => panic!("expected PUBLISH, got {:?}", other),
    };

    let events = engine.handle_incoming(&Packet::PubAck(PubAck::new(pid)).to_bytes(), now);
    assert_eq!(
        completions(&events),
        vec![(handle, DeliveryOutcome::Delivered)]
    );

    // A stray duplicate PUBACK completes nothing further.
    let events = engine.handle_incoming(&Packet::PubAck(PubAck::new(pid)).to_bytes(), now);
    assert!(completions(&events).is_empty());
}

#[test]
fn test_qos1_retry_then_abandon() {
    let now = Instant::now();
    let retry = Duration::from_secs(20);
    let opts = ClientOptions::builder()
        .client_id("engine-test")
        .max_retries(1)
        .retry_timeout(retry)
        .build();
    let mut engine = Engine::new(opts);
    connect(&mut engine, now);

    let handle = engine.publish("t/1", b"x".to_vec(), 1, false, now).unwrap();
    let _ = engine.take_outgoing();

    // First expiry: dup retransmission.
    let events = engine.handle_tick(now + retry);
    assert!(completions(&events).is_empty());
    match decode_one(&engine.take_outgoing()[0]) {
        Packet::Publish(p) => assert!(p.dup),
        other => panic!("expected PUBLISH, got {:?}", other),
    }

    // Second expiry: retry budget (1) exhausted.
    let events = engine.handle_tick(now + retry * 2);
    assert_eq!(
        completions(&events),
        vec![(handle, DeliveryOutcome::Abandoned { retries: 1 })]
    );
    assert!(engine.take_outgoing().is_empty());
    assert_eq!(engine.outstanding_deliveries(), 0);
    // The connection itself stays up.
    assert!(engine.is_connected());
}

#[test]
fn test_qos2_publish_full_handshake() {
    let now = Instant::now();
    let mut engine = Engine::new(options());
    connect(&mut engine, now);

    let handle = engine
        .publish("t/2", b"exactly-once".to_vec(), 2, false, now)
        .unwrap();
    let pid = match decode_one(&engine.take_outgoing()[0]) {
        Packet::Publish(p) => p.packet_id.unwrap(),
        other => panic!("expected PUBLISH, got {:?}", other),
    };

    let events = engine.handle_incoming(&Packet::PubRec(PubRec::new(pid)).to_bytes(), now);
    assert!(completions(&events).is_empty());
    assert!(matches!(
        decode_one(&engine.take_outgoing()[0]),
        Packet::PubRel(r) if r.packet_id == pid
    ));

    let events = engine.handle_incoming(&Packet::PubComp(PubComp::new(pid)).to_bytes(), now);
    assert_eq!(
        completions(&events),
        vec![(handle, DeliveryOutcome::Delivered)]
    );
}

#[test]
fn test_qos1_receive_acks_and_dedups() {
    let now = Instant::now();
    let mut engine = Engine::new(options());
    connect(&mut engine, now);

    let inbound = Publish::new("news", b"v1".to_vec(), 1, false, Some(77)).unwrap();
    let events = engine.handle_incoming(&Packet::Publish(inbound.clone()).to_bytes(), now);
    let messages: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, Event::Message(_)))
        .collect();
    assert_eq!(messages.len(), 1);
    assert!(matches!(
        decode_one(&engine.take_outgoing()[0]),
        Packet::PubAck(a) if a.packet_id == 77
    ));

    // Redelivery with dup=1 inside the window: ack again, deliver nothing.
    let mut redelivery = inbound;
    redelivery.dup = true;
    let events = engine.handle_incoming(&Packet::Publish(redelivery).to_bytes(), now);
    assert!(!events.iter().any(|e| matches!(e, Event::Message(_))));
    assert!(matches!(
        decode_one(&engine.take_outgoing()[0]),
        Packet::PubAck(a) if a.packet_id == 77
    ));
}

#[test]
fn test_qos2_receive_exactly_once_across_duplicates() {
    let now = Instant::now();
    let mut engine = Engine::new(options());
    connect(&mut engine, now);

    let inbound = Publish::new("t/q2", b"hello".to_vec(), 2, false, Some(9)).unwrap();

    // First PUBLISH: recorded, PUBREC sent, nothing delivered yet.
    let events = engine.handle_incoming(&Packet::Publish(inbound.clone()).to_bytes(), now);
    assert!(!events.iter().any(|e| matches!(e, Event::Message(_))));
    assert!(matches!(
        decode_one(&engine.take_outgoing()[0]),
        Packet::PubRec(r) if r.packet_id == 9
    ));

    // Three duplicate retransmissions before the PUBREL.
    let mut dup = inbound;
    dup.dup = true;
    for _ in 0..3 {
        let events = engine.handle_incoming(&Packet::Publish(dup.clone()).to_bytes(), now);
        assert!(!events.iter().any(|e| matches!(e, Event::Message(_))));
        assert!(matches!(
            decode_one(&engine.take_outgoing()[0]),
            Packet::PubRec(r) if r.packet_id == 9
        ));
    }

    // PUBREL: exactly one delivery, PUBCOMP out.
    let events = engine.handle_incoming(&Packet::PubRel(PubRel::new(9)).to_bytes(), now);
    let messages: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::Message(m) => Some(m.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].payload, b"hello");
    assert_eq!(messages[0].qos, 2);
    assert!(matches!(
        decode_one(&engine.take_outgoing()[0]),
        Packet::PubComp(c) if c.packet_id == 9
    ));

    // A retransmitted PUBREL still gets a PUBCOMP but delivers nothing.
    let events = engine.handle_incoming(&Packet::PubRel(PubRel::new(9)).to_bytes(), now);
    assert!(!events.iter().any(|e| matches!(e, Event::Message(_))));
    assert!(matches!(
        decode_one(&engine.take_outgoing()[0]),
        Packet::PubComp(c) if c.packet_id == 9
    ));
}

#[test]
fn test_identifier_space_exhaustion_and_reuse() {
    let now = Instant::now();
    let mut engine = Engine::with_session(options(), SessionState::with_max_id(3));
    connect(&mut engine, now);

    let mut pids = Vec::new();
    for i in 0..3 {
        engine
            .publish("t", vec![i as u8], 1, false, now)
            .unwrap_or_else(|e| panic!("publish {} failed: {}", i, e));
    }
    for frame in engine.take_outgoing() {
        if let Packet::Publish(p) = decode_one(&frame) {
            pids.push(p.packet_id.unwrap());
        }
    }
    assert_eq!(pids, vec![1, 2, 3]);

    // The namespace is exhausted until an outstanding delivery completes.
    assert_eq!(
        engine.publish("t", vec![9], 1, false, now),
        Err(ClientError::IdentifierSpaceExhausted)
    );

    engine.handle_incoming(&Packet::PubAck(PubAck::new(2)).to_bytes(), now);
    let handle = engine.publish("t", vec![9], 1, false, now);
    assert!(handle.is_ok());
    match decode_one(&engine.take_outgoing()[0]) {
        Packet::Publish(p) => assert_eq!(p.packet_id, Some(2)),
        other => panic!("expected PUBLISH, got {:?}", other),
    }
}

#[test]
fn test_subscribe_flow() {
    let now = Instant::now();
    let mut engine = Engine::new(options());
    connect(&mut engine, now);

    let handle = engine.subscribe("sensor/+/temp", 1, now).unwrap();
    let pid = match decode_one(&engine.take_outgoing()[0]) {
        Packet::Subscribe(s) => {
            assert_eq!(s.filters.len(), 1);
            assert_eq!(s.filters[0].filter, "sensor/+/temp");
            assert_eq!(s.filters[0].qos, 1);
            s.packet_id
        }
        other => panic!("expected SUBSCRIBE, got {:?}", other),
    };

    let events =
        engine.handle_incoming(&Packet::SubAck(SubAck::new(pid, vec![1])).to_bytes(), now);
    assert!(events.contains(&Event::SubscribeComplete {
        handle,
        return_codes: vec![1],
    }));
}

#[test]
fn test_unsubscribe_flow() {
    let now = Instant::now();
    let mut engine = Engine::new(options());
    connect(&mut engine, now);

    engine.subscribe("alerts/#", 0, now).unwrap();
    let sub_pid = match decode_one(&engine.take_outgoing()[0]) {
        Packet::Subscribe(s) => s.packet_id,
        other => panic!("expected SUBSCRIBE, got {:?}", other),
    };
    engine.handle_incoming(&Packet::SubAck(SubAck::new(sub_pid, vec![0])).to_bytes(), now);

    let handle = engine.unsubscribe("alerts/#", now).unwrap();
    let pid = match decode_one(&engine.take_outgoing()[0]) {
        Packet::Unsubscribe(u) => {
            assert_eq!(u.filters, vec!["alerts/#".to_string()]);
            u.packet_id
        }
        other => panic!("expected UNSUBSCRIBE, got {:?}", other),
    };

    let events = engine.handle_incoming(&Packet::UnsubAck(UnsubAck::new(pid)).to_bytes(), now);
    assert!(events.contains(&Event::UnsubscribeComplete { handle }));
}

#[test]
fn test_subscribe_requires_connection() {
    let now = Instant::now();
    let mut engine = Engine::new(options());
    assert_eq!(
        engine.subscribe("t", 0, now),
        Err(ClientError::NotConnected)
    );
    assert_eq!(engine.unsubscribe("t", now), Err(ClientError::NotConnected));
}

#[test]
fn test_keepalive_pings_and_survives_pong() {
    let now = Instant::now();
    let opts = ClientOptions::builder()
        .client_id("engine-test")
        .keep_alive_secs(1)
        .build();
    let mut engine = Engine::new(opts);
    connect(&mut engine, now);
    let _ = engine.take_outgoing();

    // Idle for a full interval: PINGREQ goes out.
    let t1 = now + Duration::from_secs(1);
    engine.handle_tick(t1);
    assert!(matches!(
        decode_one(&engine.take_outgoing()[0]),
        Packet::PingReq(_)
    ));

    // PINGRESP inside the 1.5x window keeps the connection alive.
    let events = engine.handle_incoming(
        &Packet::PingResp(PingResp::new()).to_bytes(),
        t1 + Duration::from_millis(400),
    );
    assert!(!events.iter().any(|e| matches!(e, Event::Error(_))));

    let events = engine.handle_tick(t1 + Duration::from_millis(1400));
    assert!(!events.iter().any(|e| matches!(e, Event::Error(_))));
    assert!(engine.is_connected());
}

#[test]
fn test_keepalive_timeout_without_reconnect() {
    let now = Instant::now();
    let opts = ClientOptions::builder()
        .client_id("engine-test")
        .keep_alive_secs(1)
        .auto_reconnect(false)
        .build();
    let mut engine = Engine::new(opts);
    connect(&mut engine, now);
    let _ = engine.take_outgoing();

    let t1 = now + Duration::from_secs(1);
    engine.handle_tick(t1);
    let _ = engine.take_outgoing();

    // No PINGRESP within 1.5 intervals of the PINGREQ.
    let events = engine.handle_tick(t1 + Duration::from_millis(1500));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Error(ClientError::KeepaliveTimeout(_)))));
    assert_eq!(engine.state(), &ConnectionState::Disconnected);
}

#[test]
fn test_disconnect_sends_packet_and_abandons_inflight() {
    let now = Instant::now();
    let mut engine = Engine::new(options());
    connect(&mut engine, now);

    let handle = engine.publish("t", b"x".to_vec(), 1, false, now).unwrap();
    let _ = engine.take_outgoing();

    engine.disconnect(now);
    let frames = decode_all(&engine.take_outgoing());
    assert!(frames.iter().any(|p| matches!(p, Packet::Disconnect(_))));

    let events = engine.take_events();
    assert_eq!(
        completions(&events),
        vec![(handle, DeliveryOutcome::Abandoned { retries: 0 })]
    );
    assert!(events.contains(&Event::ConnectionState(ConnectionState::Disconnected)));
    assert_eq!(engine.outstanding_deliveries(), 0);
    assert_eq!(engine.next_deadline(), None);
}

#[test]
fn test_malformed_inbound_fails_the_connection() {
    let now = Instant::now();
    let opts = ClientOptions::builder()
        .client_id("engine-test")
        .auto_reconnect(false)
        .build();
    let mut engine = Engine::new(opts);
    connect(&mut engine, now);

    // Overlong remaining length.
    let events = engine.handle_incoming(&[0x30, 0x80, 0x80, 0x80, 0x80, 0x01], now);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Error(ClientError::MalformedPacket(_)))));
    assert_eq!(engine.state(), &ConnectionState::Disconnected);
}

#[test]
fn test_qos0_message_delivered_without_state() {
    let now = Instant::now();
    let mut engine = Engine::new(options());
    connect(&mut engine, now);

    let inbound = Publish::new("fire/hose", b"data".to_vec(), 0, true, None).unwrap();
    let events = engine.handle_incoming(&Packet::Publish(inbound).to_bytes(), now);
    match &events[..] {
        [Event::Message(m)] => {
            assert_eq!(m.topic, "fire/hose");
            assert!(m.retain);
            assert_eq!(m.qos, 0);
        }
        other => panic!("expected exactly one Message event, got {:?}", other),
    }
    // No acknowledgment of any kind.
    assert!(engine.take_outgoing().is_empty());
}
