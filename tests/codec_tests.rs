//! Codec round-trips and incremental decoding across every packet variant.

use mqlink::codec::v3::*;
use mqlink::codec::{ControlPacket, DecodeError, Decoded, Packet, StreamDecoder};

fn all_packet_variants() -> Vec<Packet> {
    vec![
        Packet::Connect(
            Connect::new("roundtrip-client", 30, false)
                .with_will(Will::new("will/t", b"gone".to_vec(), 1, true).unwrap())
                .with_credentials(Credentials {
                    username: "user".into(),
                    password: Some(b"secret".to_vec()),
                }),
        ),
        Packet::ConnAck(ConnAck::new(true, 0)),
        Packet::Publish(Publish::new("a/b/c", b"payload".to_vec(), 2, true, Some(512)).unwrap()),
        Packet::PubAck(PubAck::new(1)),
        Packet::PubRec(PubRec::new(2)),
        Packet::PubRel(PubRel::new(3)),
        Packet::PubComp(PubComp::new(4)),
        Packet::Subscribe(
            Subscribe::new(
                5,
                vec![
                    TopicFilter::new("x/+/y", 0).unwrap(),
                    TopicFilter::new("z/#", 2).unwrap(),
                ],
            )
            .unwrap(),
        ),
        Packet::SubAck(SubAck::new(5, vec![0, 2])),
        Packet::Unsubscribe(Unsubscribe::new(6, vec!["x/+/y".into()]).unwrap()),
        Packet::UnsubAck(UnsubAck::new(6)),
        Packet::PingReq(PingReq::new()),
        Packet::PingResp(PingResp::new()),
        Packet::Disconnect(Disconnect::new()),
    ]
}

#[test]
fn test_decode_encode_is_identity_for_every_variant() {
    for original in all_packet_variants() {
        let bytes = original.to_bytes();
        match Packet::from_bytes(&bytes).unwrap() {
            Decoded::Packet(parsed, consumed) => {
                assert_eq!(consumed, bytes.len(), "partial consume for {:?}", original);
                assert_eq!(parsed, original);
                // Re-encoding the parsed packet reproduces the input bytes.
                assert_eq!(parsed.to_bytes(), bytes);
            }
            other => panic!("expected complete packet for {:?}, got {:?}", original, other),
        }
    }
}

#[test]
fn test_every_prefix_reports_need_more() {
    for original in all_packet_variants() {
        let bytes = original.to_bytes();
        for cut in 0..bytes.len() {
            match Packet::from_bytes(&bytes[..cut]) {
                Ok(Decoded::NeedMore(n)) => {
                    assert!(n > 0, "zero-byte hint for {:?} cut at {}", original, cut);
                    assert!(
                        n <= bytes.len() - cut,
                        "hint overshoots for {:?}: cut {} hint {}",
                        original,
                        cut,
                        n
                    );
                }
                other => panic!(
                    "prefix of {:?} cut at {} should need more bytes, got {:?}",
                    original, cut, other
                ),
            }
        }
    }
}

#[test]
fn test_remaining_length_hint_is_exact_for_delimited_body() {
    // PUBLISH with a 100-byte payload: once the fixed header is readable,
    // the hint must say exactly how many bytes are missing.
    let publish = Publish::new("topic", vec![0xAB; 100], 0, false, None).unwrap();
    let bytes = publish.to_bytes();

    match Packet::from_bytes(&bytes[..5]).unwrap() {
        Decoded::NeedMore(n) => assert_eq!(n, bytes.len() - 5),
        other => panic!("expected NeedMore, got {:?}", other),
    }
}

#[test]
fn test_overlong_remaining_length_is_malformed() {
    // Five continuation bytes in the remaining length field.
    let bytes = [0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F];
    assert!(matches!(
        Packet::from_bytes(&bytes),
        Err(DecodeError::Malformed(_))
    ));
}

#[test]
fn test_reserved_packet_types_are_rejected() {
    assert!(matches!(
        Packet::from_bytes(&[0x00, 0x00]),
        Err(DecodeError::InvalidPacketType(0))
    ));
    assert!(matches!(
        Packet::from_bytes(&[0xF0, 0x00]),
        Err(DecodeError::InvalidPacketType(15))
    ));
}

#[test]
fn test_stream_decoder_across_arbitrary_chunk_boundaries() {
    let packets = all_packet_variants();
    let mut wire = Vec::new();
    for p in &packets {
        wire.extend(p.to_bytes());
    }

    // Feed the whole session byte stream in 7-byte chunks and expect the
    // same packet sequence out.
    let mut decoder = StreamDecoder::default();
    let mut parsed = Vec::new();
    for chunk in wire.chunks(7) {
        decoder.feed(chunk);
        while let Some(packet) = decoder.next_packet().unwrap() {
            parsed.push(packet);
        }
    }

    assert_eq!(parsed, packets);
    assert_eq!(decoder.buffered(), 0);
}

#[test]
fn test_stream_decoder_surfaces_malformed_input() {
    let mut decoder = StreamDecoder::default();
    decoder.feed(&PingResp::new().to_bytes());
    decoder.feed(&[0x30, 0x80, 0x80, 0x80, 0x80]);

    assert!(matches!(
        decoder.next_packet().unwrap(),
        Some(Packet::PingResp(_))
    ));
    assert!(decoder.next_packet().is_err());
}

#[test]
fn test_publish_max_topic_boundary() {
    let topic = "t".repeat(u16::MAX as usize);
    let publish = Publish::new(topic.clone(), vec![], 0, false, None).unwrap();
    match Packet::from_bytes(&publish.to_bytes()).unwrap() {
        Decoded::Packet(Packet::Publish(p), _) => assert_eq!(p.topic, topic),
        other => panic!("expected PUBLISH, got {:?}", other),
    }

    let too_long = "t".repeat(u16::MAX as usize + 1);
    assert!(Publish::new(too_long, vec![], 0, false, None).is_err());
}
