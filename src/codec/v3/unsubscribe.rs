// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::codec::packet::{ControlPacket, PacketType};
use crate::codec::wire::{TwoByteInteger, Utf8String};
use crate::codec::{validate_topic, DecodeError, PacketError};

/// The UNSUBSCRIBE packet (§3.10).
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Unsubscribe {
    pub packet_id: u16,
    pub filters: Vec<String>,
}

impl Unsubscribe {
    pub fn new(packet_id: u16, filters: Vec<String>) -> Result<Self, PacketError> {
        if filters.is_empty() {
            return Err(PacketError::EmptySubscription);
        }
        for filter in &filters {
            validate_topic(filter)?;
        }
        Ok(Self { packet_id, filters })
    }

    pub(crate) fn decode(flags: u8, body: &[u8]) -> Result<Self, DecodeError> {
        // Bits 3,2,1,0 of the fixed header MUST be 0,0,1,0 (§3.10.1).
        if flags != 0x02 {
            return Err(DecodeError::Malformed(
                "UNSUBSCRIBE fixed header flags must be 0b0010".into(),
            ));
        }

        let (packet_id, mut offset) = TwoByteInteger::decode(body)?;

        let mut filters = Vec::new();
        while offset < body.len() {
            let (filter, consumed) = Utf8String::decode(&body[offset..])?;
            offset += consumed;
            filters.push(filter);
        }

        if filters.is_empty() {
            return Err(DecodeError::Malformed(
                "UNSUBSCRIBE payload contains no topic filters".into(),
            ));
        }

        Ok(Unsubscribe { packet_id, filters })
    }
}

impl ControlPacket for Unsubscribe {
    fn packet_type(&self) -> PacketType {
        PacketType::Unsubscribe
    }

    fn flags(&self) -> u8 {
        0x02
    }

    fn variable_header(&self) -> Vec<u8> {
        TwoByteInteger::encode(self.packet_id).to_vec()
    }

    fn payload(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        for filter in &self.filters {
            payload.extend(Utf8String::encode(filter));
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Decoded, Packet};

    #[test]
    fn test_unsubscribe_roundtrip() {
        let original = Unsubscribe::new(7, vec!["a/b".into(), "c/#".into()]).unwrap();
        assert_eq!(
            original.to_bytes(),
            vec![
                0xA2, 12, 0x00, 0x07, // packet id
                0x00, 0x03, b'a', b'/', b'b', // first filter
                0x00, 0x03, b'c', b'/', b'#', // second filter
            ]
        );
        match Packet::from_bytes(&original.to_bytes()).unwrap() {
            Decoded::Packet(Packet::Unsubscribe(parsed), 14) => assert_eq!(original, parsed),
            other => panic!("expected UNSUBSCRIBE, got {:?}", other),
        }
    }

    #[test]
    fn test_unsubscribe_empty_is_construction_error() {
        assert_eq!(
            Unsubscribe::new(1, vec![]),
            Err(PacketError::EmptySubscription)
        );
    }

    #[test]
    fn test_unsubscribe_invalid_flags() {
        let bytes = vec![0xA0, 7, 0x00, 0x07, 0x00, 0x03, b'a', b'/', b'b'];
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(DecodeError::Malformed(_))
        ));
    }
}
