// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::codec::packet::{ControlPacket, PacketType};
use crate::codec::DecodeError;

/// The PUBREC packet, first acknowledgment of a QoS 2 PUBLISH (§3.5).
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct PubRec {
    pub packet_id: u16,
}

impl PubRec {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }

    pub(crate) fn decode(flags: u8, body: &[u8]) -> Result<Self, DecodeError> {
        if flags != 0 {
            return Err(DecodeError::Malformed(
                "PUBREC fixed header flags must be 0".into(),
            ));
        }
        if body.len() != 2 {
            return Err(DecodeError::Malformed(
                "PUBREC remaining length must be 2".into(),
            ));
        }
        Ok(PubRec {
            packet_id: u16::from_be_bytes([body[0], body[1]]),
        })
    }
}

impl ControlPacket for PubRec {
    fn packet_type(&self) -> PacketType {
        PacketType::PubRec
    }

    fn variable_header(&self) -> Vec<u8> {
        self.packet_id.to_be_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Decoded, Packet};

    #[test]
    fn test_pubrec_roundtrip() {
        let original = PubRec::new(777);
        assert_eq!(original.to_bytes(), vec![0x50, 0x02, 0x03, 0x09]);
        match Packet::from_bytes(&original.to_bytes()).unwrap() {
            Decoded::Packet(Packet::PubRec(parsed), 4) => assert_eq!(original, parsed),
            other => panic!("expected PUBREC, got {:?}", other),
        }
    }
}
