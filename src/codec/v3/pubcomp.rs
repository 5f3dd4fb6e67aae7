// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::codec::packet::{ControlPacket, PacketType};
use crate::codec::DecodeError;

/// The PUBCOMP packet, final acknowledgment of a QoS 2 exchange (§3.7).
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct PubComp {
    pub packet_id: u16,
}

impl PubComp {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }

    pub(crate) fn decode(flags: u8, body: &[u8]) -> Result<Self, DecodeError> {
        if flags != 0 {
            return Err(DecodeError::Malformed(
                "PUBCOMP fixed header flags must be 0".into(),
            ));
        }
        if body.len() != 2 {
            return Err(DecodeError::Malformed(
                "PUBCOMP remaining length must be 2".into(),
            ));
        }
        Ok(PubComp {
            packet_id: u16::from_be_bytes([body[0], body[1]]),
        })
    }
}

impl ControlPacket for PubComp {
    fn packet_type(&self) -> PacketType {
        PacketType::PubComp
    }

    fn variable_header(&self) -> Vec<u8> {
        self.packet_id.to_be_bytes().to_vec()
    }
}
