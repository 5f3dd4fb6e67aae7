// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::codec::packet::{ControlPacket, PacketType};
use crate::codec::DecodeError;

/// The PUBREL packet, release step of the QoS 2 handshake (§3.6).
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct PubRel {
    pub packet_id: u16,
}

impl PubRel {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }

    pub(crate) fn decode(flags: u8, body: &[u8]) -> Result<Self, DecodeError> {
        // Bits 3,2,1,0 of the fixed header MUST be 0,0,1,0 (§3.6.1).
        if flags != 0x02 {
            return Err(DecodeError::Malformed(
                "PUBREL fixed header flags must be 0b0010".into(),
            ));
        }
        if body.len() != 2 {
            return Err(DecodeError::Malformed(
                "PUBREL remaining length must be 2".into(),
            ));
        }
        Ok(PubRel {
            packet_id: u16::from_be_bytes([body[0], body[1]]),
        })
    }
}

impl ControlPacket for PubRel {
    fn packet_type(&self) -> PacketType {
        PacketType::PubRel
    }

    fn flags(&self) -> u8 {
        0x02
    }

    fn variable_header(&self) -> Vec<u8> {
        self.packet_id.to_be_bytes().to_vec()
    }
}
