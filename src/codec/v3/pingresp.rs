// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::codec::packet::{ControlPacket, PacketType};
use crate::codec::DecodeError;

/// The PINGRESP packet (§3.13), the broker's answer to PINGREQ.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Default)]
pub struct PingResp;

impl PingResp {
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn decode(flags: u8, body: &[u8]) -> Result<Self, DecodeError> {
        if flags != 0 {
            return Err(DecodeError::Malformed(
                "PINGRESP fixed header flags must be 0".into(),
            ));
        }
        if !body.is_empty() {
            return Err(DecodeError::Malformed(
                "PINGRESP remaining length must be 0".into(),
            ));
        }
        Ok(PingResp)
    }
}

impl ControlPacket for PingResp {
    fn packet_type(&self) -> PacketType {
        PacketType::PingResp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Decoded, Packet};

    #[test]
    fn test_pingresp_roundtrip() {
        let original = PingResp::new();
        assert_eq!(original.to_bytes(), vec![0xD0, 0x00]);
        match Packet::from_bytes(&original.to_bytes()).unwrap() {
            Decoded::Packet(Packet::PingResp(parsed), 2) => assert_eq!(original, parsed),
            other => panic!("expected PINGRESP, got {:?}", other),
        }
    }
}
