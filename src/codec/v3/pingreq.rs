// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::codec::packet::{ControlPacket, PacketType};
use crate::codec::DecodeError;

/// The PINGREQ packet (§3.12), sent by the client to keep the session alive
/// in the absence of other traffic.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Default)]
pub struct PingReq;

impl PingReq {
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn decode(flags: u8, body: &[u8]) -> Result<Self, DecodeError> {
        if flags != 0 {
            return Err(DecodeError::Malformed(
                "PINGREQ fixed header flags must be 0".into(),
            ));
        }
        if !body.is_empty() {
            return Err(DecodeError::Malformed(
                "PINGREQ remaining length must be 0".into(),
            ));
        }
        Ok(PingReq)
    }
}

impl ControlPacket for PingReq {
    fn packet_type(&self) -> PacketType {
        PacketType::PingReq
    }
}
