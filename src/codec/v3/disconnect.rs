// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::codec::packet::{ControlPacket, PacketType};
use crate::codec::DecodeError;

/// The DISCONNECT packet (§3.14), the client's notice of a graceful
/// shutdown. Suppresses the will message on the broker side.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Default)]
pub struct Disconnect;

impl Disconnect {
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn decode(flags: u8, body: &[u8]) -> Result<Self, DecodeError> {
        if flags != 0 {
            return Err(DecodeError::Malformed(
                "DISCONNECT fixed header flags must be 0".into(),
            ));
        }
        if !body.is_empty() {
            return Err(DecodeError::Malformed(
                "DISCONNECT remaining length must be 0".into(),
            ));
        }
        Ok(Disconnect)
    }
}

impl ControlPacket for Disconnect {
    fn packet_type(&self) -> PacketType {
        PacketType::Disconnect
    }
}
