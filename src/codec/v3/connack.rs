// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::codec::packet::{ControlPacket, PacketType};
use crate::codec::DecodeError;

/// Connection accepted (§3.2.2.3).
pub const ACCEPTED: u8 = 0x00;

/// The CONNACK packet, the broker's reply to CONNECT (§3.2).
///
/// A non-zero return code means the connection was refused; the session
/// present flag tells the client whether the broker resumed stored state.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ConnAck {
    pub session_present: bool,
    pub return_code: u8,
}

impl ConnAck {
    pub fn new(session_present: bool, return_code: u8) -> Self {
        Self {
            session_present,
            return_code,
        }
    }

    pub fn accepted(&self) -> bool {
        self.return_code == ACCEPTED
    }

    pub(crate) fn decode(flags: u8, body: &[u8]) -> Result<Self, DecodeError> {
        if flags != 0 {
            return Err(DecodeError::Malformed(
                "CONNACK fixed header flags must be 0".into(),
            ));
        }
        if body.len() != 2 {
            return Err(DecodeError::Malformed(
                "CONNACK remaining length must be 2".into(),
            ));
        }
        if body[0] & 0xFE != 0 {
            return Err(DecodeError::Malformed(
                "CONNACK acknowledge flags reserved bits are not 0".into(),
            ));
        }
        Ok(ConnAck {
            session_present: body[0] & 0x01 != 0,
            return_code: body[1],
        })
    }
}

impl ControlPacket for ConnAck {
    fn packet_type(&self) -> PacketType {
        PacketType::ConnAck
    }

    fn variable_header(&self) -> Vec<u8> {
        vec![self.session_present as u8, self.return_code]
    }
}
