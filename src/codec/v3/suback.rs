// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::codec::packet::{ControlPacket, PacketType};
use crate::codec::wire::TwoByteInteger;
use crate::codec::DecodeError;

/// Return code for a failed subscription (§3.9.3).
pub const SUBSCRIBE_FAILURE: u8 = 0x80;

/// The SUBACK packet (§3.9). One return code per filter in the SUBSCRIBE it
/// answers: the granted QoS, or 0x80 for failure.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct SubAck {
    pub packet_id: u16,
    pub return_codes: Vec<u8>,
}

impl SubAck {
    pub fn new(packet_id: u16, return_codes: Vec<u8>) -> Self {
        Self {
            packet_id,
            return_codes,
        }
    }

    pub(crate) fn decode(flags: u8, body: &[u8]) -> Result<Self, DecodeError> {
        if flags != 0 {
            return Err(DecodeError::Malformed(
                "SUBACK fixed header flags must be 0".into(),
            ));
        }

        let (packet_id, offset) = TwoByteInteger::decode(body)?;
        let return_codes = body[offset..].to_vec();
        if return_codes.is_empty() {
            return Err(DecodeError::Malformed(
                "SUBACK payload contains no return codes".into(),
            ));
        }
        for &code in &return_codes {
            if code > 2 && code != SUBSCRIBE_FAILURE {
                return Err(DecodeError::Malformed(format!(
                    "invalid SUBACK return code 0x{:02X}",
                    code
                )));
            }
        }

        Ok(SubAck {
            packet_id,
            return_codes,
        })
    }
}

impl ControlPacket for SubAck {
    fn packet_type(&self) -> PacketType {
        PacketType::SubAck
    }

    fn variable_header(&self) -> Vec<u8> {
        TwoByteInteger::encode(self.packet_id).to_vec()
    }

    fn payload(&self) -> Vec<u8> {
        self.return_codes.clone()
    }
}
