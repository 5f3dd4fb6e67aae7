// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::codec::packet::{ControlPacket, PacketType};
use crate::codec::wire::{TwoByteInteger, Utf8String, MAX_REMAINING_LENGTH};
use crate::codec::{validate_qos, validate_topic, DecodeError, PacketError};

/// The PUBLISH packet, carrying an application message in either
/// direction (§3.3).
///
/// A packet identifier is present exactly when QoS > 0; [`Publish::new`]
/// enforces that at construction so encoding never has to fail.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Publish {
    pub dup: bool,
    pub qos: u8,
    pub retain: bool,
    pub topic: String,
    pub packet_id: Option<u16>,
    pub payload: Vec<u8>,
}

impl Publish {
    pub fn new(
        topic: impl Into<String>,
        payload: Vec<u8>,
        qos: u8,
        retain: bool,
        packet_id: Option<u16>,
    ) -> Result<Self, PacketError> {
        let topic = topic.into();
        validate_topic(&topic)?;
        validate_qos(qos)?;
        match (qos, packet_id) {
            (0, Some(_)) => return Err(PacketError::UnexpectedPacketId),
            (q, None) if q > 0 => return Err(PacketError::MissingPacketId(q)),
            _ => {}
        }
        if payload.len() > MAX_REMAINING_LENGTH - topic.len() - 4 {
            return Err(PacketError::PayloadTooLarge(payload.len()));
        }
        Ok(Self {
            dup: false,
            qos,
            retain,
            topic,
            packet_id,
            payload,
        })
    }

    pub(crate) fn decode(flags: u8, body: &[u8]) -> Result<Self, DecodeError> {
        let dup = flags & 0x08 != 0;
        let qos = (flags & 0x06) >> 1;
        let retain = flags & 0x01 != 0;

        if qos > 2 {
            return Err(DecodeError::Malformed("PUBLISH QoS level 3".into()));
        }
        if qos == 0 && dup {
            return Err(DecodeError::Malformed(
                "PUBLISH dup flag set on a QoS 0 message".into(),
            ));
        }

        let mut offset = 0usize;
        let (topic, consumed) = Utf8String::decode(body)?;
        offset += consumed;

        let packet_id = if qos > 0 {
            let (id, consumed) = TwoByteInteger::decode(&body[offset..])?;
            offset += consumed;
            Some(id)
        } else {
            None
        };

        Ok(Publish {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            payload: body[offset..].to_vec(),
        })
    }
}

impl ControlPacket for Publish {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish
    }

    fn flags(&self) -> u8 {
        ((self.dup as u8) << 3) | (self.qos << 1) | (self.retain as u8)
    }

    fn variable_header(&self) -> Vec<u8> {
        debug_assert!(self.qos == 0 || self.packet_id.is_some());
        let mut vh = Utf8String::encode(&self.topic);
        if self.qos > 0 {
            if let Some(id) = self.packet_id {
                vh.extend_from_slice(&TwoByteInteger::encode(id));
            }
        }
        vh
    }

    fn payload(&self) -> Vec<u8> {
        self.payload.clone()
    }
}
