// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::codec::packet::{ControlPacket, PacketType};
use crate::codec::wire::{TwoByteInteger, Utf8String};
use crate::codec::{validate_qos, validate_topic, DecodeError, PacketError};

/// One requested subscription: a topic filter and the maximum QoS the
/// client is willing to receive on it.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct TopicFilter {
    pub filter: String,
    pub qos: u8,
}

impl TopicFilter {
    pub fn new(filter: impl Into<String>, qos: u8) -> Result<Self, PacketError> {
        let filter = filter.into();
        validate_topic(&filter)?;
        validate_qos(qos)?;
        Ok(Self { filter, qos })
    }
}

/// The SUBSCRIBE packet (§3.8). Always carries a packet identifier and at
/// least one topic filter.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Subscribe {
    pub packet_id: u16,
    pub filters: Vec<TopicFilter>,
}

impl Subscribe {
    pub fn new(packet_id: u16, filters: Vec<TopicFilter>) -> Result<Self, PacketError> {
        if filters.is_empty() {
            return Err(PacketError::EmptySubscription);
        }
        Ok(Self { packet_id, filters })
    }

    pub(crate) fn decode(flags: u8, body: &[u8]) -> Result<Self, DecodeError> {
        // Bits 3,2,1,0 of the fixed header MUST be 0,0,1,0 (§3.8.1).
        if flags != 0x02 {
            return Err(DecodeError::Malformed(
                "SUBSCRIBE fixed header flags must be 0b0010".into(),
            ));
        }

        let (packet_id, mut offset) = TwoByteInteger::decode(body)?;

        let mut filters = Vec::new();
        while offset < body.len() {
            let (filter, consumed) = Utf8String::decode(&body[offset..])?;
            offset += consumed;

            let qos = *body
                .get(offset)
                .ok_or(DecodeError::Truncated("subscription QoS byte"))?;
            offset += 1;
            if qos > 2 {
                return Err(DecodeError::Malformed(format!(
                    "invalid requested QoS {} in SUBSCRIBE",
                    qos
                )));
            }

            filters.push(TopicFilter { filter, qos });
        }

        if filters.is_empty() {
            return Err(DecodeError::Malformed(
                "SUBSCRIBE payload contains no topic filters".into(),
            ));
        }

        Ok(Subscribe { packet_id, filters })
    }
}

impl ControlPacket for Subscribe {
    fn packet_type(&self) -> PacketType {
        PacketType::Subscribe
    }

    fn flags(&self) -> u8 {
        0x02
    }

    fn variable_header(&self) -> Vec<u8> {
        TwoByteInteger::encode(self.packet_id).to_vec()
    }

    fn payload(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        for sub in &self.filters {
            payload.extend(Utf8String::encode(&sub.filter));
            payload.push(sub.qos);
        }
        payload
    }
}
