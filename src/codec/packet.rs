// SPDX-License-Identifier: MPL-2.0

use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::codec::v3::*;
use crate::codec::wire::VariableByteInteger;
use crate::codec::{read_frame, DecodeError, Decoded, Frame};

/// Tagged union over every MQTT 3.1.1 control packet.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[allow(clippy::large_enum_variant)]
pub enum Packet {
    Connect(connect::Connect),
    ConnAck(connack::ConnAck),
    Publish(publish::Publish),
    PubAck(puback::PubAck),
    PubRec(pubrec::PubRec),
    PubRel(pubrel::PubRel),
    PubComp(pubcomp::PubComp),
    Subscribe(subscribe::Subscribe),
    SubAck(suback::SubAck),
    Unsubscribe(unsubscribe::Unsubscribe),
    UnsubAck(unsuback::UnsubAck),
    PingReq(pingreq::PingReq),
    PingResp(pingresp::PingResp),
    Disconnect(disconnect::Disconnect),
}

impl Packet {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Packet::Connect(p) => p.to_bytes(),
            Packet::ConnAck(p) => p.to_bytes(),
            Packet::Publish(p) => p.to_bytes(),
            Packet::PubAck(p) => p.to_bytes(),
            Packet::PubRec(p) => p.to_bytes(),
            Packet::PubRel(p) => p.to_bytes(),
            Packet::PubComp(p) => p.to_bytes(),
            Packet::Subscribe(p) => p.to_bytes(),
            Packet::SubAck(p) => p.to_bytes(),
            Packet::Unsubscribe(p) => p.to_bytes(),
            Packet::UnsubAck(p) => p.to_bytes(),
            Packet::PingReq(p) => p.to_bytes(),
            Packet::PingResp(p) => p.to_bytes(),
            Packet::Disconnect(p) => p.to_bytes(),
        }
    }

    /// Parse a packet from a byte prefix. Returns [`Decoded::NeedMore`] when
    /// the buffer holds less than one full packet.
    pub fn from_bytes(buffer: &[u8]) -> Result<Decoded, DecodeError> {
        let (flags, body, total) = match read_frame(buffer)? {
            Frame::Complete { flags, body, total } => (flags, body, total),
            Frame::Partial(n) => return Ok(Decoded::NeedMore(n)),
        };

        let packet = match PacketType::try_from(buffer[0] >> 4)? {
            PacketType::Connect => Packet::Connect(connect::Connect::decode(flags, body)?),
            PacketType::ConnAck => Packet::ConnAck(connack::ConnAck::decode(flags, body)?),
            PacketType::Publish => Packet::Publish(publish::Publish::decode(flags, body)?),
            PacketType::PubAck => Packet::PubAck(puback::PubAck::decode(flags, body)?),
            PacketType::PubRec => Packet::PubRec(pubrec::PubRec::decode(flags, body)?),
            PacketType::PubRel => Packet::PubRel(pubrel::PubRel::decode(flags, body)?),
            PacketType::PubComp => Packet::PubComp(pubcomp::PubComp::decode(flags, body)?),
            PacketType::Subscribe => Packet::Subscribe(subscribe::Subscribe::decode(flags, body)?),
            PacketType::SubAck => Packet::SubAck(suback::SubAck::decode(flags, body)?),
            PacketType::Unsubscribe => {
                Packet::Unsubscribe(unsubscribe::Unsubscribe::decode(flags, body)?)
            }
            PacketType::UnsubAck => Packet::UnsubAck(unsuback::UnsubAck::decode(flags, body)?),
            PacketType::PingReq => Packet::PingReq(pingreq::PingReq::decode(flags, body)?),
            PacketType::PingResp => Packet::PingResp(pingresp::PingResp::decode(flags, body)?),
            PacketType::Disconnect => {
                Packet::Disconnect(disconnect::Disconnect::decode(flags, body)?)
            }
        };

        Ok(Decoded::Packet(packet, total))
    }

    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::PubRec(_) => PacketType::PubRec,
            Packet::PubRel(_) => PacketType::PubRel,
            Packet::PubComp(_) => PacketType::PubComp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::UnsubAck(_) => PacketType::UnsubAck,
            Packet::PingReq(_) => PacketType::PingReq,
            Packet::PingResp(_) => PacketType::PingResp,
            Packet::Disconnect(_) => PacketType::Disconnect,
        }
    }
}

/// Control packet type, the high nibble of the fixed header (§2.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::ConnAck),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::PubAck),
            5 => Ok(PacketType::PubRec),
            6 => Ok(PacketType::PubRel),
            7 => Ok(PacketType::PubComp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::SubAck),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::UnsubAck),
            12 => Ok(PacketType::PingReq),
            13 => Ok(PacketType::PingResp),
            14 => Ok(PacketType::Disconnect),
            other => Err(DecodeError::InvalidPacketType(other)),
        }
    }
}

/// Encode-side contract shared by all control packets.
///
/// The fixed header is assembled from the packet type, flag nibble, and the
/// remaining length derived from the variable header and payload.
pub trait ControlPacket {
    fn packet_type(&self) -> PacketType;

    // Flag nibble of the fixed header (§2.2.2); zero for every packet that
    // does not override it.
    fn flags(&self) -> u8 {
        0
    }

    fn variable_header(&self) -> Vec<u8> {
        Vec::new()
    }

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }

    fn to_bytes(&self) -> Vec<u8> {
        let vhdr = self.variable_header();
        let payload = self.payload();
        let remaining = vhdr.len() + payload.len();

        let mut bytes = Vec::with_capacity(2 + remaining);
        bytes.push(((self.packet_type() as u8) << 4) | self.flags());
        bytes.extend(VariableByteInteger::encode(remaining));
        bytes.extend(vhdr);
        bytes.extend(payload);
        bytes
    }
}
