// SPDX-License-Identifier: MPL-2.0

//! MQTT 3.1.1 wire codec.
//!
//! Decoding is incremental: callers feed whatever bytes the transport has
//! produced and get back either a complete [`Packet`], a byte count still
//! missing ([`Decoded::NeedMore`]), or a [`DecodeError`] for input that can
//! never become a valid packet. Encoding is infallible because structural
//! validity is enforced when a packet is constructed, not when it is
//! serialized.

pub mod decoder;
pub mod packet;
pub mod v3;
pub mod wire;

pub use decoder::StreamDecoder;
pub use packet::{ControlPacket, Packet, PacketType};
pub use wire::MAX_REMAINING_LENGTH;

use thiserror::Error;

use crate::codec::wire::{VariableByteInteger, Vbi};

/// Input that cannot be parsed into a packet, ever. Short input is not an
/// error; it is reported through [`Decoded::NeedMore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error("unknown control packet type {0}")]
    InvalidPacketType(u8),

    /// A length-delimited field ran past the end of the packet body. The
    /// remaining length promised the body was complete, so this is corrupt
    /// input rather than a short read.
    #[error("truncated {0} inside packet body")]
    Truncated(&'static str),
}

/// Structural violations caught when a packet value is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("topic must not be empty")]
    EmptyTopic,

    #[error("string of {0} bytes exceeds the 65535-byte field limit")]
    StringTooLong(usize),

    #[error("invalid QoS level {0}")]
    InvalidQos(u8),

    #[error("QoS {0} publish requires a packet identifier")]
    MissingPacketId(u8),

    #[error("QoS 0 publish must not carry a packet identifier")]
    UnexpectedPacketId,

    #[error("subscribe request must name at least one topic filter")]
    EmptySubscription,

    #[error("payload of {0} bytes exceeds the maximum remaining length")]
    PayloadTooLarge(usize),
}

/// Outcome of a successful decode attempt.
#[derive(Debug, PartialEq)]
pub enum Decoded {
    /// A complete packet and the number of bytes it consumed.
    Packet(Packet, usize),
    /// At least this many further bytes are needed before a full packet can
    /// be parsed.
    NeedMore(usize),
}

/// A delimited packet body, or a report of how many bytes are still missing.
pub(crate) enum Frame<'a> {
    Complete {
        flags: u8,
        body: &'a [u8],
        total: usize,
    },
    Partial(usize),
}

/// Split the fixed header off a buffer and delimit the packet body.
pub(crate) fn read_frame(buffer: &[u8]) -> Result<Frame<'_>, DecodeError> {
    if buffer.len() < 2 {
        return Ok(Frame::Partial(2 - buffer.len()));
    }

    let flags = buffer[0] & 0x0F;
    match VariableByteInteger::decode(&buffer[1..])? {
        Vbi::Complete(len, consumed) => {
            let start = 1 + consumed;
            let total = start + len;
            if total > buffer.len() {
                return Ok(Frame::Partial(total - buffer.len()));
            }
            Ok(Frame::Complete {
                flags,
                body: &buffer[start..total],
                total,
            })
        }
        Vbi::NeedMore(n) => Ok(Frame::Partial(n)),
    }
}

pub(crate) fn validate_topic(topic: &str) -> Result<(), PacketError> {
    if topic.is_empty() {
        return Err(PacketError::EmptyTopic);
    }
    if topic.len() > u16::MAX as usize {
        return Err(PacketError::StringTooLong(topic.len()));
    }
    Ok(())
}

pub(crate) fn validate_qos(qos: u8) -> Result<(), PacketError> {
    if qos > 2 {
        return Err(PacketError::InvalidQos(qos));
    }
    Ok(())
}
