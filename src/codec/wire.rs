// SPDX-License-Identifier: MPL-2.0

//! Primitive wire types shared by every control packet.
//!
//! MQTT 3.1.1 builds all packets out of four primitives: big-endian two-byte
//! integers, length-prefixed binary data, length-prefixed UTF-8 strings, and
//! the variable byte integer used for the fixed-header remaining length.

use crate::codec::DecodeError;

/// Remaining length may not exceed this (four 7-bit groups, MQTT 3.1.1 §2.2.3).
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

pub struct TwoByteInteger;

impl TwoByteInteger {
    pub fn encode(val: u16) -> [u8; 2] {
        val.to_be_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<(u16, usize), DecodeError> {
        if bytes.len() < 2 {
            return Err(DecodeError::Truncated("two byte integer"));
        }
        Ok((u16::from_be_bytes([bytes[0], bytes[1]]), 2))
    }
}

/// Result of decoding a variable byte integer from a possibly-short buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Vbi {
    /// (value, bytes consumed)
    Complete(usize, usize),
    /// At least this many further bytes are required.
    NeedMore(usize),
}

pub struct VariableByteInteger;

impl VariableByteInteger {
    pub fn encode(mut val: usize) -> Vec<u8> {
        debug_assert!(val <= MAX_REMAINING_LENGTH);
        let mut bytes = Vec::with_capacity(4);
        loop {
            let mut byte = (val % 128) as u8;
            val /= 128;
            if val > 0 {
                byte |= 0x80;
            }
            bytes.push(byte);
            if val == 0 {
                break;
            }
        }
        bytes
    }

    pub fn decode(buffer: &[u8]) -> Result<Vbi, DecodeError> {
        let mut multiplier = 1usize;
        let mut value = 0usize;

        for i in 0..4 {
            let byte = match buffer.get(i) {
                Some(&b) => b,
                None => return Ok(Vbi::NeedMore(1)),
            };

            value += (byte & 0x7F) as usize * multiplier;
            multiplier *= 128;

            if byte & 0x80 == 0 {
                return Ok(Vbi::Complete(value, i + 1));
            }
        }

        // A fourth byte with the continuation bit set is forbidden.
        Err(DecodeError::Malformed(
            "remaining length exceeds four bytes".into(),
        ))
    }
}

pub struct BinaryData;

impl BinaryData {
    pub fn encode(data: &[u8]) -> Vec<u8> {
        debug_assert!(data.len() <= u16::MAX as usize);
        let mut bytes = Vec::with_capacity(2 + data.len());
        bytes.extend_from_slice(&(data.len() as u16).to_be_bytes());
        bytes.extend_from_slice(data);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<(Vec<u8>, usize), DecodeError> {
        let (len, _) = TwoByteInteger::decode(bytes)?;
        let end = 2 + len as usize;
        if bytes.len() < end {
            return Err(DecodeError::Truncated("binary data"));
        }
        Ok((bytes[2..end].to_vec(), end))
    }
}

pub struct Utf8String;

impl Utf8String {
    pub fn encode(s: &str) -> Vec<u8> {
        BinaryData::encode(s.as_bytes())
    }

    pub fn decode(bytes: &[u8]) -> Result<(String, usize), DecodeError> {
        let (data, len) = BinaryData::decode(bytes)?;
        let s = String::from_utf8(data)
            .map_err(|e| DecodeError::Malformed(format!("invalid UTF-8 string: {}", e)))?;
        Ok((s, len))
    }
}
