// SPDX-License-Identifier: MPL-2.0

use bytes::{Buf, BytesMut};

use crate::codec::{DecodeError, Decoded, Packet};

const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// A stateful decoder for a stream of MQTT data.
///
/// Bytes arrive from the transport in arbitrary chunks; the decoder buffers
/// them and yields complete packets one at a time. Partial packets stay in
/// the buffer until the rest arrives.
#[derive(Debug)]
pub struct StreamDecoder {
    buffer: BytesMut,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl StreamDecoder {
    pub fn new(buffer_size: usize) -> Self {
        StreamDecoder {
            buffer: BytesMut::with_capacity(buffer_size),
        }
    }

    /// Append new data from the transport to the internal buffer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempt to parse a single packet from the internal buffer.
    ///
    /// - `Ok(Some(packet))`: a full packet was parsed and its bytes removed.
    /// - `Ok(None)`: the buffer does not yet hold a full packet.
    /// - `Err(_)`: the buffered data is malformed; the stream is unusable.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, DecodeError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        match Packet::from_bytes(&self.buffer)? {
            Decoded::Packet(packet, consumed) => {
                self.buffer.advance(consumed);
                Ok(Some(packet))
            }
            Decoded::NeedMore(_) => Ok(None),
        }
    }

    /// Drop all buffered bytes. Called when the transport is replaced so a
    /// partial packet from the old stream cannot corrupt the new one.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Up to `n` bytes of the unconsumed buffer, for diagnostics after a
    /// decode failure.
    pub fn preview(&self, n: usize) -> &[u8] {
        &self.buffer[..self.buffer.len().min(n)]
    }
}
