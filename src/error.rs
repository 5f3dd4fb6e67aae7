// SPDX-License-Identifier: MPL-2.0

//! Error types for client operations.
//!
//! The taxonomy distinguishes failures that end the connection (malformed
//! input, lost transport, dead keepalive) from per-operation failures that
//! leave it up (an abandoned delivery, an exhausted identifier space), so
//! the state machine and the caller can each react appropriately.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::codec::{DecodeError, PacketError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// The inbound byte stream cannot be parsed. Fails the connection: a
    /// desynchronized stream has no recovery point.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// A packet the caller asked for is structurally invalid.
    #[error("invalid packet: {0}")]
    InvalidPacket(#[from] PacketError),

    /// The broker refused the CONNECT with a non-zero return code.
    #[error("connection rejected by broker (return code {return_code})")]
    ConnectRejected { return_code: u8 },

    /// No CONNACK arrived within the configured connect timeout.
    #[error("timed out waiting for CONNACK")]
    ConnectTimeout,

    /// The transport failed after the connection was established.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Nothing was received within 1.5x the keepalive interval of an
    /// unanswered PINGREQ. Treated like [`ClientError::ConnectionLost`].
    #[error("keepalive expired after {0:?} without inbound traffic")]
    KeepaliveTimeout(Duration),

    /// A QoS 1/2 delivery gave up after its configured retry budget.
    /// The connection stays up.
    #[error("delivery abandoned after {retries} retries")]
    DeliveryAbandoned { retries: u32 },

    /// Every packet identifier in the namespace is outstanding.
    /// The connection stays up; retry once a delivery completes.
    #[error("all packet identifiers are in use")]
    IdentifierSpaceExhausted,

    /// The reconnect policy ran out of attempts. Terminal: the client
    /// settles in `Disconnected`.
    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },

    /// The requested operation needs an established connection.
    #[error("not connected to broker")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// True when retrying or reconnecting can plausibly resolve the error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost(_)
                | Self::KeepaliveTimeout(_)
                | Self::ConnectTimeout
                | Self::IdentifierSpaceExhausted
                | Self::NotConnected
                | Self::Transport(_)
        )
    }

    /// True when the error indicates a broken connection that auto-reconnect
    /// should try to restore.
    pub fn should_reconnect(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost(_) | Self::KeepaliveTimeout(_) | Self::MalformedPacket(_)
        )
    }

    /// True for errors after which the client will not act again on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ReconnectExhausted { .. } | Self::ConnectRejected { .. }
        )
    }
}

impl From<DecodeError> for ClientError {
    fn from(error: DecodeError) -> Self {
        Self::MalformedPacket(error.to_string())
    }
}

impl From<io::Error> for ClientError {
    fn from(error: io::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
