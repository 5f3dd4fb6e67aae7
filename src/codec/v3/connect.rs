// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::codec::packet::{ControlPacket, PacketType};
use crate::codec::wire::{TwoByteInteger, Utf8String};
use crate::codec::{validate_qos, validate_topic, DecodeError, PacketError};

/// Will message published by the broker on the client's behalf when the
/// connection drops without a DISCONNECT.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Will {
    pub topic: String,
    pub message: Vec<u8>,
    pub qos: u8,
    pub retain: bool,
}

impl Will {
    pub fn new(topic: impl Into<String>, message: Vec<u8>, qos: u8, retain: bool) -> Result<Self, PacketError> {
        let topic = topic.into();
        validate_topic(&topic)?;
        validate_qos(qos)?;
        if message.len() > u16::MAX as usize {
            return Err(PacketError::StringTooLong(message.len()));
        }
        Ok(Self {
            topic,
            message,
            qos,
            retain,
        })
    }
}

/// Username and optional password carried in the CONNECT payload.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: Option<Vec<u8>>,
}

/// The CONNECT packet, first packet of every session (§3.1).
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Connect {
    pub client_id: String,
    pub keep_alive: u16,
    pub clean_session: bool,
    pub will: Option<Will>,
    pub credentials: Option<Credentials>,
}

impl Connect {
    pub fn new(client_id: impl Into<String>, keep_alive: u16, clean_session: bool) -> Self {
        Self {
            client_id: client_id.into(),
            keep_alive,
            clean_session,
            will: None,
            credentials: None,
        }
    }

    pub fn with_will(mut self, will: Will) -> Self {
        self.will = Some(will);
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub(crate) fn decode(flags: u8, body: &[u8]) -> Result<Self, DecodeError> {
        if flags != 0 {
            return Err(DecodeError::Malformed(
                "CONNECT fixed header flags must be 0".into(),
            ));
        }

        let mut offset = 0usize;
        let (proto_name, consumed) = Utf8String::decode(body)?;
        offset += consumed;
        if proto_name != "MQTT" {
            return Err(DecodeError::Malformed(format!(
                "unexpected protocol name {:?}",
                proto_name
            )));
        }

        let version = *body
            .get(offset)
            .ok_or(DecodeError::Truncated("protocol version"))?;
        offset += 1;
        if version != 4 {
            return Err(DecodeError::Malformed(format!(
                "unsupported protocol version {}",
                version
            )));
        }

        let connect_flags = *body
            .get(offset)
            .ok_or(DecodeError::Truncated("connect flags"))?;
        offset += 1;

        if connect_flags & 0x01 != 0 {
            return Err(DecodeError::Malformed(
                "CONNECT reserved flag bit is not 0".into(),
            ));
        }
        let clean_session = connect_flags & 0x02 != 0;
        let will_flag = connect_flags & 0x04 != 0;
        let will_qos = (connect_flags & 0x18) >> 3;
        let will_retain = connect_flags & 0x20 != 0;
        let password_flag = connect_flags & 0x40 != 0;
        let username_flag = connect_flags & 0x80 != 0;

        if password_flag && !username_flag {
            return Err(DecodeError::Malformed(
                "password flag requires username flag".into(),
            ));
        }
        if !will_flag && (will_qos != 0 || will_retain) {
            return Err(DecodeError::Malformed(
                "will QoS/retain set without will flag".into(),
            ));
        }

        let (keep_alive, consumed) = TwoByteInteger::decode(&body[offset..])?;
        offset += consumed;

        let (client_id, consumed) = Utf8String::decode(&body[offset..])?;
        offset += consumed;

        let will = if will_flag {
            let (topic, consumed) = Utf8String::decode(&body[offset..])?;
            offset += consumed;
            let (msg_len, consumed) = TwoByteInteger::decode(&body[offset..])?;
            offset += consumed;
            let end = offset + msg_len as usize;
            if end > body.len() {
                return Err(DecodeError::Truncated("will message"));
            }
            let message = body[offset..end].to_vec();
            offset = end;
            Some(Will {
                topic,
                message,
                qos: will_qos,
                retain: will_retain,
            })
        } else {
            None
        };

        let credentials = if username_flag {
            let (username, consumed) = Utf8String::decode(&body[offset..])?;
            offset += consumed;
            let password = if password_flag {
                let (pass_len, consumed) = TwoByteInteger::decode(&body[offset..])?;
                offset += consumed;
                let end = offset + pass_len as usize;
                if end > body.len() {
                    return Err(DecodeError::Truncated("password"));
                }
                let p = body[offset..end].to_vec();
                offset = end;
                Some(p)
            } else {
                None
            };
            Some(Credentials { username, password })
        } else {
            None
        };

        if offset != body.len() {
            return Err(DecodeError::Malformed(
                "trailing bytes after CONNECT payload".into(),
            ));
        }

        Ok(Connect {
            client_id,
            keep_alive,
            clean_session,
            will,
            credentials,
        })
    }
}

impl ControlPacket for Connect {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }

    fn variable_header(&self) -> Vec<u8> {
        let mut vh = Utf8String::encode("MQTT");
        vh.push(4);

        let mut flags = 0u8;
        if self.clean_session {
            flags |= 0x02;
        }
        if let Some(will) = &self.will {
            flags |= 0x04;
            flags |= will.qos << 3;
            if will.retain {
                flags |= 0x20;
            }
        }
        if let Some(creds) = &self.credentials {
            flags |= 0x80;
            if creds.password.is_some() {
                flags |= 0x40;
            }
        }
        vh.push(flags);

        vh.extend_from_slice(&TwoByteInteger::encode(self.keep_alive));
        vh
    }

    fn payload(&self) -> Vec<u8> {
        let mut payload = Utf8String::encode(&self.client_id);

        if let Some(will) = &self.will {
            payload.extend(Utf8String::encode(&will.topic));
            payload.extend_from_slice(&TwoByteInteger::encode(will.message.len() as u16));
            payload.extend_from_slice(&will.message);
        }

        if let Some(creds) = &self.credentials {
            payload.extend(Utf8String::encode(&creds.username));
            if let Some(password) = &creds.password {
                payload.extend_from_slice(&TwoByteInteger::encode(password.len() as u16));
                payload.extend_from_slice(password);
            }
        }

        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Decoded, Packet};

    #[test]
    fn test_connect_minimal_roundtrip() {
        let original = Connect::new("test-client", 60, true);
        let bytes = original.to_bytes();
        match Packet::from_bytes(&bytes).unwrap() {
            Decoded::Packet(Packet::Connect(parsed), consumed) => {
                assert_eq!(original, parsed);
                assert_eq!(consumed, bytes.len());
            }
            other => panic!("expected CONNECT packet, got {:?}", other),
        }
    }

    #[test]
    fn test_connect_full_roundtrip() {
        let original = Connect::new("test-client-full", 30, false)
            .with_will(Will::new("will/topic", b"last will".to_vec(), 2, true).unwrap())
            .with_credentials(Credentials {
                username: "user".to_string(),
                password: Some(b"pass".to_vec()),
            });

        let bytes = original.to_bytes();
        match Packet::from_bytes(&bytes).unwrap() {
            Decoded::Packet(Packet::Connect(parsed), _) => assert_eq!(original, parsed),
            other => panic!("expected CONNECT packet, got {:?}", other),
        }
    }

    #[test]
    fn test_connect_wire_layout() {
        let connect = Connect::new("c1", 60, true);
        assert_eq!(
            connect.to_bytes(),
            vec![
                0x10, 14, // type, remaining length
                0x00, 0x04, b'M', b'Q', b'T', b'T', // protocol name
                0x04, // protocol version
                0x02, // flags: clean session
                0x00, 0x3C, // keep alive
                0x00, 0x02, b'c', b'1', // client id
            ]
        );
    }

    #[test]
    fn test_connect_password_without_username_is_error() {
        let bytes = vec![
            0x10, 24, // type, len
            0x00, 0x04, b'M', b'Q', b'T', b'T', // proto name
            0x04, // version
            0x42, // flags: password, no username, clean session
            0x00, 0x3C, // keep alive
            0x00, 0x06, b'c', b'l', b'i', b'e', b'n', b't', // client id
            0x00, 0x04, b'p', b'a', b's', b's', // password
        ];
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_will_validation() {
        assert!(Will::new("", b"m".to_vec(), 0, false).is_err());
        assert!(Will::new("t", b"m".to_vec(), 3, false).is_err());
        assert!(Will::new("t", b"m".to_vec(), 1, true).is_ok());
    }
}
