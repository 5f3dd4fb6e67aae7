// SPDX-License-Identifier: MPL-2.0

//! Client configuration.

use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::codec::v3::{Credentials, Will};

/// Whether QoS 2 receiver dedup state survives a reconnect.
///
/// The protocol only pins this down for fresh sessions (a CONNACK without
/// session-present always clears it); for resumed sessions brokers differ,
/// so the choice is explicit. `Preserve` biases toward never delivering a
/// message twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos2DedupPolicy {
    Preserve,
    Clear,
}

/// Everything configurable about one client instance.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Must be unique per broker.
    pub client_id: String,
    pub host: String,
    pub port: u16,
    /// Seconds; 0 disables keepalive.
    pub keep_alive_secs: u16,
    /// Ask the broker to discard (true) or resume (false) session state.
    pub clean_session: bool,
    pub credentials: Option<Credentials>,
    pub will: Option<Will>,
    pub auto_reconnect: bool,
    pub reconnect_policy: BackoffPolicy,
    /// None reconnects forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Retry budget per QoS 1/2 delivery before it is abandoned.
    pub max_retries: u32,
    /// How long an unacknowledged stage waits before a dup retransmission.
    pub retry_timeout: Duration,
    /// How long to wait for CONNACK after the transport opens.
    pub connect_timeout: Duration,
    pub qos2_dedup: Qos2DedupPolicy,
}

impl ClientOptions {
    pub fn builder() -> ClientOptionsBuilder {
        ClientOptionsBuilder::default()
    }

    /// `host:port`, the address handed to the transport.
    pub fn peer(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            client_id: String::new(),
            host: "localhost".to_string(),
            port: 1883,
            keep_alive_secs: 60,
            clean_session: true,
            credentials: None,
            will: None,
            auto_reconnect: true,
            reconnect_policy: BackoffPolicy::default(),
            max_reconnect_attempts: None,
            max_retries: 10,
            retry_timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
            qos2_dedup: Qos2DedupPolicy::Preserve,
        }
    }
}

#[derive(Debug, Default)]
pub struct ClientOptionsBuilder {
    options: ClientOptions,
}

impl ClientOptionsBuilder {
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.options.client_id = client_id.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.options.port = port;
        self
    }

    pub fn keep_alive_secs(mut self, secs: u16) -> Self {
        self.options.keep_alive_secs = secs;
        self
    }

    pub fn clean_session(mut self, clean: bool) -> Self {
        self.options.clean_session = clean;
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: Option<Vec<u8>>) -> Self {
        self.options.credentials = Some(Credentials {
            username: username.into(),
            password,
        });
        self
    }

    pub fn will(mut self, will: Will) -> Self {
        self.options.will = Some(will);
        self
    }

    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.options.auto_reconnect = enabled;
        self
    }

    pub fn reconnect_policy(mut self, policy: BackoffPolicy) -> Self {
        self.options.reconnect_policy = policy;
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.options.max_reconnect_attempts = Some(attempts);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.options.max_retries = retries;
        self
    }

    pub fn retry_timeout(mut self, timeout: Duration) -> Self {
        self.options.retry_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    pub fn qos2_dedup(mut self, policy: Qos2DedupPolicy) -> Self {
        self.options.qos2_dedup = policy;
        self
    }

    pub fn build(self) -> ClientOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let options = ClientOptions::builder().client_id("dev-1").build();
        assert_eq!(options.client_id, "dev-1");
        assert_eq!(options.keep_alive_secs, 60);
        assert!(options.clean_session);
        assert!(options.auto_reconnect);
        assert_eq!(options.retry_timeout, Duration::from_secs(20));
        assert_eq!(options.qos2_dedup, Qos2DedupPolicy::Preserve);
    }

    #[test]
    fn test_peer_address() {
        let options = ClientOptions::builder()
            .host("broker.example.net")
            .port(8883)
            .build();
        assert_eq!(options.peer(), "broker.example.net:8883");
    }
}
