// SPDX-License-Identifier: MPL-2.0

//! # mqlink
//!
//! An MQTT 3.1.1 client core: the protocol engine that establishes a
//! session with a broker, manages the connection lifecycle (connect,
//! keepalive, reconnect, disconnect), and performs publish/subscribe
//! message exchange with at-least-once and exactly-once delivery
//! guarantees.
//!
//! The crate is layered as a sans-I/O core with an async shell:
//!
//! - [`codec`] — the MQTT 3.1.1 wire format: per-packet encode/decode and
//!   an incremental stream decoder.
//! - [`session`] — packet-identifier allocation and subscription state.
//! - [`keepalive`] — the monotonic-clock PINGREQ/timeout watchdog.
//! - [`delivery`] — QoS 0/1/2 state machines for both directions, with
//!   retry-on-timeout and duplicate suppression.
//! - [`backoff`] — reconnect delay policy.
//! - [`engine`] — the connection state machine tying it all together;
//!   consumes bytes, ticks, and commands, yields frames and typed events.
//! - [`client`] — the tokio worker exposing the non-blocking caller API.
//! - [`transport`] — the byte-stream seam, with a TCP implementation.
//!
//! ## Example
//!
//! ```ignore
//! use mqlink::{ClientOptions, EventHandler, MqttClient};
//!
//! let options = ClientOptions::builder()
//!     .client_id("sensor-17")
//!     .host("broker.example.net")
//!     .port(1883)
//!     .keep_alive_secs(30)
//!     .build();
//!
//! let client = MqttClient::new(options, Box::new(MyHandler::default()));
//! client.connect().await?;
//! client.subscribe("commands/sensor-17", 1).await?;
//! client.publish("telemetry/sensor-17", b"23.5".to_vec(), 1, false).await?;
//! ```

pub mod backoff;
pub mod client;
pub mod codec;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod keepalive;
pub mod options;
pub mod session;
pub mod transport;

pub use backoff::BackoffPolicy;
pub use client::{EventHandler, MqttClient};
pub use delivery::{DeliveryHandle, DeliveryOutcome, ReceivedMessage};
pub use engine::{ConnectionState, Engine, Event, SubscribeHandle};
pub use error::{ClientError, ClientResult};
pub use options::{ClientOptions, Qos2DedupPolicy};
pub use transport::{TcpTransport, Transport, TransportError};
