// SPDX-License-Identifier: MPL-2.0

//! The fourteen MQTT 3.1.1 control packets, one module each.

pub mod connack;
pub mod connect;
pub mod disconnect;
pub mod pingreq;
pub mod pingresp;
pub mod puback;
pub mod pubcomp;
pub mod publish;
pub mod pubrec;
pub mod pubrel;
pub mod suback;
pub mod subscribe;
pub mod unsuback;
pub mod unsubscribe;

pub use connack::ConnAck;
pub use connect::{Connect, Credentials, Will};
pub use disconnect::Disconnect;
pub use pingreq::PingReq;
pub use pingresp::PingResp;
pub use puback::PubAck;
pub use pubcomp::PubComp;
pub use publish::Publish;
pub use pubrec::PubRec;
pub use pubrel::PubRel;
pub use suback::SubAck;
pub use subscribe::{Subscribe, TopicFilter};
pub use unsuback::UnsubAck;
pub use unsubscribe::Unsubscribe;
