// SPDX-License-Identifier: MPL-2.0

//! QoS 1/2 delivery state machines for both directions.
//!
//! Sender side: one [`OutboundDelivery`] per in-flight QoS 1/2 publish,
//! keyed by packet identifier, advancing PUBLISH -> PUBACK (QoS 1) or
//! PUBLISH -> PUBREC -> PUBREL -> PUBCOMP (QoS 2). Unacknowledged stages are
//! retransmitted with dup=1 on a timeout and abandoned after a bounded
//! retry budget.
//!
//! Receiver side: QoS 1 duplicates inside the dedup window are re-acked but
//! not re-delivered; QoS 2 messages are held under their identifier until
//! PUBREL and delivered exactly once. That holding map is the mechanism
//! behind the exactly-once guarantee.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::codec::v3::{PubRel, Publish};
use crate::codec::Packet;

/// Opaque token identifying one `publish()` (or subscribe) call to the
/// caller. Completion fires exactly once per handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryHandle(pub(crate) u64);

impl fmt::Display for DeliveryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Terminal result of a tracked delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Abandoned { retries: u32 },
}

/// An application message handed to the caller once routing completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retain: bool,
}

impl ReceivedMessage {
    fn from_publish(publish: &Publish) -> Self {
        ReceivedMessage {
            topic: publish.topic.clone(),
            payload: publish.payload.clone(),
            qos: publish.qos,
            retain: publish.retain,
        }
    }
}

/// Which acknowledgment an outbound delivery is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderStage {
    AwaitPubAck,
    AwaitPubRec,
    AwaitPubComp,
}

/// One in-flight sender-side QoS 1/2 publish.
#[derive(Debug, Clone)]
pub struct OutboundDelivery {
    pub handle: DeliveryHandle,
    pub publish: Publish,
    pub stage: SenderStage,
    pub retries: u32,
    pub last_sent: Instant,
    /// False while the publish is queued waiting for a connection; the
    /// first transmission then goes out with dup=0.
    pub sent: bool,
}

/// What the engine must do with an inbound PUBLISH.
#[derive(Debug, PartialEq, Eq)]
pub enum InboundDisposition {
    /// QoS 0: hand to the caller, nothing else.
    Deliver(ReceivedMessage),
    /// QoS 1, first sighting: hand to the caller and send PUBACK.
    DeliverThenAck(ReceivedMessage, u16),
    /// QoS 1 duplicate inside the dedup window: PUBACK again, deliver
    /// nothing.
    AckDuplicate(u16),
    /// QoS 2: the message is recorded (or already was); send PUBREC and
    /// wait for PUBREL before delivering.
    RecordAndRec(u16),
}

pub struct DeliveryEngine {
    outbound: HashMap<u16, OutboundDelivery>,
    /// QoS 2 inbound messages awaiting PUBREL, keyed by packet identifier.
    pending_release: HashMap<u16, ReceivedMessage>,
    /// QoS 1 identifiers acknowledged within the dedup window.
    recent_acks: HashMap<u16, Instant>,
    retry_timeout: Duration,
    max_retries: u32,
}

impl DeliveryEngine {
    pub fn new(retry_timeout: Duration, max_retries: u32) -> Self {
        DeliveryEngine {
            outbound: HashMap::new(),
            pending_release: HashMap::new(),
            recent_acks: HashMap::new(),
            retry_timeout,
            max_retries,
        }
    }

    // ---- sender side ----

    /// Start tracking a QoS 1/2 publish. `sent` is false when the publish is
    /// queued for a connection that does not exist yet.
    pub fn track(&mut self, handle: DeliveryHandle, publish: Publish, now: Instant, sent: bool) {
        let id = publish
            .packet_id
            .expect("tracked publish carries a packet identifier");
        let stage = if publish.qos == 2 {
            SenderStage::AwaitPubRec
        } else {
            SenderStage::AwaitPubAck
        };
        self.outbound.insert(
            id,
            OutboundDelivery {
                handle,
                publish,
                stage,
                retries: 0,
                last_sent: now,
                sent,
            },
        );
    }

    pub fn on_puback(&mut self, id: u16) -> Option<OutboundDelivery> {
        match self.outbound.get(&id) {
            Some(d) if d.stage == SenderStage::AwaitPubAck => self.outbound.remove(&id),
            Some(d) => {
                warn!(packet_id = id, stage = ?d.stage, "PUBACK for a delivery not awaiting one");
                None
            }
            None => {
                debug!(packet_id = id, "PUBACK for unknown packet identifier");
                None
            }
        }
    }

    /// Advance a QoS 2 delivery past PUBREC. Returns true when a PUBREL
    /// should be sent; the retry budget restarts for the new stage.
    pub fn on_pubrec(&mut self, id: u16, now: Instant) -> bool {
        match self.outbound.get_mut(&id) {
            Some(d) if d.stage == SenderStage::AwaitPubRec => {
                d.stage = SenderStage::AwaitPubComp;
                d.retries = 0;
                d.last_sent = now;
                true
            }
            Some(d) if d.stage == SenderStage::AwaitPubComp => {
                // Duplicate PUBREC; answer with PUBREL again.
                true
            }
            _ => {
                debug!(packet_id = id, "PUBREC for unknown or QoS 1 delivery");
                false
            }
        }
    }

    pub fn on_pubcomp(&mut self, id: u16) -> Option<OutboundDelivery> {
        match self.outbound.get(&id) {
            Some(d) if d.stage == SenderStage::AwaitPubComp => self.outbound.remove(&id),
            _ => {
                debug!(packet_id = id, "PUBCOMP for unknown packet identifier");
                None
            }
        }
    }

    /// Mark a queued delivery as transmitted.
    pub fn mark_sent(&mut self, id: u16, now: Instant) {
        if let Some(d) = self.outbound.get_mut(&id) {
            d.sent = true;
            d.last_sent = now;
        }
    }

    /// Scan for expired stages. Returns the packets to retransmit and the
    /// deliveries that ran out of retries, which are no longer tracked.
    pub fn poll_retries(&mut self, now: Instant) -> (Vec<Packet>, Vec<OutboundDelivery>) {
        let mut resend = Vec::new();
        let mut expired = Vec::new();

        for (&id, d) in &self.outbound {
            if d.sent && now.duration_since(d.last_sent) >= self.retry_timeout {
                expired.push(id);
            }
        }
        expired.sort_unstable();

        let mut abandoned = Vec::new();
        for id in expired {
            let d = self.outbound.get_mut(&id).expect("expired id is tracked");
            if d.retries >= self.max_retries {
                warn!(packet_id = id, handle = %d.handle, retries = d.retries,
                      "abandoning delivery after retry budget");
                abandoned.push(self.outbound.remove(&id).expect("expired id is tracked"));
                continue;
            }
            d.retries += 1;
            d.last_sent = now;
            debug!(packet_id = id, retry = d.retries, stage = ?d.stage, "retransmitting");
            resend.push(Self::retransmission(d));
        }

        (resend, abandoned)
    }

    /// Everything to retransmit after a reconnect, oldest first. Stages that
    /// were already on the wire go out with dup=1; queued-but-never-sent
    /// publishes go out clean.
    pub fn resend_after_reconnect(&mut self, now: Instant) -> Vec<Packet> {
        let mut ids: Vec<u16> = self.outbound.keys().copied().collect();
        ids.sort_unstable_by_key(|id| {
            let d = &self.outbound[id];
            (d.last_sent, *id)
        });

        let mut packets = Vec::with_capacity(ids.len());
        for id in ids {
            let d = self.outbound.get_mut(&id).expect("id is tracked");
            let was_sent = d.sent;
            d.sent = true;
            d.last_sent = now;
            if was_sent {
                packets.push(Self::retransmission(d));
            } else {
                packets.push(Packet::Publish(d.publish.clone()));
            }
        }
        packets
    }

    fn retransmission(d: &OutboundDelivery) -> Packet {
        match d.stage {
            SenderStage::AwaitPubAck | SenderStage::AwaitPubRec => {
                let mut publish = d.publish.clone();
                publish.dup = true;
                Packet::Publish(publish)
            }
            SenderStage::AwaitPubComp => Packet::PubRel(PubRel::new(
                d.publish.packet_id.expect("tracked publish carries an id"),
            )),
        }
    }

    /// Remove and return every tracked delivery. Used on explicit disconnect
    /// so each handle still receives its single completion event.
    pub fn drain_outbound(&mut self) -> Vec<OutboundDelivery> {
        let mut drained: Vec<OutboundDelivery> = self.outbound.drain().map(|(_, d)| d).collect();
        drained.sort_unstable_by_key(|d| d.handle);
        drained
    }

    pub fn outstanding(&self) -> usize {
        self.outbound.len()
    }

    // ---- receiver side ----

    pub fn on_inbound_publish(&mut self, publish: &Publish, now: Instant) -> InboundDisposition {
        self.purge_recent_acks(now);

        match publish.qos {
            0 => InboundDisposition::Deliver(ReceivedMessage::from_publish(publish)),
            1 => {
                let id = publish.packet_id.expect("QoS 1 publish carries an id");
                if publish.dup && self.recent_acks.contains_key(&id) {
                    debug!(packet_id = id, "suppressing QoS 1 redelivery");
                    self.recent_acks.insert(id, now);
                    return InboundDisposition::AckDuplicate(id);
                }
                self.recent_acks.insert(id, now);
                InboundDisposition::DeliverThenAck(ReceivedMessage::from_publish(publish), id)
            }
            _ => {
                let id = publish.packet_id.expect("QoS 2 publish carries an id");
                // Keep the first copy; a retransmission only re-triggers
                // the PUBREC.
                self.pending_release
                    .entry(id)
                    .or_insert_with(|| ReceivedMessage::from_publish(publish));
                InboundDisposition::RecordAndRec(id)
            }
        }
    }

    /// Release a pending QoS 2 message. `None` for unknown identifiers —
    /// the caller still answers with PUBCOMP, it just delivers nothing.
    pub fn on_pubrel(&mut self, id: u16) -> Option<ReceivedMessage> {
        self.pending_release.remove(&id)
    }

    pub fn pending_release_count(&self) -> usize {
        self.pending_release.len()
    }

    /// Forget receiver-side dedup state (QoS 2 holds and the QoS 1 window).
    /// Invoked on fresh sessions per the configured policy.
    pub fn clear_receiver_state(&mut self) {
        self.pending_release.clear();
        self.recent_acks.clear();
    }

    /// Forget everything, both directions.
    pub fn clear(&mut self) {
        self.outbound.clear();
        self.clear_receiver_state();
    }

    /// Earliest instant a retry could become due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.outbound
            .values()
            .filter(|d| d.sent)
            .map(|d| d.last_sent + self.retry_timeout)
            .min()
    }

    fn purge_recent_acks(&mut self, now: Instant) {
        let window = self.retry_timeout;
        self.recent_acks
            .retain(|_, &mut acked| now.duration_since(acked) < window);
    }
}
