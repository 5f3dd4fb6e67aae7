// SPDX-License-Identifier: MPL-2.0

//! Keepalive watchdog.
//!
//! MQTT keepalive has two sides: the client must send *some* control packet
//! within each keepalive interval (any packet counts, PINGREQ fills silence),
//! and the connection is considered dead when an outstanding PINGREQ goes
//! unanswered — by any inbound packet — for 1.5x the interval. All timing is
//! monotonic (`Instant`); wall-clock adjustments cannot fire the watchdog.

use std::time::{Duration, Instant};

/// What the engine must do right now, per [`KeepaliveMonitor::poll`].
#[derive(Debug, PartialEq, Eq)]
pub enum KeepaliveAction {
    /// Nothing was sent for a full interval; a PINGREQ is due.
    SendPing,
    /// An unanswered PINGREQ aged past 1.5x the interval; the connection
    /// is dead.
    Timeout,
}

#[derive(Debug)]
pub struct KeepaliveMonitor {
    /// Zero disables the watchdog entirely.
    interval: Duration,
    last_sent: Instant,
    last_received: Instant,
    ping_sent_at: Option<Instant>,
}

impl KeepaliveMonitor {
    pub fn new(interval_secs: u16, now: Instant) -> Self {
        KeepaliveMonitor {
            interval: Duration::from_secs(interval_secs as u64),
            last_sent: now,
            last_received: now,
            ping_sent_at: None,
        }
    }

    pub fn enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Restart the watchdog for a fresh connection.
    pub fn reset(&mut self, now: Instant) {
        self.last_sent = now;
        self.last_received = now;
        self.ping_sent_at = None;
    }

    /// Note that a control packet went out. Any packet defers the
    /// next PINGREQ.
    pub fn record_send(&mut self, now: Instant) {
        self.last_sent = now;
    }

    /// Note that a control packet came in. Any packet proves the broker is
    /// alive, so an outstanding PINGREQ is considered answered.
    pub fn record_receive(&mut self, now: Instant) {
        self.last_received = now;
        self.ping_sent_at = None;
    }

    /// Evaluate the watchdog. Marks the PINGREQ as sent when it requests
    /// one, so the caller must actually send it.
    pub fn poll(&mut self, now: Instant) -> Option<KeepaliveAction> {
        if !self.enabled() {
            return None;
        }

        if let Some(sent) = self.ping_sent_at {
            if now.duration_since(sent) >= self.timeout_window() {
                return Some(KeepaliveAction::Timeout);
            }
        } else if now.duration_since(self.last_sent) >= self.interval {
            self.ping_sent_at = Some(now);
            return Some(KeepaliveAction::SendPing);
        }

        None
    }

    /// The next instant at which [`poll`](Self::poll) could return an action.
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.enabled() {
            return None;
        }

        match self.ping_sent_at {
            Some(sent) => Some(sent + self.timeout_window()),
            None => Some(self.last_sent + self.interval),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 1.5x the keepalive interval.
    fn timeout_window(&self) -> Duration {
        self.interval + self.interval / 2
    }
}
